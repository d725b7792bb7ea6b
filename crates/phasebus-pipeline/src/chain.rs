//! Interceptor chain execution.
//!
//! An [`InterceptorChain`] is the per-message execution state over a shared
//! [`ResolvedChain`]: a cursor, the stack of interceptors already visited
//! and a [`ChainState`]. `run` iterates forward from the cursor and, at every
//! step boundary, looks for an error attached to the message. An error
//! switches the chain into unwind mode: the visited stack is popped and each
//! interceptor's `handle_fault` runs, most recent first. The chain then hands
//! the message to its [`FaultObserver`], which produces the fault response.
//!
//! Suspension is not a failure. A suspended chain keeps its cursor and
//! visited stack and continues from the next interceptor when `run` is
//! called again.

use crate::error::PipelineResult;
use crate::interceptor::Control;
use crate::message::Message;
use crate::provider::Flow;
use crate::resolver::ResolvedChain;
use phasebus_core::Fault;
use phasebus_telemetry::metrics::record_chain_run;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Execution state of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Not run yet.
    Pending,
    /// Currently running.
    Executing,
    /// Paused by an interceptor; `run` resumes it.
    Suspended,
    /// Every interceptor ran without error.
    Complete,
    /// Processing failed and the chain unwound.
    Aborted,
}

impl ChainState {
    /// Returns the state name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        }
    }

    /// Returns `true` for states `run` will not change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

/// Receives a message after its chain unwound.
pub trait FaultObserver: Send + Sync {
    /// Handles the failed message. An error is returned to the caller of
    /// [`InterceptorChain::run`].
    fn on_fault(&self, message: &mut Message) -> PipelineResult<()>;
}

/// Execution state of one resolved chain for one message.
pub struct InterceptorChain {
    resolved: Arc<ResolvedChain>,
    flow: Flow,
    cursor: usize,
    visited: Vec<usize>,
    state: ChainState,
    fault_observer: Option<Arc<dyn FaultObserver>>,
}

impl InterceptorChain {
    /// Creates a pending chain for `flow`.
    #[must_use]
    pub fn new(resolved: Arc<ResolvedChain>, flow: Flow) -> Self {
        Self {
            resolved,
            flow,
            cursor: 0,
            visited: Vec::new(),
            state: ChainState::Pending,
            fault_observer: None,
        }
    }

    /// Sets the observer notified after an unwind.
    #[must_use]
    pub fn with_fault_observer(mut self, observer: Arc<dyn FaultObserver>) -> Self {
        self.fault_observer = Some(observer);
        self
    }

    /// Returns the flow this chain was resolved for.
    #[must_use]
    pub const fn flow(&self) -> Flow {
        self.flow
    }

    /// Returns the execution state.
    #[must_use]
    pub const fn state(&self) -> ChainState {
        self.state
    }

    /// Returns the index of the next interceptor to run.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the resolved interceptor sequence.
    #[must_use]
    pub fn resolved(&self) -> &ResolvedChain {
        &self.resolved
    }

    /// Returns the IDs of interceptors visited and not yet unwound.
    #[must_use]
    pub fn visited_ids(&self) -> Vec<&str> {
        self.visited
            .iter()
            .filter_map(|&index| self.resolved.get(index).map(|i| i.id()))
            .collect()
    }

    /// Runs the chain on `message` from the cursor.
    ///
    /// Returns [`ChainState::Complete`], [`ChainState::Suspended`] or
    /// [`ChainState::Aborted`]. Running a complete or aborted chain again
    /// does nothing and returns its state.
    ///
    /// # Errors
    ///
    /// Returns the error of the fault observer when producing the fault
    /// response failed.
    pub fn run(&mut self, message: &mut Message) -> PipelineResult<ChainState> {
        match self.state {
            ChainState::Complete | ChainState::Aborted => return Ok(self.state),
            ChainState::Suspended => debug!(
                message_id = %message.id(),
                flow = self.flow.as_str(),
                cursor = self.cursor,
                "Resuming chain"
            ),
            ChainState::Pending | ChainState::Executing => {}
        }

        let started = Instant::now();
        self.state = ChainState::Executing;
        let result = self.execute(message);

        let outcome = result.as_ref().map_or("error", |state| state.as_str());
        record_chain_run(self.flow.as_str(), outcome, started.elapsed());
        result
    }

    fn execute(&mut self, message: &mut Message) -> PipelineResult<ChainState> {
        let resolved = Arc::clone(&self.resolved);

        loop {
            self.check_cancelled(message);
            if message.error().is_some() {
                return self.unwind(message);
            }

            let Some(interceptor) = resolved.get(self.cursor) else {
                break;
            };
            self.visited.push(self.cursor);
            self.cursor += 1;

            trace!(
                message_id = %message.id(),
                interceptor = interceptor.id(),
                phase = interceptor.descriptor().phase(),
                "Invoking interceptor"
            );

            match interceptor.handle_message(message) {
                Ok(Control::Continue) => {}
                Ok(Control::Suspend) => {
                    debug!(
                        message_id = %message.id(),
                        interceptor = interceptor.id(),
                        "Chain suspended"
                    );
                    self.state = ChainState::Suspended;
                    return Ok(self.state);
                }
                Ok(Control::Stop) => {
                    if message.error().is_none() {
                        message.set_error(Fault::aborted(interceptor.id()));
                    }
                }
                Err(fault) => message.set_error(fault),
            }
        }

        self.state = ChainState::Complete;
        Ok(self.state)
    }

    // Fault flows already carry the failure; only normal flows react.
    fn check_cancelled(&self, message: &mut Message) {
        if self.flow.is_fault() || message.error().is_some() {
            return;
        }
        if let Some(reason) = message.exchange().and_then(|e| e.cancellation()) {
            message.set_error(Fault::cancelled(reason));
        }
    }

    fn unwind(&mut self, message: &mut Message) -> PipelineResult<ChainState> {
        debug!(
            message_id = %message.id(),
            flow = self.flow.as_str(),
            visited = self.visited.len(),
            fault = %message.error().map(ToString::to_string).unwrap_or_default(),
            "Unwinding chain"
        );

        let resolved = Arc::clone(&self.resolved);
        while let Some(index) = self.visited.pop() {
            if let Some(interceptor) = resolved.get(index) {
                interceptor.handle_fault(message);
            }
        }
        self.state = ChainState::Aborted;

        if let Some(observer) = self.fault_observer.clone() {
            observer.on_fault(message)?;
        }
        Ok(self.state)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("flow", &self.flow)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("resolved", &self.resolved)
            .field("visited", &self.visited_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::exchange::Exchange;
    use crate::interceptor::{BoxedInterceptor, FnInterceptor, InterceptorDescriptor};
    use crate::phase::PhaseList;
    use crate::provider::InterceptorScope;
    use crate::resolver::ChainResolver;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn step(log: &Log, id: &'static str, phase: &str, control: Control) -> BoxedInterceptor {
        let on_message = Arc::clone(log);
        let on_fault = Arc::clone(log);
        Arc::new(
            FnInterceptor::new(InterceptorDescriptor::new(id, phase), move |_| {
                on_message.lock().push(id.to_string());
                Ok(control)
            })
            .on_fault(move |_| on_fault.lock().push(format!("fault:{id}"))),
        )
    }

    fn failing(log: &Log, id: &'static str, phase: &str) -> BoxedInterceptor {
        let on_message = Arc::clone(log);
        let on_fault = Arc::clone(log);
        Arc::new(
            FnInterceptor::new(InterceptorDescriptor::new(id, phase), move |_| {
                on_message.lock().push(id.to_string());
                Err(Fault::server("boom"))
            })
            .on_fault(move |_| on_fault.lock().push(format!("fault:{id}"))),
        )
    }

    fn chain(interceptors: &[BoxedInterceptor]) -> InterceptorChain {
        let phases = PhaseList::from_names(&["unmarshal", "invoke", "marshal"]).unwrap();
        let resolved = ChainResolver::new(phases)
            .add_scope(InterceptorScope::Bus, interceptors)
            .resolve()
            .unwrap();
        InterceptorChain::new(Arc::new(resolved), Flow::In)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[test]
    fn test_runs_to_completion_in_order() {
        let log = Log::default();
        let mut chain = chain(&[
            step(&log, "marshal", "marshal", Control::Continue),
            step(&log, "unmarshal", "unmarshal", Control::Continue),
            step(&log, "invoke", "invoke", Control::Continue),
        ]);

        let mut message = Message::inbound();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Complete));
        assert_eq!(entries(&log), vec!["unmarshal", "invoke", "marshal"]);
        assert_eq!(chain.cursor(), 3);
    }

    #[test]
    fn test_fault_unwinds_in_reverse_including_raiser() {
        let log = Log::default();
        let mut chain = chain(&[
            step(&log, "i1", "unmarshal", Control::Continue),
            step(&log, "i2", "invoke", Control::Continue),
            failing(&log, "i3", "marshal"),
        ]);

        let mut message = Message::inbound();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(
            entries(&log),
            vec!["i1", "i2", "i3", "fault:i3", "fault:i2", "fault:i1"]
        );
        assert_eq!(message.error(), Some(&Fault::server("boom")));
        assert!(chain.visited_ids().is_empty());
    }

    #[test]
    fn test_error_set_on_message_detected_at_boundary() {
        let log = Log::default();
        let flagged = Arc::clone(&log);
        let setter: BoxedInterceptor = Arc::new(FnInterceptor::new(
            InterceptorDescriptor::new("setter", "invoke"),
            move |message| {
                flagged.lock().push("setter".to_string());
                message.set_error(Fault::client("bad input"));
                Ok(Control::Continue)
            },
        ));
        let mut chain = chain(&[
            step(&log, "first", "unmarshal", Control::Continue),
            setter,
            step(&log, "never", "marshal", Control::Continue),
        ]);

        let mut message = Message::inbound();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(entries(&log), vec!["first", "setter", "fault:first"]);
    }

    #[test]
    fn test_stop_attaches_aborted_fault() {
        let log = Log::default();
        let mut chain = chain(&[
            step(&log, "gate", "unmarshal", Control::Stop),
            step(&log, "never", "invoke", Control::Continue),
        ]);

        let mut message = Message::inbound();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(message.error(), Some(&Fault::aborted("gate")));
        assert_eq!(entries(&log), vec!["gate", "fault:gate"]);
    }

    #[test]
    fn test_suspend_and_resume_from_cursor() {
        let log = Log::default();
        let mut chain = chain(&[
            step(&log, "unmarshal", "unmarshal", Control::Continue),
            step(&log, "invoke", "invoke", Control::Suspend),
            step(&log, "marshal", "marshal", Control::Continue),
        ]);

        let mut message = Message::inbound();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Suspended));
        assert_eq!(chain.visited_ids(), vec!["unmarshal", "invoke"]);
        assert_eq!(chain.cursor(), 2);

        assert_eq!(chain.run(&mut message), Ok(ChainState::Complete));
        assert_eq!(entries(&log), vec!["unmarshal", "invoke", "marshal"]);
    }

    #[test]
    fn test_error_set_while_suspended_unwinds_on_resume() {
        let log = Log::default();
        let mut chain = chain(&[
            step(&log, "unmarshal", "unmarshal", Control::Continue),
            step(&log, "invoke", "invoke", Control::Suspend),
            step(&log, "marshal", "marshal", Control::Continue),
        ]);

        let mut message = Message::inbound();
        chain.run(&mut message).unwrap();
        message.set_error(Fault::server("worker failed"));

        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(
            entries(&log),
            vec!["unmarshal", "invoke", "fault:invoke", "fault:unmarshal"]
        );
    }

    #[test]
    fn test_terminal_chain_run_is_noop() {
        let log = Log::default();
        let mut chain = chain(&[failing(&log, "x", "invoke")]);
        let mut message = Message::inbound();

        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(entries(&log), vec!["x", "fault:x"]);
    }

    #[test]
    fn test_cancellation_detected_at_boundary() {
        let log = Log::default();
        let exchange = Exchange::new();
        let canceller = exchange.clone();
        let cancel: BoxedInterceptor = Arc::new(FnInterceptor::new(
            InterceptorDescriptor::new("cancel", "unmarshal"),
            move |_| {
                canceller.cancel("deadline exceeded");
                Ok(Control::Continue)
            },
        ));
        let mut chain = chain(&[cancel, step(&log, "invoke", "invoke", Control::Continue)]);

        let shared = exchange.set_in_message(Message::inbound());
        let mut message = shared.lock();
        assert_eq!(chain.run(&mut message), Ok(ChainState::Aborted));
        assert_eq!(message.error(), Some(&Fault::cancelled("deadline exceeded")));
        assert!(entries(&log).is_empty());
    }

    struct Flag(AtomicBool);

    impl FaultObserver for Flag {
        fn on_fault(&self, _message: &mut Message) -> PipelineResult<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    impl FaultObserver for Broken {
        fn on_fault(&self, message: &mut Message) -> PipelineResult<()> {
            Err(PipelineError::FaultChain {
                fault: message.error().cloned().unwrap_or_else(|| Fault::server("?")),
            })
        }
    }

    #[test]
    fn test_fault_observer_called_after_unwind() {
        let log = Log::default();
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let mut chain = chain(&[failing(&log, "x", "invoke")]).with_fault_observer(flag.clone());

        let mut message = Message::inbound();
        chain.run(&mut message).unwrap();
        assert!(flag.0.load(Ordering::SeqCst));
    }

    #[test]
    fn test_fault_observer_error_propagates() {
        let log = Log::default();
        let mut chain = chain(&[failing(&log, "x", "invoke")]).with_fault_observer(Arc::new(Broken));

        let mut message = Message::inbound();
        assert_eq!(
            chain.run(&mut message),
            Err(PipelineError::FaultChain {
                fault: Fault::server("boom")
            })
        );
        assert_eq!(chain.state(), ChainState::Aborted);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ChainState::Suspended.as_str(), "suspended");
        assert!(ChainState::Aborted.is_terminal());
        assert!(!ChainState::Pending.is_terminal());
    }
}
