//! The exchange: correlation unit of one interaction.
//!
//! An [`Exchange`] ties the inbound message to its outbound and fault
//! counterparts and holds what they share: the endpoint, the back-channel
//! conduit, exchange-scoped properties, the one-way flag and the
//! completion signal.
//!
//! # Locking
//!
//! Messages are locked in the order in → out → fault. The exchange's own
//! state lock is a leaf: it is never held while a message is locked by the
//! same call, so reading the exchange from inside a running chain is
//! always safe.

use crate::chain::ChainState;
use crate::endpoint::Endpoint;
use crate::error::{PipelineError, PipelineResult};
use crate::message::{Message, SharedMessage};
use crate::transport::Conduit;
use parking_lot::{Condvar, Mutex};
use phasebus_core::{ExchangeId, Properties, PropertyKey};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Default)]
struct ExchangeState {
    in_message: Option<SharedMessage>,
    out_message: Option<SharedMessage>,
    fault_message: Option<SharedMessage>,
    one_way: bool,
    cancelled: Option<String>,
    complete: bool,
    endpoint: Option<Arc<Endpoint>>,
    conduit: Option<Arc<dyn Conduit>>,
    properties: Properties,
}

pub(crate) struct ExchangeInner {
    id: ExchangeId,
    state: Mutex<ExchangeState>,
    completed: Condvar,
}

/// A handle to one request/response (or one-way) interaction.
///
/// Cloning is cheap and every clone refers to the same exchange.
///
/// ```
/// use phasebus_pipeline::{Exchange, Message};
///
/// let exchange = Exchange::new();
/// let request = exchange.set_in_message(Message::inbound());
/// assert!(request.lock().exchange().is_some());
///
/// exchange.set_one_way(true);
/// assert!(exchange.out_message().is_none());
/// ```
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<ExchangeInner>,
}

impl Exchange {
    /// Creates an empty exchange.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ExchangeInner {
                id: ExchangeId::new(),
                state: Mutex::new(ExchangeState::default()),
                completed: Condvar::new(),
            }),
        }
    }

    pub(crate) const fn from_inner(inner: Arc<ExchangeInner>) -> Self {
        Self { inner }
    }

    /// Returns the exchange ID.
    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.inner.id
    }

    /// Returns `true` if both handles refer to the same exchange.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn share(&self, mut message: Message) -> SharedMessage {
        message.bind(Arc::downgrade(&self.inner));
        Arc::new(Mutex::new(message))
    }

    // --- messages ---------------------------------------------------------

    /// Binds `message` as the inbound message and returns its shared handle.
    pub fn set_in_message(&self, message: Message) -> SharedMessage {
        let shared = self.share(message);
        self.inner.state.lock().in_message = Some(Arc::clone(&shared));
        shared
    }

    /// Binds `message` as the outbound message and returns its shared handle.
    pub fn set_out_message(&self, message: Message) -> SharedMessage {
        let shared = self.share(message);
        self.inner.state.lock().out_message = Some(Arc::clone(&shared));
        shared
    }

    /// Binds `message` as the fault message and returns its shared handle.
    pub fn set_fault_message(&self, message: Message) -> SharedMessage {
        let shared = self.share(message);
        self.inner.state.lock().fault_message = Some(Arc::clone(&shared));
        shared
    }

    /// Returns the inbound message.
    #[must_use]
    pub fn in_message(&self) -> Option<SharedMessage> {
        self.inner.state.lock().in_message.clone()
    }

    /// Returns the outbound message.
    #[must_use]
    pub fn out_message(&self) -> Option<SharedMessage> {
        self.inner.state.lock().out_message.clone()
    }

    /// Returns the fault message.
    #[must_use]
    pub fn fault_message(&self) -> Option<SharedMessage> {
        self.inner.state.lock().fault_message.clone()
    }

    // --- one-way ----------------------------------------------------------

    /// Returns `true` if the exchange has no response.
    #[must_use]
    pub fn is_one_way(&self) -> bool {
        self.inner.state.lock().one_way
    }

    /// Sets the one-way flag.
    ///
    /// Marking an exchange one-way drops any outbound message already
    /// created for it, so its chain can no longer be driven.
    pub fn set_one_way(&self, one_way: bool) {
        let mut state = self.inner.state.lock();
        state.one_way = one_way;
        if one_way && state.out_message.take().is_some() {
            debug!(exchange_id = %self.inner.id, "Outbound chain detached from one-way exchange");
        }
    }

    // --- cancellation & completion ----------------------------------------

    /// Cancels the exchange. Running chains detect the cancellation at their
    /// next step boundary and unwind.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(exchange_id = %self.inner.id, reason = %reason, "Exchange cancelled");
        self.inner.state.lock().cancelled = Some(reason);
    }

    /// Returns the cancellation reason, if the exchange was cancelled.
    #[must_use]
    pub fn cancellation(&self) -> Option<String> {
        self.inner.state.lock().cancelled.clone()
    }

    /// Marks the exchange complete and wakes every waiter.
    pub fn complete(&self) {
        let mut state = self.inner.state.lock();
        if !state.complete {
            state.complete = true;
            self.inner.completed.notify_all();
        }
    }

    /// Returns `true` once the exchange is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().complete
    }

    /// Blocks until the exchange completes or `timeout` elapses. Returns
    /// whether it completed.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.complete {
            if self.inner.completed.wait_until(&mut state, deadline).timed_out() {
                return state.complete;
            }
        }
        true
    }

    /// Completes a one-way exchange once its inbound chain finished.
    pub fn finish_inbound(&self, state: ChainState) {
        if state == ChainState::Complete && self.is_one_way() {
            self.complete();
        }
    }

    // --- driving ----------------------------------------------------------

    /// Drives the outbound message's chain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OneWayExchange`] for one-way exchanges and
    /// [`PipelineError::MissingMessage`] if no outbound message was set up.
    pub fn drive_outbound(&self) -> PipelineResult<ChainState> {
        let out = {
            let state = self.inner.state.lock();
            if state.one_way {
                return Err(PipelineError::OneWayExchange {
                    exchange: self.inner.id,
                });
            }
            state.out_message.clone()
        };
        let out = out.ok_or(PipelineError::MissingMessage {
            exchange: self.inner.id,
            role: "out",
        })?;
        let mut message = out.lock();
        message.drive()
    }

    /// Drives the fault message's chain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingMessage`] if no fault message exists.
    pub fn drive_fault(&self) -> PipelineResult<ChainState> {
        let fault = self.fault_message().ok_or(PipelineError::MissingMessage {
            exchange: self.inner.id,
            role: "fault",
        })?;
        let mut message = fault.lock();
        message.drive()
    }

    // --- shared context ---------------------------------------------------

    /// Returns the endpoint serving this exchange.
    #[must_use]
    pub fn endpoint(&self) -> Option<Arc<Endpoint>> {
        self.inner.state.lock().endpoint.clone()
    }

    /// Sets the endpoint serving this exchange.
    pub fn set_endpoint(&self, endpoint: Arc<Endpoint>) {
        self.inner.state.lock().endpoint = Some(endpoint);
    }

    /// Returns the conduit responses are sent through.
    #[must_use]
    pub fn conduit(&self) -> Option<Arc<dyn Conduit>> {
        self.inner.state.lock().conduit.clone()
    }

    /// Sets the conduit responses are sent through.
    pub fn set_conduit(&self, conduit: Arc<dyn Conduit>) {
        self.inner.state.lock().conduit = Some(conduit);
    }

    /// Returns a clone of an exchange-scoped property.
    #[must_use]
    pub fn property<T: Clone + Send + Sync + 'static>(&self, key: &PropertyKey<T>) -> Option<T> {
        self.inner.state.lock().properties.get_cloned(key)
    }

    /// Stores an exchange-scoped property.
    pub fn set_property<T: Send + Sync + 'static>(&self, key: &PropertyKey<T>, value: T) {
        self.inner.state.lock().properties.insert(key, value);
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Exchange")
            .field("id", &self.inner.id)
            .field("in", &state.in_message.is_some())
            .field("out", &state.out_message.is_some())
            .field("fault", &state.fault_message.is_some())
            .field("one_way", &state.one_way)
            .field("cancelled", &state.cancelled)
            .field("complete", &state.complete)
            .finish_non_exhaustive()
    }
}
