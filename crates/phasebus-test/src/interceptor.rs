//! Recording interceptors.

use crate::journal::{Journal, FAULT_PREFIX};
use phasebus_core::Fault;
use phasebus_pipeline::{Control, Interceptor, InterceptorDescriptor, InterceptorResult, Message};

/// What a [`RecordingInterceptor`] does after recording its entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Behaviour {
    /// Return [`Control::Continue`].
    Continue,
    /// Return [`Control::Suspend`].
    Suspend,
    /// Return the fault.
    Fail(Fault),
    /// Attach the fault with [`Message::set_error`] and continue.
    AttachError(Fault),
    /// Return [`Control::Stop`].
    Stop,
}

/// An interceptor that writes its ID to a [`Journal`] when it handles a
/// message, and `fault:<id>` when it handles a fault.
///
/// ```
/// use phasebus_core::phases;
/// use phasebus_pipeline::{Control, Interceptor, Message};
/// use phasebus_test::{Journal, RecordingInterceptor};
///
/// let journal = Journal::new();
/// let decode = RecordingInterceptor::new("decode", phases::UNMARSHAL, &journal).after("read");
///
/// let mut message = Message::inbound();
/// assert_eq!(decode.handle_message(&mut message), Ok(Control::Continue));
/// assert_eq!(journal.entries(), vec!["decode"]);
/// ```
#[derive(Debug)]
pub struct RecordingInterceptor {
    descriptor: InterceptorDescriptor,
    journal: Journal,
    behaviour: Behaviour,
}

impl RecordingInterceptor {
    /// Creates an interceptor that records and continues.
    pub fn new(id: impl Into<String>, phase: impl Into<String>, journal: &Journal) -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(id, phase),
            journal: journal.clone(),
            behaviour: Behaviour::Continue,
        }
    }

    /// Creates an interceptor that records and fails with `fault`.
    pub fn failing(
        id: impl Into<String>,
        phase: impl Into<String>,
        journal: &Journal,
        fault: Fault,
    ) -> Self {
        Self::new(id, phase, journal).behaviour(Behaviour::Fail(fault))
    }

    /// Sets the behaviour.
    pub fn behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Adds a constraint to run before `id`.
    pub fn before(mut self, id: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.before(id);
        self
    }

    /// Adds a constraint to run after `id`.
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.after(id);
        self
    }
}

impl Interceptor for RecordingInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        self.journal.record(self.descriptor.id());
        match &self.behaviour {
            Behaviour::Continue => Ok(Control::Continue),
            Behaviour::Suspend => Ok(Control::Suspend),
            Behaviour::Fail(fault) => Err(fault.clone()),
            Behaviour::AttachError(fault) => {
                message.set_error(fault.clone());
                Ok(Control::Continue)
            }
            Behaviour::Stop => Ok(Control::Stop),
        }
    }

    fn handle_fault(&self, _message: &mut Message) {
        self.journal
            .record(format!("{FAULT_PREFIX}{}", self.descriptor.id()));
    }
}
