//! The interceptor contract.
//!
//! An interceptor is one pluggable processing step. It declares where it
//! runs through an [`InterceptorDescriptor`] (phase plus before/after
//! constraints) and exposes two entry points: [`Interceptor::handle_message`]
//! for normal processing and [`Interceptor::handle_fault`], called in
//! reverse order when the chain unwinds after a failure.
//!
//! # Example
//!
//! ```
//! use phasebus_core::{phases, Payload};
//! use phasebus_pipeline::{Control, Interceptor, InterceptorDescriptor, InterceptorResult, Message};
//!
//! struct RejectEmpty {
//!     descriptor: InterceptorDescriptor,
//! }
//!
//! impl Interceptor for RejectEmpty {
//!     fn descriptor(&self) -> &InterceptorDescriptor {
//!         &self.descriptor
//!     }
//!
//!     fn handle_message(&self, message: &mut Message) -> InterceptorResult {
//!         match message.content::<Payload>() {
//!             Some(payload) if !payload.is_empty() => Ok(Control::Continue),
//!             _ => Err(phasebus_core::Fault::client("empty request")),
//!         }
//!     }
//! }
//!
//! let check = RejectEmpty {
//!     descriptor: InterceptorDescriptor::new("reject-empty", phases::READ),
//! };
//! assert_eq!(check.id(), "reject-empty");
//! ```

use crate::message::Message;
use phasebus_core::Fault;
use std::fmt;
use std::sync::Arc;

/// Identity and ordering constraints of an interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorDescriptor {
    id: String,
    phase: String,
    before: Vec<String>,
    after: Vec<String>,
}

impl InterceptorDescriptor {
    /// Creates a descriptor for an interceptor in `phase`.
    pub fn new(id: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: phase.into(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Requires this interceptor to run before `id` (an interceptor ID or a
    /// phase name).
    #[must_use]
    pub fn before(mut self, id: impl Into<String>) -> Self {
        self.before.push(id.into());
        self
    }

    /// Requires this interceptor to run after `id` (an interceptor ID or a
    /// phase name).
    #[must_use]
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after.push(id.into());
        self
    }

    /// Returns the interceptor ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the phase name.
    #[must_use]
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Returns the IDs this interceptor must precede.
    #[must_use]
    pub fn before_ids(&self) -> &[String] {
        &self.before
    }

    /// Returns the IDs this interceptor must follow.
    #[must_use]
    pub fn after_ids(&self) -> &[String] {
        &self.after
    }
}

/// What the chain should do after an interceptor returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Run the next interceptor.
    Continue,
    /// Pause the chain; it is resumed later by driving the message again.
    Suspend,
    /// Stop processing and unwind as if a fault had been raised.
    Stop,
}

/// Result of [`Interceptor::handle_message`].
pub type InterceptorResult = Result<Control, Fault>;

/// A processing step in an interceptor chain.
pub trait Interceptor: Send + Sync + 'static {
    /// Returns the identity and ordering constraints.
    fn descriptor(&self) -> &InterceptorDescriptor;

    /// Returns the interceptor ID.
    fn id(&self) -> &str {
        self.descriptor().id()
    }

    /// Processes the message.
    ///
    /// Returning `Err` attaches the fault to the message and unwinds the
    /// chain. An interceptor may also attach an error with
    /// [`Message::set_error`] and return `Continue`; the chain detects it at
    /// the next step boundary.
    fn handle_message(&self, message: &mut Message) -> InterceptorResult;

    /// Called during unwind if `handle_message` ran for this message.
    fn handle_fault(&self, _message: &mut Message) {}
}

/// A shared, type-erased interceptor.
pub type BoxedInterceptor = Arc<dyn Interceptor>;

type MessageFn = dyn Fn(&mut Message) -> InterceptorResult + Send + Sync;
type FaultFn = dyn Fn(&mut Message) + Send + Sync;

/// An interceptor built from closures.
///
/// ```
/// use phasebus_pipeline::{Control, FnInterceptor, InterceptorDescriptor};
///
/// let tag = FnInterceptor::new(InterceptorDescriptor::new("tag", "logical"), |message| {
///     message.set_content(String::from("tagged"));
///     Ok(Control::Continue)
/// });
/// ```
pub struct FnInterceptor {
    descriptor: InterceptorDescriptor,
    on_message: Box<MessageFn>,
    on_fault: Option<Box<FaultFn>>,
}

impl FnInterceptor {
    /// Creates an interceptor that runs `f` on each message.
    pub fn new<F>(descriptor: InterceptorDescriptor, f: F) -> Self
    where
        F: Fn(&mut Message) -> InterceptorResult + Send + Sync + 'static,
    {
        Self {
            descriptor,
            on_message: Box::new(f),
            on_fault: None,
        }
    }

    /// Sets the closure run during unwind.
    #[must_use]
    pub fn on_fault<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        self.on_fault = Some(Box::new(f));
        self
    }
}

impl Interceptor for FnInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        (self.on_message)(message)
    }

    fn handle_fault(&self, message: &mut Message) {
        if let Some(on_fault) = &self.on_fault {
            on_fault(message);
        }
    }
}

impl fmt::Debug for FnInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
