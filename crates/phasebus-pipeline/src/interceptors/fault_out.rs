use super::json::JSON_CONTENT_TYPE;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use phasebus_core::{keys, phases, Fault, Payload};

/// Default message sent in place of redacted server faults.
pub const DEFAULT_REDACTED_MESSAGE: &str = "An internal error occurred";

/// Marshals the [`Fault`] content of a fault message into a JSON fault
/// envelope.
///
/// Server-side fault messages and detail are replaced by a generic message
/// unless `expose_details` is set.
#[derive(Debug)]
pub struct FaultOutInterceptor {
    descriptor: InterceptorDescriptor,
    expose_details: bool,
    redacted_message: String,
}

impl FaultOutInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.fault-out";

    /// Creates the interceptor.
    pub fn new(expose_details: bool, redacted_message: impl Into<String>) -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::MARSHAL),
            expose_details,
            redacted_message: redacted_message.into(),
        }
    }
}

impl Default for FaultOutInterceptor {
    fn default() -> Self {
        Self::new(false, DEFAULT_REDACTED_MESSAGE)
    }
}

impl Interceptor for FaultOutInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        let envelope = message
            .content::<Fault>()
            .map(|fault| fault.to_envelope(self.expose_details, &self.redacted_message))
            .ok_or_else(|| Fault::server("fault message carries no fault"))?;

        let body = serde_json::to_vec(&envelope).map_err(Fault::from_error)?;
        message.set_content(Payload::from(body));
        message.set_property(&keys::CONTENT_TYPE, JSON_CONTENT_TYPE.to_string());
        Ok(Control::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn marshal(interceptor: &FaultOutInterceptor, fault: Fault) -> Value {
        let mut message = Message::outbound();
        message.set_content(fault);
        interceptor.handle_message(&mut message).unwrap();
        serde_json::from_slice(message.content::<Payload>().unwrap().as_bytes()).unwrap()
    }

    #[test]
    fn test_server_fault_redacted_by_default() {
        let body = marshal(
            &FaultOutInterceptor::default(),
            Fault::server("connection pool exhausted").with_detail("pool=orders"),
        );
        assert_eq!(
            body,
            json!({"fault": {"code": "Server", "category": "server", "message": DEFAULT_REDACTED_MESSAGE}})
        );
    }

    #[test]
    fn test_exposed_details() {
        let body = marshal(
            &FaultOutInterceptor::new(true, "hidden"),
            Fault::server("connection pool exhausted").with_detail("pool=orders"),
        );
        assert_eq!(body["fault"]["message"], "connection pool exhausted");
        assert_eq!(body["fault"]["detail"], "pool=orders");
    }

    #[test]
    fn test_client_fault_keeps_message() {
        let body = marshal(&FaultOutInterceptor::default(), Fault::client("malformed request"));
        assert_eq!(body["fault"]["code"], "Client");
        assert_eq!(body["fault"]["message"], "malformed request");
    }

    #[test]
    fn test_missing_fault_content() {
        let mut message = Message::outbound();
        assert!(FaultOutInterceptor::default()
            .handle_message(&mut message)
            .is_err());
    }
}
