use super::bound_exchange;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use phasebus_core::{phases, Fault};
use tracing::debug;

/// Hands the marshalled message to the exchange's conduit.
///
/// Completes the exchange unless the message is a request still waiting
/// for its response.
#[derive(Debug)]
pub struct MessageSenderInterceptor {
    descriptor: InterceptorDescriptor,
}

impl MessageSenderInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.message-sender";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::SEND),
        }
    }
}

impl Default for MessageSenderInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for MessageSenderInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        let exchange = bound_exchange(message)?;
        let conduit = exchange
            .conduit()
            .ok_or_else(|| Fault::transport("exchange has no conduit"))?;

        conduit.send(message)?;
        debug!(exchange_id = %exchange.id(), message_id = %message.id(), "Message sent");

        let awaiting_response = message.is_requestor() && !exchange.is_one_way();
        if !awaiting_response {
            exchange.complete();
        }
        Ok(Control::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::transport::Conduit;
    use parking_lot::Mutex;
    use phasebus_core::Payload;
    use std::sync::Arc;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<String>>,
        broken: bool,
    }

    impl Conduit for Sink {
        fn send(&self, message: &mut Message) -> Result<(), Fault> {
            if self.broken {
                return Err(Fault::transport("connection reset"));
            }
            let text = message
                .content::<Payload>()
                .map(Payload::to_text_lossy)
                .unwrap_or_default();
            self.sent.lock().push(text);
            Ok(())
        }
    }

    #[test]
    fn test_response_send_completes_exchange() {
        let sink = Arc::new(Sink::default());
        let exchange = Exchange::new();
        exchange.set_conduit(sink.clone());
        let mut response = Message::outbound();
        response.set_content(Payload::from("{}"));
        let response = exchange.set_out_message(response);

        let result = MessageSenderInterceptor::new().handle_message(&mut response.lock());
        assert_eq!(result, Ok(Control::Continue));
        assert_eq!(*sink.sent.lock(), vec!["{}".to_string()]);
        assert!(exchange.is_complete());
    }

    #[test]
    fn test_two_way_request_stays_open() {
        let sink = Arc::new(Sink::default());
        let exchange = Exchange::new();
        exchange.set_conduit(sink);
        let mut request = Message::outbound();
        request.set_requestor(true);
        let request = exchange.set_out_message(request);

        MessageSenderInterceptor::new()
            .handle_message(&mut request.lock())
            .unwrap();
        assert!(!exchange.is_complete());
    }

    #[test]
    fn test_conduit_failure_is_transport_fault() {
        let exchange = Exchange::new();
        exchange.set_conduit(Arc::new(Sink {
            sent: Mutex::default(),
            broken: true,
        }));
        let response = exchange.set_out_message(Message::outbound());

        let result = MessageSenderInterceptor::new().handle_message(&mut response.lock());
        assert_eq!(result, Err(Fault::transport("connection reset")));
        assert!(!exchange.is_complete());
    }

    #[test]
    fn test_missing_conduit() {
        let exchange = Exchange::new();
        let response = exchange.set_out_message(Message::outbound());
        let result = MessageSenderInterceptor::new().handle_message(&mut response.lock());
        assert!(matches!(result, Err(Fault::Transport { .. })));
    }
}
