//! Message logging.
//!
//! Logs one `info` event per message with its metadata and a preview of the
//! payload, truncated to a configurable number of bytes.

use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use phasebus_core::{keys, phases, Payload};
use tracing::{info, warn};

/// Default number of payload bytes shown.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 1024;

fn preview(message: &Message, limit: usize) -> String {
    let Some(payload) = message.content::<Payload>() else {
        return String::new();
    };
    let text = payload.to_text_lossy();
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated {} bytes)", &text[..end], text.len() - end)
}

fn log_message(message: &Message, limit: usize, event: &'static str) {
    let exchange_id = message
        .exchange()
        .map(|exchange| exchange.id().to_string())
        .unwrap_or_default();
    info!(
        exchange_id = %exchange_id,
        message_id = %message.id(),
        direction = message.direction().as_str(),
        operation = message.property(&keys::OPERATION).map_or("", String::as_str),
        content_type = message.property(&keys::CONTENT_TYPE).map_or("", String::as_str),
        payload = %preview(message, limit),
        "{event}"
    );
}

/// Logs inbound messages as they are received.
#[derive(Debug)]
pub struct LoggingInInterceptor {
    descriptor: InterceptorDescriptor,
    payload_limit: usize,
}

impl LoggingInInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.logging-in";

    /// Creates the interceptor.
    #[must_use]
    pub fn new(payload_limit: usize) -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::RECEIVE)
                .after(super::CorrelationInInterceptor::ID),
            payload_limit,
        }
    }
}

impl Default for LoggingInInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_LIMIT)
    }
}

impl Interceptor for LoggingInInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        log_message(message, self.payload_limit, "Inbound message");
        Ok(Control::Continue)
    }

    fn handle_fault(&self, message: &mut Message) {
        warn!(
            message_id = %message.id(),
            fault = %message.error().map(ToString::to_string).unwrap_or_default(),
            "Inbound message failed"
        );
    }
}

/// Logs outbound messages once they are marshalled.
#[derive(Debug)]
pub struct LoggingOutInterceptor {
    descriptor: InterceptorDescriptor,
    payload_limit: usize,
}

impl LoggingOutInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.logging-out";

    /// Creates the interceptor.
    #[must_use]
    pub fn new(payload_limit: usize) -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::WRITE),
            payload_limit,
        }
    }
}

impl Default for LoggingOutInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_LIMIT)
    }
}

impl Interceptor for LoggingOutInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        log_message(message, self.payload_limit, "Outbound message");
        Ok(Control::Continue)
    }

    fn handle_fault(&self, message: &mut Message) {
        warn!(
            message_id = %message.id(),
            fault = %message.error().map(ToString::to_string).unwrap_or_default(),
            "Outbound message failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_payload(text: &'static str) -> Message {
        let mut message = Message::inbound();
        message.set_content(Payload::from(text));
        message
    }

    #[test]
    fn test_short_payload_shown_whole() {
        assert_eq!(preview(&with_payload("{\"a\":1}"), 64), "{\"a\":1}");
        assert_eq!(preview(&Message::inbound(), 64), "");
    }

    #[test]
    fn test_long_payload_truncated() {
        assert_eq!(
            preview(&with_payload("abcdefghij"), 4),
            "abcd...(truncated 6 bytes)"
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes; a limit of 2 would split it.
        assert_eq!(preview(&with_payload("aé"), 2), "a...(truncated 2 bytes)");
    }

    #[test]
    fn test_interceptors_continue() {
        let mut message = with_payload("{}");
        assert_eq!(
            LoggingInInterceptor::default().handle_message(&mut message),
            Ok(Control::Continue)
        );
        assert_eq!(
            LoggingOutInterceptor::new(8).handle_message(&mut message),
            Ok(Control::Continue)
        );
    }
}
