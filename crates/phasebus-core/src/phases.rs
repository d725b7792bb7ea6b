//! Canonical phase names.
//!
//! Interceptors name the phase they belong to with one of these constants.
//! The default phase lists are the order the pipeline uses when no
//! configuration overrides them. Fault flows reuse the outbound list.

/// Raw bytes arrive from the transport.
pub const RECEIVE: &str = "receive";
/// Before the payload stream is wrapped or decoded.
pub const PRE_STREAM: &str = "pre-stream";
/// Payload is read into a structured representation.
pub const READ: &str = "read";
/// Protocol-level headers are processed.
pub const PRE_PROTOCOL: &str = "pre-protocol";
/// Body is converted into typed parameters.
pub const UNMARSHAL: &str = "unmarshal";
/// Before logical (operation-level) processing.
pub const PRE_LOGICAL: &str = "pre-logical";
/// Logical processing (operation-level handlers).
pub const LOGICAL: &str = "logical";
/// After logical processing.
pub const POST_LOGICAL: &str = "post-logical";
/// Immediately before the service is invoked.
pub const PRE_INVOKE: &str = "pre-invoke";
/// The service is invoked.
pub const INVOKE: &str = "invoke";
/// After the service returned.
pub const POST_INVOKE: &str = "post-invoke";

/// Outbound message is prepared.
pub const SETUP: &str = "setup";
/// Before the transport is asked for an output stream.
pub const PREPARE_SEND: &str = "prepare-send";
/// Typed content is converted into the wire body.
pub const MARSHAL: &str = "marshal";
/// Wire body is written.
pub const WRITE: &str = "write";
/// After protocol headers were written.
pub const POST_PROTOCOL: &str = "post-protocol";
/// The message is handed to the transport.
pub const SEND: &str = "send";

/// Default inbound phase order.
pub const DEFAULT_INBOUND: &[&str] = &[
    RECEIVE,
    PRE_STREAM,
    READ,
    PRE_PROTOCOL,
    UNMARSHAL,
    PRE_LOGICAL,
    LOGICAL,
    POST_LOGICAL,
    PRE_INVOKE,
    INVOKE,
    POST_INVOKE,
];

/// Default outbound phase order, also used for fault flows.
pub const DEFAULT_OUTBOUND: &[&str] = &[
    SETUP,
    PRE_LOGICAL,
    LOGICAL,
    POST_LOGICAL,
    PREPARE_SEND,
    PRE_PROTOCOL,
    MARSHAL,
    WRITE,
    POST_PROTOCOL,
    SEND,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_lists_have_unique_names() {
        for list in [DEFAULT_INBOUND, DEFAULT_OUTBOUND] {
            let unique: HashSet<_> = list.iter().collect();
            assert_eq!(unique.len(), list.len());
        }
    }

    #[test]
    fn test_inbound_ends_with_invocation() {
        assert_eq!(DEFAULT_INBOUND.first(), Some(&RECEIVE));
        assert_eq!(DEFAULT_INBOUND.last(), Some(&POST_INVOKE));
        assert_eq!(DEFAULT_OUTBOUND.last(), Some(&SEND));
    }
}
