//! JSON binding.
//!
//! Requests travel as `{"operation": "...", "params": [...]}`, responses as
//! `{"result": [...]}` and faults as the [`FaultEnvelope`] produced by
//! [`FaultOutInterceptor`].

use super::FaultOutInterceptor;
use crate::endpoint::Binding;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use crate::provider::Flow;
use phasebus_core::{keys, phases, Fault, FaultEnvelope, Parameters, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Media type set on marshalled JSON payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Serialize, Deserialize)]
struct RequestBody {
    operation: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResponseBody {
    result: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyBody {
    Fault(FaultEnvelope),
    Result(ResponseBody),
}

/// Decodes the JSON [`Payload`] into [`Parameters`].
///
/// On the receiving side it also resolves the operation: unknown
/// operations are client faults, and operations without a response mark
/// the exchange one-way. On the requesting side a fault envelope is turned
/// back into the [`Fault`] it describes.
#[derive(Debug)]
pub struct JsonInInterceptor {
    descriptor: InterceptorDescriptor,
}

impl JsonInInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.json-in";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::UNMARSHAL),
        }
    }

    fn read_request(message: &mut Message, payload: &Payload) -> InterceptorResult {
        let request: RequestBody = serde_json::from_slice(payload.as_bytes())
            .map_err(|e| Fault::client("malformed request").with_detail(e.to_string()))?;

        if let Some(exchange) = message.exchange() {
            if let Some(endpoint) = exchange.endpoint() {
                let operation = endpoint
                    .service()
                    .find_operation(&request.operation)
                    .ok_or_else(|| {
                        Fault::client(format!("unknown operation '{}'", request.operation))
                    })?;
                if operation.is_one_way() {
                    exchange.set_one_way(true);
                }
            }
        }

        trace!(operation = %request.operation, params = request.params.len(), "Request decoded");
        message.set_property(&keys::OPERATION, request.operation);
        message.set_content(Parameters::new(request.params));
        Ok(Control::Continue)
    }

    fn read_reply(message: &mut Message, payload: &Payload) -> InterceptorResult {
        let reply: ReplyBody = serde_json::from_slice(payload.as_bytes())
            .map_err(|e| Fault::client("malformed response").with_detail(e.to_string()))?;

        match reply {
            ReplyBody::Fault(envelope) => Err(Fault::from_envelope(envelope)),
            ReplyBody::Result(body) => {
                message.set_content(Parameters::new(body.result));
                Ok(Control::Continue)
            }
        }
    }
}

impl Default for JsonInInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for JsonInInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        let payload = message
            .take_content::<Payload>()
            .ok_or_else(|| Fault::client("message has no payload"))?;

        if message.is_requestor() {
            Self::read_reply(message, &payload)
        } else {
            Self::read_request(message, &payload)
        }
    }
}

/// Encodes [`Parameters`] into a JSON [`Payload`].
///
/// Requests carry the operation named by [`keys::OPERATION`]; responses
/// wrap the parameters as the result.
#[derive(Debug)]
pub struct JsonOutInterceptor {
    descriptor: InterceptorDescriptor,
}

impl JsonOutInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.json-out";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::MARSHAL),
        }
    }
}

impl Default for JsonOutInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for JsonOutInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        let params = message
            .take_content::<Parameters>()
            .unwrap_or_else(Parameters::empty)
            .into_inner();

        let encoded = if message.is_requestor() {
            let operation = message
                .property(&keys::OPERATION)
                .cloned()
                .ok_or_else(|| Fault::client("request does not name an operation"))?;
            serde_json::to_vec(&RequestBody { operation, params })
        } else {
            serde_json::to_vec(&ResponseBody { result: params })
        };
        let encoded = encoded.map_err(Fault::from_error)?;

        message.set_content(Payload::from(encoded));
        message.set_property(&keys::CONTENT_TYPE, JSON_CONTENT_TYPE.to_string());
        Ok(Control::Continue)
    }
}

impl Binding {
    /// The JSON binding with the default fault marshaller.
    #[must_use]
    pub fn json() -> Self {
        Self::json_with(FaultOutInterceptor::default())
    }

    /// The JSON binding with a configured fault marshaller.
    #[must_use]
    pub fn json_with(faults: FaultOutInterceptor) -> Self {
        Self::new("json")
            .interceptor(Flow::In, JsonInInterceptor::new())
            .interceptor(Flow::InFault, JsonInInterceptor::new())
            .interceptor(Flow::Out, JsonOutInterceptor::new())
            .interceptor(Flow::OutFault, faults)
    }
}
