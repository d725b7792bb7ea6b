use super::bound_exchange;
use crate::error::PipelineError;
use crate::exchange::Exchange;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::{Message, SharedMessage};
use phasebus_core::{keys, phases, Fault, Parameters};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Calls the service for the operation resolved on the request.
///
/// Reads the operation name from [`keys::OPERATION`] and the arguments from
/// the [`Parameters`] slot, and stores the result parameters on the
/// outbound message. With an inline executor the call happens on the
/// driving thread. Otherwise the call is submitted to the executor and the
/// chain suspends; the worker takes the inbound message lock, records the
/// outcome and resumes the chain. A panicking service resumes the chain
/// with a server fault. If the executor refuses the call, the interceptor
/// fails with a server fault instead of suspending.
#[derive(Debug)]
pub struct ServiceInvokerInterceptor {
    descriptor: InterceptorDescriptor,
}

impl ServiceInvokerInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.service-invoker";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::INVOKE),
        }
    }
}

impl Default for ServiceInvokerInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

// Results of one-way operations have nowhere to go and are dropped.
fn store_result(exchange: &Exchange, result: Parameters) {
    if let Some(out) = exchange.out_message() {
        out.lock().set_content(result);
    }
}

/// Resumes a suspended inbound chain once its invocation settles.
///
/// Dropping a submitted job before it runs still settles the chain, with a
/// server fault, unless the executor handed the job back.
struct Resumption {
    exchange: Exchange,
    request: SharedMessage,
    operation: String,
    rejected: Arc<AtomicBool>,
    settled: bool,
}

impl Resumption {
    fn settle(mut self, outcome: Result<Parameters, Fault>) {
        self.settled = true;
        resume(&self.exchange, &self.request, &self.operation, outcome);
    }
}

impl Drop for Resumption {
    fn drop(&mut self) {
        if self.settled || self.rejected.load(Ordering::Acquire) {
            return;
        }
        warn!(
            exchange_id = %self.exchange.id(),
            operation = %self.operation,
            "Invocation dropped before it ran"
        );

        // The dropping thread may be the one holding the request lock.
        let exchange = self.exchange.clone();
        let request = Arc::clone(&self.request);
        let operation = self.operation.clone();
        let spawned = thread::Builder::new()
            .name("phasebus-abandoned".to_string())
            .spawn(move || {
                let fault = Fault::server("service invocation was dropped before it ran");
                resume(&exchange, &request, &operation, Err(fault));
            });
        if let Err(err) = spawned {
            error!(
                exchange_id = %self.exchange.id(),
                error = %err,
                "Could not settle dropped invocation"
            );
        }
    }
}

fn resume(
    exchange: &Exchange,
    request: &SharedMessage,
    operation: &str,
    outcome: Result<Parameters, Fault>,
) {
    // Blocks until the suspending thread has released the message.
    let mut message = request.lock();
    match outcome {
        Ok(result) => store_result(exchange, result),
        Err(fault) => message.set_error(fault),
    }

    match message.drive() {
        Ok(state) => exchange.finish_inbound(state),
        Err(err) => {
            error!(
                exchange_id = %exchange.id(),
                operation = %operation,
                error = %err,
                "Resumed chain failed"
            );
            exchange.complete();
        }
    }
}

impl Interceptor for ServiceInvokerInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        if message.is_requestor() {
            return Ok(Control::Continue);
        }
        let exchange = bound_exchange(message)?;
        let endpoint = exchange
            .endpoint()
            .ok_or_else(|| PipelineError::NoEndpoint { exchange: exchange.id() }.into_fault())?;
        let operation = message
            .property(&keys::OPERATION)
            .cloned()
            .ok_or_else(|| Fault::client("request does not name an operation"))?;
        let params = message
            .take_content::<Parameters>()
            .unwrap_or_else(Parameters::empty);

        let invoker = endpoint.service().invoker();
        let executor = endpoint.executor();

        if executor.is_inline() {
            let result = invoker.invoke(&exchange, &operation, params)?;
            store_result(&exchange, result);
            return Ok(Control::Continue);
        }

        let request = exchange.in_message().ok_or_else(|| {
            PipelineError::MissingMessage {
                exchange: exchange.id(),
                role: "in",
            }
            .into_fault()
        })?;

        debug!(
            exchange_id = %exchange.id(),
            operation = %operation,
            executor = executor.name(),
            "Invocation handed to executor"
        );

        let rejected = Arc::new(AtomicBool::new(false));
        let resumption = Resumption {
            exchange: exchange.clone(),
            request,
            operation: operation.clone(),
            rejected: Arc::clone(&rejected),
            settled: false,
        };

        let submitted = executor.execute(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                invoker.invoke(&resumption.exchange, &resumption.operation, params)
            }))
            .unwrap_or_else(|_| {
                error!(
                    exchange_id = %resumption.exchange.id(),
                    operation = %resumption.operation,
                    "Service invocation panicked"
                );
                Err(Fault::server("service invocation panicked"))
            });
            resumption.settle(outcome);
        }));

        if let Err(job) = submitted {
            rejected.store(true, Ordering::Release);
            drop(job);
            warn!(
                exchange_id = %exchange.id(),
                operation = %operation,
                executor = executor.name(),
                "Executor rejected invocation"
            );
            return Err(Fault::server(format!(
                "executor '{}' rejected the invocation",
                executor.name()
            )));
        }

        Ok(Control::Suspend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Binding, Bus, Endpoint, OperationInfo, Service};
    use serde_json::json;
    use std::sync::Arc;

    fn exchange() -> Exchange {
        let service = Service::from_fn("math", |_, operation, params| match operation {
            "double" => {
                let n = params.get(0).and_then(serde_json::Value::as_i64).unwrap_or(0);
                Ok(Parameters::single(json!(n * 2)))
            }
            _ => Err(Fault::application("UNSUPPORTED", "not supported")),
        })
        .operation(OperationInfo::two_way("double"));

        let endpoint = Endpoint::builder(
            "local://math",
            Bus::builder().default_interceptors(false).build(),
            Arc::new(service),
            Arc::new(Binding::new("test")),
        )
        .build();

        let exchange = Exchange::new();
        exchange.set_endpoint(endpoint);
        exchange
    }

    fn request(exchange: &Exchange, operation: &str) -> crate::message::SharedMessage {
        let mut message = Message::inbound();
        message.set_property(&keys::OPERATION, operation.to_string());
        message.set_content(Parameters::single(json!(21)));
        exchange.set_in_message(message)
    }

    #[test]
    fn test_inline_invocation_writes_out_message() {
        let exchange = exchange();
        let out = exchange.set_out_message(Message::outbound());
        let request = request(&exchange, "double");

        let result = ServiceInvokerInterceptor::new().handle_message(&mut request.lock());
        assert_eq!(result, Ok(Control::Continue));
        assert_eq!(
            out.lock().content::<Parameters>(),
            Some(&Parameters::single(json!(42)))
        );
        assert!(request.lock().content::<Parameters>().is_none());
    }

    #[test]
    fn test_invoker_fault_is_returned() {
        let exchange = exchange();
        let request = request(&exchange, "halve");

        let result = ServiceInvokerInterceptor::new().handle_message(&mut request.lock());
        assert_eq!(
            result,
            Err(Fault::application("UNSUPPORTED", "not supported"))
        );
    }

    #[test]
    fn test_missing_operation_is_client_fault() {
        let exchange = exchange();
        let request = exchange.set_in_message(Message::inbound());

        let result = ServiceInvokerInterceptor::new().handle_message(&mut request.lock());
        assert!(matches!(result, Err(Fault::Client { .. })));
    }

    #[test]
    fn test_requestor_side_skipped() {
        let mut message = Message::inbound();
        message.set_requestor(true);
        assert_eq!(
            ServiceInvokerInterceptor::new().handle_message(&mut message),
            Ok(Control::Continue)
        );
    }
}
