//! Server-side exchange integration tests.
//!
//! Requests enter through the [`ChainInitiationObserver`] of an endpoint
//! with the JSON binding; responses and fault responses leave through a
//! capturing conduit.

use parking_lot::Mutex;
use phasebus_core::{keys, phases, Fault, Parameters, Payload, PropertyKey};
use phasebus_pipeline::{
    Binding, Bus, ChainInitiationObserver, ChainState, Conduit, Control, Endpoint, Exchange,
    Executor, FnInterceptor, Flow, InterceptorDescriptor, Job, Message, OperationInfo,
    PipelineError, Service, TokioExecutor,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TENANT: PropertyKey<String> = PropertyKey::application("tenant");

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Sink {
    sent: Mutex<Vec<(Value, bool)>>,
    broken: bool,
}

impl Sink {
    fn sent(&self) -> Vec<(Value, bool)> {
        self.sent.lock().clone()
    }
}

impl Conduit for Sink {
    fn send(&self, message: &mut Message) -> Result<(), Fault> {
        if self.broken {
            return Err(Fault::transport("peer closed"));
        }
        let body = message
            .content::<Payload>()
            .map(|p| serde_json::from_slice(p.as_bytes()).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        let is_fault = message.content::<Fault>().is_some();
        self.sent.lock().push((body, is_fault));
        Ok(())
    }
}

fn math_service() -> Service {
    Service::from_fn("math", |_, operation, params| match operation {
        "double" => {
            let n = params
                .get(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| Fault::client("expected a number"))?;
            Ok(Parameters::single(json!(n * 2)))
        }
        "record" => Ok(Parameters::empty()),
        _ => Err(Fault::application("UNSUPPORTED", "operation not supported")),
    })
    .operation(OperationInfo::two_way("double"))
    .operation(OperationInfo::one_way("record"))
    .operation(OperationInfo::two_way("explode"))
}

fn recorder(log: &Log, id: &str, phase: &str) -> FnInterceptor {
    let on_message = Arc::clone(log);
    let on_fault = Arc::clone(log);
    let name = id.to_string();
    let fault_name = format!("fault:{id}");
    FnInterceptor::new(
        InterceptorDescriptor::new(id, phase).after("phasebus.json-in"),
        move |_| {
            on_message.lock().push(name.clone());
            Ok(Control::Continue)
        },
    )
    .on_fault(move |_| on_fault.lock().push(fault_name.clone()))
}

fn endpoint(service: Service, log: &Log) -> Arc<Endpoint> {
    Endpoint::builder(
        "local://math",
        Bus::builder().build(),
        Arc::new(service),
        Arc::new(Binding::json()),
    )
    .interceptor(Flow::In, recorder(log, "unmarshal", phases::UNMARSHAL))
    .interceptor(Flow::OutFault, {
        let log = Arc::clone(log);
        FnInterceptor::new(
            InterceptorDescriptor::new("out-fault", phases::LOGICAL),
            move |message| {
                let fault = message.content::<Fault>().map(ToString::to_string);
                log.lock().push(format!("out-fault:{}", fault.unwrap_or_default()));
                Ok(Control::Continue)
            },
        )
    })
    .build()
}

fn request(operation: &str, params: Value) -> Message {
    let mut message = Message::inbound();
    let body = json!({"operation": operation, "params": params});
    message.set_content(Payload::from(body.to_string()));
    message.set_property(&TENANT, "acme".to_string());
    message
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

#[test]
fn test_two_way_request_produces_response() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let exchange = observer
        .on_message(request("double", json!([21])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.is_complete());
    assert_eq!(sink.sent(), vec![(json!({"result": [42]}), false)]);
    assert_eq!(entries(&log), vec!["unmarshal"]);

    let response = exchange.out_message().unwrap();
    let response = response.lock();
    assert_eq!(response.property(&keys::OPERATION), Some(&"double".to_string()));
    assert_eq!(response.chain_state(), Some(ChainState::Complete));
}

#[test]
fn test_failed_invoke_unwinds_then_sends_fault() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let exchange = observer
        .on_message(request("explode", json!([])), Some(sink.clone()))
        .unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "unmarshal",
            "fault:unmarshal",
            "out-fault:application fault [UNSUPPORTED]: operation not supported",
        ]
    );

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    let (body, is_fault) = &sent[0];
    assert!(*is_fault);
    assert_eq!(body["fault"]["category"], "application");
    assert_eq!(body["fault"]["application_code"], "UNSUPPORTED");

    let fault_message = exchange.fault_message().unwrap();
    let fault_message = fault_message.lock();
    assert_eq!(
        fault_message.content::<Fault>(),
        Some(&Fault::application("UNSUPPORTED", "operation not supported"))
    );
    assert_eq!(fault_message.property(&TENANT), Some(&"acme".to_string()));
    assert!(exchange.is_complete());
}

#[test]
fn test_malformed_request_is_client_fault() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let mut message = Message::inbound();
    message.set_content(Payload::from("{not json"));
    observer.on_message(message, Some(sink.clone())).unwrap();

    let sent = sink.sent();
    assert_eq!(sent[0].0["fault"]["code"], "Client");
    assert_eq!(sent[0].0["fault"]["message"], "malformed request");
    // The decoder failed before "unmarshal" ran.
    assert_eq!(entries(&log), vec!["out-fault:client fault: malformed request"]);
}

#[test]
fn test_unknown_operation_is_client_fault() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    observer
        .on_message(request("divide", json!([1])), Some(sink.clone()))
        .unwrap();

    let sent = sink.sent();
    assert_eq!(sent[0].0["fault"]["message"], "unknown operation 'divide'");
}

#[test]
fn test_one_way_request_has_no_outbound_chain() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let exchange = observer
        .on_message(request("record", json!(["event"])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.is_one_way());
    assert!(exchange.is_complete());
    assert!(exchange.out_message().is_none());
    assert!(sink.sent().is_empty());
    assert_eq!(
        exchange.drive_outbound().unwrap_err(),
        PipelineError::OneWayExchange {
            exchange: exchange.id()
        }
    );
}

#[test]
fn test_marking_one_way_detaches_outbound_chain() {
    let log = Log::default();
    let endpoint = endpoint(math_service(), &log);
    let exchange = Exchange::new();
    exchange.set_endpoint(Arc::clone(&endpoint));

    let mut out = Message::outbound();
    out.set_chain(phasebus_pipeline::InterceptorChain::new(
        endpoint.resolve_chain(Flow::Out).unwrap(),
        Flow::Out,
    ));
    let shared = exchange.set_out_message(out);

    exchange.set_one_way(true);
    assert!(exchange.out_message().is_none());

    // A handle kept from before is inert too.
    let err = shared.lock().drive().unwrap_err();
    assert!(matches!(err, PipelineError::OneWayExchange { .. }));
    assert_eq!(shared.lock().chain_state(), Some(ChainState::Pending));
}

#[test]
fn test_fault_chain_failure_reaches_transport() {
    let log = Log::default();
    let sink = Arc::new(Sink {
        sent: Mutex::default(),
        broken: true,
    });
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let err = observer
        .on_message(request("explode", json!([])), Some(sink))
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::FaultChain {
            fault: Fault::transport("peer closed")
        }
    );
}

#[test]
fn test_missing_back_channel_fails_fault_chain() {
    let log = Log::default();
    let observer = ChainInitiationObserver::new(endpoint(math_service(), &log));

    let err = observer
        .on_message(request("explode", json!([])), None)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::FaultChain {
            fault: Fault::Transport { .. }
        }
    ));
}

#[test]
fn test_worker_executor_suspends_and_resumes() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(runtime.handle().clone()));

    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service().executor(executor), &log));

    let exchange = observer
        .on_message(request("double", json!([5])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.wait_for_completion(Duration::from_secs(5)));
    assert_eq!(sink.sent(), vec![(json!({"result": [10]}), false)]);

    let request = exchange.in_message().unwrap();
    assert_eq!(request.lock().chain_state(), Some(ChainState::Complete));
    // Every interceptor of the inbound chain ran exactly once.
    assert_eq!(entries(&log), vec!["unmarshal"]);
}

#[test]
fn test_worker_executor_fault_is_sent_after_resume() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(runtime.handle().clone()));

    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service().executor(executor), &log));

    let exchange = observer
        .on_message(request("explode", json!([])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.wait_for_completion(Duration::from_secs(5)));
    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1);
    assert_eq!(
        entries(&log),
        vec![
            "unmarshal",
            "fault:unmarshal",
            "out-fault:application fault [UNSUPPORTED]: operation not supported",
        ]
    );
}

#[test]
fn test_rejected_submission_sends_fault() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(runtime.handle().clone()));
    runtime.shutdown_timeout(Duration::from_millis(100));

    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(math_service().executor(executor), &log));

    let exchange = observer
        .on_message(request("double", json!([5])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.wait_for_completion(Duration::from_secs(5)));
    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1);
    assert_eq!(
        entries(&log),
        vec![
            "unmarshal",
            "fault:unmarshal",
            "out-fault:server fault: executor 'tokio' rejected the invocation",
        ]
    );
}

#[test]
fn test_panicking_service_sends_fault() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(runtime.handle().clone()));
    let service = Service::from_fn("math", |_, _, _| panic!("ledger corrupted"))
        .operation(OperationInfo::two_way("double"))
        .executor(executor);

    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(service, &log));

    let exchange = observer
        .on_message(request("double", json!([5])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.wait_for_completion(Duration::from_secs(5)));
    assert_eq!(sink.sent().len(), 1);
    assert_eq!(
        exchange.in_message().unwrap().lock().chain_state(),
        Some(ChainState::Aborted)
    );
    assert_eq!(
        entries(&log).last().map(String::as_str),
        Some("out-fault:server fault: service invocation panicked")
    );
}

/// Accepts every job and never runs it.
struct Forgetful;

impl Executor for Forgetful {
    fn execute(&self, job: Job) -> Result<(), Job> {
        drop(job);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "forgetful"
    }
}

#[test]
fn test_dropped_job_sends_fault() {
    let log = Log::default();
    let sink = Arc::new(Sink::default());
    let observer = ChainInitiationObserver::new(endpoint(
        math_service().executor(Arc::new(Forgetful)),
        &log,
    ));

    let exchange = observer
        .on_message(request("double", json!([5])), Some(sink.clone()))
        .unwrap();

    assert!(exchange.wait_for_completion(Duration::from_secs(5)));
    assert_eq!(sink.sent().len(), 1);
    assert!(sink.sent()[0].1);
    assert_eq!(
        entries(&log).last().map(String::as_str),
        Some("out-fault:server fault: service invocation was dropped before it ran")
    );
}
