//! End-to-end tests for configured runtimes.
//!
//! A client and a server endpoint share one runtime and talk over an
//! in-memory loopback conduit, so every request passes through both the
//! client's and the server's chains.

use parking_lot::Mutex;
use phasebus::prelude::*;
use phasebus::telemetry::LogConfig;
use phasebus_test::{
    echo_service, CapturingConduit, Journal, LoopbackConduit, RecordingInterceptor,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Server and client wired through a loopback conduit.
struct Harness {
    runtime: Runtime,
    loopback: Arc<LoopbackConduit>,
    client: Arc<Client>,
}

fn harness(runtime: Runtime, service: Service) -> Harness {
    let server = runtime.endpoint("local://echo", service).build();
    let loopback = LoopbackConduit::new(server);
    let client = runtime
        .client(
            runtime.endpoint("local://echo", echo_service()).build(),
            loopback.clone(),
        )
        .build();
    Harness {
        runtime,
        loopback,
        client,
    }
}

fn quiet_config() -> PhasebusConfig {
    let mut config = PhasebusConfig::default();
    config.logging.enabled = false;
    config
}

// ============================================================================
// Request / response
// ============================================================================

#[test]
fn test_two_way_round_trip() {
    let h = harness(Runtime::new(PhasebusConfig::default()).unwrap(), echo_service());

    let reply = h
        .client
        .invoke("echo", Parameters::new(vec![json!("a"), json!(1)]))
        .unwrap();
    assert_eq!(reply, Some(Parameters::new(vec![json!("a"), json!(1)])));

    let requests = h.loopback.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].json().unwrap(),
        json!({"operation": "echo", "params": ["a", 1]})
    );
    assert!(h.loopback.server_exchanges()[0].is_complete());
}

#[test]
fn test_one_way_invocation_returns_nothing() {
    let h = harness(Runtime::new(quiet_config()).unwrap(), echo_service());

    let reply = h.client.invoke("notify", Parameters::empty()).unwrap();
    assert_eq!(reply, None);

    let exchanges = h.loopback.server_exchanges();
    assert_eq!(exchanges.len(), 1);
    assert!(exchanges[0].is_one_way());
    assert!(exchanges[0].out_message().is_none());
}

#[test]
fn test_unknown_client_operation_is_not_sent() {
    let h = harness(Runtime::new(quiet_config()).unwrap(), echo_service());

    let err = h.client.invoke("shout", Parameters::empty()).unwrap_err();
    assert!(matches!(err, ClientError::UnknownOperation { ref operation, .. } if operation == "shout"));
    assert!(h.loopback.requests().is_empty());
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn test_application_fault_reaches_client() {
    let h = harness(Runtime::new(quiet_config()).unwrap(), echo_service());

    let err = h.client.invoke("deny", Parameters::empty()).unwrap_err();
    let fault = err.fault().unwrap();
    assert_eq!(fault.category(), FaultCategory::Application);
    assert_eq!(fault.message(), "request denied");
    assert_eq!(fault, &Fault::application("DENIED", "request denied"));
}

fn failing_service() -> Service {
    Service::from_fn("ledger", |_, _, _| {
        Err(Fault::server("ledger db unreachable").with_detail("host=db-1"))
    })
    .operation(OperationInfo::two_way("echo"))
}

#[test]
fn test_server_fault_is_redacted_in_production() {
    let mut config = PhasebusConfig::production();
    config.logging.enabled = false;
    let redacted = config.faults.redacted_message.clone();
    let h = harness(Runtime::new(config).unwrap(), failing_service());

    let err = h.client.invoke("echo", Parameters::empty()).unwrap_err();
    let fault = err.fault().unwrap();
    assert_eq!(fault.category(), FaultCategory::Server);
    assert_eq!(fault.message(), redacted);
    assert_eq!(fault.detail(), None);
}

#[test]
fn test_server_fault_is_exposed_in_development() {
    let mut config = PhasebusConfig::development();
    config.logging.enabled = false;
    let h = harness(Runtime::new(config).unwrap(), failing_service());

    let err = h.client.invoke("echo", Parameters::empty()).unwrap_err();
    let fault = err.fault().unwrap();
    assert_eq!(fault.message(), "ledger db unreachable");
    assert_eq!(fault.detail(), Some("host=db-1"));
}

#[test]
fn test_unanswered_request_times_out() {
    let mut config = quiet_config();
    config.client.timeout_ms = 50;
    let runtime = Runtime::new(config).unwrap();

    let conduit = CapturingConduit::new();
    let client = runtime
        .client(
            runtime.endpoint("local://void", echo_service()).build(),
            conduit.clone(),
        )
        .build();

    let err = client.invoke("echo", Parameters::empty()).unwrap_err();
    assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));
    assert_eq!(conduit.count(), 1);
}

// ============================================================================
// Correlation
// ============================================================================

#[test]
fn test_response_relates_to_request() {
    let runtime = Runtime::builder(quiet_config())
        .trust_incoming_ids(true)
        .build()
        .unwrap();
    let server = runtime.endpoint("local://echo", echo_service()).build();
    let loopback = LoopbackConduit::new(server);

    let seen: Arc<Mutex<Option<String>>> = Arc::default();
    let client = runtime
        .client(
            runtime.endpoint("local://echo", echo_service()).build(),
            loopback.clone(),
        )
        .interceptor(Flow::In, {
            let seen = Arc::clone(&seen);
            FnInterceptor::new(
                InterceptorDescriptor::new("capture-relates-to", phases::LOGICAL),
                move |message| {
                    *seen.lock() = message.property(&keys::RELATES_TO).cloned();
                    Ok(Control::Continue)
                },
            )
        })
        .build();

    client.invoke("echo", Parameters::empty()).unwrap();

    let request_id = loopback.requests()[0].message_id.clone();
    assert!(request_id.is_some());
    assert_eq!(*seen.lock(), request_id);

    let server_exchange = &loopback.server_exchanges()[0];
    let request = server_exchange.in_message().unwrap();
    let correlation = request
        .lock()
        .property(&keys::CORRELATION_ID)
        .map(ToString::to_string);
    assert_eq!(correlation, request_id);
}

// ============================================================================
// Executors
// ============================================================================

#[test]
fn test_worker_executor_round_trip() {
    let mut config = quiet_config();
    config.executor.mode = ExecutorMode::Tokio;
    config.executor.worker_threads = 2;
    let h = harness(Runtime::new(config).unwrap(), echo_service());
    assert!(h.runtime.worker().is_some());

    for n in 0..5 {
        let reply = h.client.invoke("echo", Parameters::single(json!(n))).unwrap();
        assert_eq!(reply, Some(Parameters::single(json!(n))));
    }

    let err = h.client.invoke("deny", Parameters::empty()).unwrap_err();
    assert_eq!(err.fault(), Some(&Fault::application("DENIED", "request denied")));

    let Harness { runtime, .. } = h;
    runtime.shutdown();
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_adds_custom_phase() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[phases]
inbound = ["receive", "unmarshal", "audit", "pre-logical", "invoke", "post-invoke"]
outbound = ["setup", "marshal", "write", "send"]

[client]
timeout_ms = 2000

[logging]
enabled = false
"#
    )
    .unwrap();

    let runtime = Runtime::from_file(file.path()).unwrap();
    assert_eq!(runtime.config().client_timeout(), Duration::from_secs(2));

    let journal = Journal::new();
    let service = echo_service().interceptor(
        Flow::In,
        RecordingInterceptor::new("audit-trail", "audit", &journal),
    );
    let server = runtime.endpoint("local://audited", service).build();
    let client = runtime
        .client(
            runtime.endpoint("local://audited", echo_service()).build(),
            LoopbackConduit::new(server),
        )
        .build();

    client.invoke("echo", Parameters::single(json!("x"))).unwrap();
    assert_eq!(journal.handled(), vec!["audit-trail"]);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Runtime::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_dropped_stock_phase_fails_resolution() {
    let config = ConfigLoader::new()
        .with_string(
            r#"
[phases]
inbound = ["unmarshal", "pre-logical", "invoke", "post-invoke"]
outbound = ["setup", "marshal", "write", "send"]
"#,
            "toml",
        )
        .unwrap()
        .load()
        .unwrap();

    let runtime = Runtime::new(config).unwrap();
    let endpoint = runtime.endpoint("local://broken", echo_service()).build();

    let err = endpoint.resolve_chain(Flow::In).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_bus_interceptor_runs_on_both_sides() {
    let journal = Journal::new();
    let runtime = Runtime::builder(quiet_config())
        .interceptor(
            Flow::In,
            RecordingInterceptor::new("bus-audit", phases::LOGICAL, &journal),
        )
        .build()
        .unwrap();
    let h = harness(runtime, echo_service());

    h.client.invoke("echo", Parameters::empty()).unwrap();

    // Once for the request on the server, once for the response on the client.
    assert_eq!(journal.count("bus-audit"), 2);
}

#[test]
fn test_log_config_follows_logging_section() {
    let config = PhasebusConfig::production();
    let log: LogConfig = config.logging.to_log_config();
    assert!(log.json_format);
    assert_eq!(log.level, "info");
}
