//! Runtime assembly.
//!
//! A [`Runtime`] turns a [`PhasebusConfig`] into a bus: the configured
//! phase lists, an executor, and the stock interceptors every endpoint on
//! the bus gets.
//!
//! | Interceptor | Flows |
//! |-------------|-------|
//! | correlation-in | in |
//! | correlation-out | out, out-fault |
//! | logging-in | in, in-fault (when logging is enabled) |
//! | logging-out | out, out-fault (when logging is enabled) |
//!
//! These interceptors sit in the `receive`, `setup` and `write` phases. A
//! custom phase list that drops one of them fails at chain resolution.

use crate::error::{RuntimeError, RuntimeResult};
use anyhow::Context;
use phasebus_config::{ConfigLoader, ExecutorConfig, ExecutorMode, PhasebusConfig};
use phasebus_pipeline::interceptors::{
    CorrelationInInterceptor, CorrelationOutInterceptor, FaultOutInterceptor,
    LoggingInInterceptor, LoggingOutInterceptor,
};
use phasebus_pipeline::{
    Binding, BoxedInterceptor, Bus, Client, ClientBuilder, Conduit, Endpoint, EndpointBuilder,
    Executor, Flow, InlineExecutor, Interceptor, PhaseManager, Service, TokioExecutor,
};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration file read by [`Runtime::from_env`] when it exists.
pub const DEFAULT_CONFIG_FILE: &str = "phasebus.toml";

/// Prefix of environment overrides read by [`Runtime::from_env`].
pub const ENV_PREFIX: &str = "PHASEBUS";

/// How long [`Runtime::shutdown`] waits for running invocations.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A configured bus plus the worker runtime behind it.
pub struct Runtime {
    config: PhasebusConfig,
    bus: Arc<Bus>,
    worker: Option<tokio::runtime::Runtime>,
}

impl Runtime {
    /// Starts building a runtime from `config`.
    pub fn builder(config: PhasebusConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// Builds a runtime from `config` without touching the global logger.
    pub fn new(config: PhasebusConfig) -> RuntimeResult<Self> {
        Self::builder(config).build()
    }

    /// Loads `path` with environment overrides and builds a runtime.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = ConfigLoader::new()
            .with_defaults()
            .with_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .with_env_prefix(ENV_PREFIX)
            .load()
            .context("failed to load configuration")?;

        Self::new(config).context("failed to build runtime")
    }

    /// Bootstraps a process: reads `.env`, [`DEFAULT_CONFIG_FILE`] if it
    /// exists and `PHASEBUS__*` overrides, then installs logging and builds
    /// the runtime.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ConfigLoader::new()
            .with_defaults()
            .with_dotenv()?
            .with_optional_file(DEFAULT_CONFIG_FILE)?
            .with_env_prefix(ENV_PREFIX)
            .load()
            .context("failed to load configuration")?;

        Self::builder(config)
            .install_logging(true)
            .build()
            .context("failed to build runtime")
    }

    /// Returns the configuration the runtime was built from.
    pub const fn config(&self) -> &PhasebusConfig {
        &self.config
    }

    /// Returns the shared bus.
    pub const fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Returns the handle of the worker runtime, if invocations run on one.
    pub fn worker(&self) -> Option<&tokio::runtime::Handle> {
        self.worker.as_ref().map(tokio::runtime::Runtime::handle)
    }

    /// The JSON binding with fault marshalling set from `faults`.
    pub fn json_binding(&self) -> Binding {
        Binding::json_with(FaultOutInterceptor::new(
            self.config.faults.expose_details,
            self.config.faults.redacted_message.clone(),
        ))
    }

    /// Starts an endpoint for `service` on this bus with the JSON binding.
    pub fn endpoint(&self, address: impl Into<String>, service: Service) -> EndpointBuilder {
        Endpoint::builder(
            address,
            Arc::clone(&self.bus),
            Arc::new(service),
            Arc::new(self.json_binding()),
        )
    }

    /// Starts a client on `endpoint` with the configured timeout.
    pub fn client(&self, endpoint: Arc<Endpoint>, conduit: Arc<dyn Conduit>) -> ClientBuilder {
        Client::builder(endpoint, conduit).timeout(self.config.client_timeout())
    }

    /// Stops the worker runtime, waiting up to [`SHUTDOWN_GRACE`] for
    /// running invocations.
    ///
    /// Must not be called from inside an async context.
    pub fn shutdown(self) {
        if let Some(worker) = self.worker {
            info!("Shutting down worker runtime");
            worker.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("executor", &self.bus.executor().name())
            .field("cache_resolved", &self.bus.cache_resolved())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    config: PhasebusConfig,
    install_logging: bool,
    trust_incoming_ids: bool,
    interceptors: Vec<(Flow, BoxedInterceptor)>,
}

impl RuntimeBuilder {
    /// Creates a builder for `config`.
    pub fn new(config: PhasebusConfig) -> Self {
        Self {
            config,
            install_logging: false,
            trust_incoming_ids: false,
            interceptors: Vec::new(),
        }
    }

    /// Installs the global tracing subscriber from `logging` on build.
    pub fn install_logging(mut self, enabled: bool) -> Self {
        self.install_logging = enabled;
        self
    }

    /// Reuses a valid incoming `message-id` as the correlation ID.
    pub fn trust_incoming_ids(mut self, trust: bool) -> Self {
        self.trust_incoming_ids = trust;
        self
    }

    /// Adds a bus-scope interceptor after the stock ones.
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.push((flow, Arc::new(interceptor)));
        self
    }

    /// Validates the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let Self {
            config,
            install_logging,
            trust_incoming_ids,
            interceptors,
        } = self;

        config.validate()?;
        if install_logging {
            phasebus_telemetry::init_logging(&config.logging.to_log_config())?;
        }
        phasebus_telemetry::metrics::describe_metrics();

        let phases = PhaseManager::from_names(&config.phases.inbound, &config.phases.outbound)?;
        let (executor, worker) = start_executor(&config.executor)?;

        let correlation_in = if trust_incoming_ids {
            CorrelationInInterceptor::trust_incoming()
        } else {
            CorrelationInInterceptor::new()
        };
        let correlation_out: BoxedInterceptor = Arc::new(CorrelationOutInterceptor::new());

        let mut bus = Bus::builder()
            .phases(phases)
            .executor(Arc::clone(&executor))
            .cache_resolved(config.chain.cache_resolved)
            .interceptor(Flow::In, correlation_in)
            .shared_interceptor(Flow::Out, Arc::clone(&correlation_out))
            .shared_interceptor(Flow::OutFault, correlation_out);

        if config.logging.enabled {
            let limit = config.logging.payload_limit;
            let logging_in: BoxedInterceptor = Arc::new(LoggingInInterceptor::new(limit));
            let logging_out: BoxedInterceptor = Arc::new(LoggingOutInterceptor::new(limit));
            bus = bus
                .shared_interceptor(Flow::In, Arc::clone(&logging_in))
                .shared_interceptor(Flow::InFault, logging_in)
                .shared_interceptor(Flow::Out, Arc::clone(&logging_out))
                .shared_interceptor(Flow::OutFault, logging_out);
        }

        let bus = interceptors
            .into_iter()
            .fold(bus, |bus, (flow, interceptor)| {
                bus.shared_interceptor(flow, interceptor)
            })
            .build();

        info!(
            executor = executor.name(),
            inbound_phases = config.phases.inbound.len(),
            outbound_phases = config.phases.outbound.len(),
            cache_resolved = config.chain.cache_resolved,
            "Runtime started"
        );

        Ok(Runtime {
            config,
            bus,
            worker,
        })
    }
}

fn start_executor(
    config: &ExecutorConfig,
) -> RuntimeResult<(Arc<dyn Executor>, Option<tokio::runtime::Runtime>)> {
    match config.mode {
        ExecutorMode::Inline => Ok((Arc::new(InlineExecutor), None)),
        ExecutorMode::Tokio => {
            let worker = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.worker_threads)
                .max_blocking_threads(config.worker_threads)
                .thread_name("phasebus-worker")
                .enable_all()
                .build()
                .map_err(RuntimeError::Executor)?;
            debug!(worker_threads = config.worker_threads, "Worker runtime started");
            let executor = TokioExecutor::new(worker.handle().clone());
            Ok((Arc::new(executor), Some(worker)))
        }
    }
}
