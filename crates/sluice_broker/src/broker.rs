//! The public broker handle.

use crate::item::{PendingResponse, QueueItem};
use crate::worker::{Command, Worker};
use crate::ResourceConfig;
use parking_lot::{Mutex, RwLock};
use sluice_core::{ResourceRequest, ResourceResponse, ResourceStats, StatsCounters};
use sluice_error::{BrokerError, BrokerErrorKind, ConfigError, SluiceResult};
use sluice_rate_limit::{BrokerSettings, RateLimitBackend, SluiceConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

struct ResourceHandle {
    config: ResourceConfig,
    capacity: usize,
    stats: Arc<StatsCounters>,
    tx: mpsc::UnboundedSender<Command>,
}

/// Queues, rate limits and retries calls to registered resources.
///
/// Each registered resource gets a worker task that drains its priority queue
/// through the rate limit backend and into the resource's executor. Callers
/// hand over a [`ResourceRequest`] and await a [`PendingResponse`].
///
/// # Example
///
/// ```rust,ignore
/// use sluice_broker::{ResourceBroker, ResourceConfig};
/// use sluice_core::{RateLimitConfig, ResourceRequest};
/// use sluice_rate_limit::InMemoryRateLimiter;
/// use std::sync::Arc;
///
/// let broker = ResourceBroker::new(Arc::new(InMemoryRateLimiter::new()));
/// broker.register(
///     "llm",
///     ResourceConfig::builder()
///         .rate_limits(RateLimitConfig::new(60, 60_000))
///         .executor(executor)
///         .build()?,
/// )?;
///
/// let response = broker
///     .submit(ResourceRequest::new("llm", "complete", vec!["Hello".into()]))
///     .await?;
/// ```
pub struct ResourceBroker {
    backend: Arc<dyn RateLimitBackend>,
    settings: BrokerSettings,
    resources: RwLock<HashMap<String, ResourceHandle>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_gate: tokio::sync::Mutex<()>,
    shutting_down: AtomicBool,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ResourceBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBroker")
            .field("settings", &self.settings)
            .field("resources", &self.resources())
            .field("shutting_down", &self.shutting_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl ResourceBroker {
    /// Broker with default settings.
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self::with_settings(backend, BrokerSettings::default())
    }

    /// Broker with explicit queue and shutdown defaults.
    pub fn with_settings(backend: Arc<dyn RateLimitBackend>, settings: BrokerSettings) -> Self {
        Self {
            backend,
            settings,
            resources: RwLock::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            shutdown_gate: tokio::sync::Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Broker using the `[broker]` section of a loaded configuration.
    ///
    /// Resources still have to be registered, since executors are not
    /// configurable from TOML; see [`ResourceConfig::from_profile`].
    pub fn from_config(config: &SluiceConfig, backend: Arc<dyn RateLimitBackend>) -> Self {
        Self::with_settings(backend, config.broker)
    }

    /// Broker-wide settings.
    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Registers a resource and starts its worker.
    ///
    /// Registering the same name again with the same executor instance and
    /// equal settings is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are invalid, the name is
    /// already registered differently, or no Tokio runtime is running, and
    /// `ShuttingDown` once shutdown has begun.
    #[instrument(skip(self, config))]
    pub fn register(&self, name: &str, config: ResourceConfig) -> SluiceResult<()> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ConfigError::new("resources must be registered from within a Tokio runtime")
        })?;

        let mut resources = self.resources.write();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BrokerError::new(BrokerErrorKind::ShuttingDown).into());
        }

        if let Some(existing) = resources.get(name) {
            if existing.config.same_as(&config) {
                debug!("Resource already registered with identical configuration");
                return Ok(());
            }
            return Err(ConfigError::new(format!(
                "resource '{}' is already registered with a different configuration",
                name
            ))
            .into());
        }

        self.backend.configure(name, *config.rate_limits());

        let capacity = config.max_queue_size().unwrap_or(self.settings.max_queue_size);
        let stats = Arc::new(StatsCounters::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(
            name.to_string(),
            config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&stats),
            rx,
        );
        let span = info_span!("resource_worker", resource = %name);
        self.workers.lock().push(runtime.spawn(worker.run().instrument(span)));

        info!(
            requests_per_window = config.rate_limits().requests_per_window,
            window_ms = config.rate_limits().window_ms,
            max_concurrent = config.max_concurrent(),
            capacity,
            "Registered resource"
        );

        resources.insert(
            name.to_string(),
            ResourceHandle {
                config,
                capacity,
                stats,
                tx,
            },
        );
        Ok(())
    }

    /// Admits a request and hands it to its resource worker.
    ///
    /// Returns immediately; the returned future resolves when the request
    /// succeeds, fails permanently, is cancelled or is abandoned at shutdown.
    /// Must be called from within a Tokio runtime when the request carries a
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// - `UnknownResource` if the resource is not registered
    /// - `CostExceedsLimit` if the cost can never fit one window's budget
    /// - `Cancelled` if the request's token is already cancelled
    /// - `QueueFull` if the resource's queue is at capacity
    /// - `ShuttingDown` once shutdown has begun
    #[instrument(
        skip(self, request),
        fields(resource = %request.resource(), operation = %request.operation())
    )]
    pub fn enqueue(&self, request: ResourceRequest) -> Result<PendingResponse, BrokerError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BrokerError::new(BrokerErrorKind::ShuttingDown));
        }

        let resources = self.resources.read();
        let handle = resources.get(request.resource()).ok_or_else(|| {
            BrokerError::new(BrokerErrorKind::UnknownResource(request.resource().clone()))
        })?;

        let cost = *request.estimated_cost();
        if let Some(limit) = handle
            .config
            .rate_limits()
            .cost_per_window
            .filter(|limit| cost > *limit)
        {
            handle.stats.record_rejected();
            return Err(BrokerError::new(BrokerErrorKind::CostExceedsLimit {
                resource: request.resource().clone(),
                cost,
                limit,
            }));
        }

        if request.is_cancelled() {
            handle.stats.record_cancelled();
            return Err(BrokerError::new(BrokerErrorKind::Cancelled));
        }

        if !handle.stats.try_reserve_queued(handle.capacity) {
            warn!(capacity = handle.capacity, "Queue full, rejecting request");
            return Err(BrokerError::new(BrokerErrorKind::QueueFull {
                resource: request.resource().clone(),
                capacity: handle.capacity,
            }));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resource = request.resource().clone();
        let cancel_token = request.cancel_token().clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        let settled = CancellationToken::new();
        let item = QueueItem::new(id, Arc::new(request), reply_tx, settled.clone());

        if handle.tx.send(Command::Enqueue(item)).is_err() {
            handle.stats.record_dequeued();
            return Err(BrokerError::new(BrokerErrorKind::ShuttingDown));
        }

        if let Some(token) = cancel_token {
            let tx = handle.tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = tx.send(Command::Cancel(id));
                    }
                    _ = settled.cancelled() => {}
                }
            });
        }

        debug!(request_id = id, cost, "Request admitted");
        Ok(PendingResponse::new(id, resource, reply_rx))
    }

    /// Enqueues a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns admission errors from [`enqueue`](Self::enqueue), and
    /// `Cancelled` or `ShutdownTimeout` if the request does not complete.
    /// Provider failures are reported inside the response.
    pub async fn submit(&self, request: ResourceRequest) -> Result<ResourceResponse, BrokerError> {
        self.enqueue(request)?.await
    }

    /// Counter snapshot for one resource.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the resource is not registered.
    pub fn get_stats(&self, resource: &str) -> Result<ResourceStats, BrokerError> {
        self.resources
            .read()
            .get(resource)
            .map(|handle| handle.stats.snapshot())
            .ok_or_else(|| {
                BrokerError::new(BrokerErrorKind::UnknownResource(resource.to_string()))
            })
    }

    /// Registered resource names, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stops admitting work and waits for queued and in-flight requests.
    ///
    /// Anything still pending after `drain_timeout` is rejected with
    /// `ShutdownTimeout`. Safe to call repeatedly or concurrently; later
    /// calls wait for the first to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, drain_timeout: Duration) {
        let _gate = self.shutdown_gate.lock().await;

        let senders: Vec<mpsc::UnboundedSender<Command>> = {
            let resources = self.resources.write();
            if !self.shutting_down.swap(true, Ordering::AcqRel) {
                info!(resources = resources.len(), "Shutting down broker");
            }
            resources.values().map(|handle| handle.tx.clone()).collect()
        };

        let deadline = Instant::now() + drain_timeout;
        for tx in senders {
            // A worker that already exited has nothing left to drain.
            let _ = tx.send(Command::Shutdown { deadline });
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Resource worker ended abnormally");
            }
        }
        debug!("Broker shutdown complete");
    }

    /// [`shutdown`](Self::shutdown) with the configured default timeout.
    pub async fn shutdown_with_default_timeout(&self) {
        self.shutdown(Duration::from_millis(self.settings.shutdown_timeout_ms))
            .await;
    }
}
