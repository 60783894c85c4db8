//! Per-resource drain loop.
//!
//! The worker owns its queue, parked retries and in-flight executions. The
//! broker talks to it only through [`Command`]s, so all scheduling state has a
//! single writer.

use crate::item::{QueueItem, RequestId};
use crate::{PriorityQueue, ResourceConfig, RetryStrategy};
use serde_json::Value as JsonValue;
use sluice_core::{AcquireResult, ResourceResponse, StatsCounters};
use sluice_error::{BrokerErrorKind, ProviderError, ProviderErrorKind};
use sluice_rate_limit::RateLimitBackend;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, Id as TaskId, JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Shortest wait after a refusal, so a zero `retry_after` cannot spin.
const MIN_THROTTLE: Duration = Duration::from_millis(1);

/// Messages from the broker to a resource worker.
#[derive(Debug)]
pub(crate) enum Command {
    /// Admitted request; its queue slot is already reserved.
    Enqueue(QueueItem),
    /// The request's cancellation token fired.
    Cancel(RequestId),
    /// Stop after draining, abandoning whatever remains at `deadline`.
    Shutdown { deadline: Instant },
}

struct Parked {
    ready_at: Instant,
    item: QueueItem,
}

struct Executing {
    abort: AbortHandle,
    item: QueueItem,
}

/// Head of the queue waiting on the rate limiter.
struct Admitting {
    item: QueueItem,
    decision: Pin<Box<dyn Future<Output = AcquireResult> + Send>>,
}

type Outcome = Result<JsonValue, ProviderError>;

pub(crate) struct Worker {
    resource: String,
    config: ResourceConfig,
    strategy: RetryStrategy,
    backend: Arc<dyn RateLimitBackend>,
    stats: Arc<StatsCounters>,
    rx: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    queue: PriorityQueue<QueueItem>,
    parked: Vec<Parked>,
    admitting: Option<Admitting>,
    in_flight: JoinSet<Outcome>,
    executing: HashMap<TaskId, Executing>,
    throttled_until: Option<Instant>,
    draining: bool,
    deadline: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        resource: String,
        config: ResourceConfig,
        backend: Arc<dyn RateLimitBackend>,
        stats: Arc<StatsCounters>,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            resource,
            strategy: RetryStrategy::new(*config.retry()),
            config,
            backend,
            stats,
            rx,
            commands_open: true,
            queue: PriorityQueue::new(),
            parked: Vec::new(),
            admitting: None,
            in_flight: JoinSet::new(),
            executing: HashMap::new(),
            throttled_until: None,
            draining: false,
            deadline: None,
        }
    }

    /// Runs until shut down (or the broker is dropped) and no work remains.
    pub(crate) async fn run(mut self) {
        info!("Resource worker started");

        loop {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.abandon_all();
                break;
            }

            self.release_parked();
            self.dispatch();

            if self.is_idle() && (self.draining || !self.commands_open) {
                // Accept whatever was sent before the channel closed.
                self.rx.close();
                while let Ok(command) = self.rx.try_recv() {
                    self.handle_command(command);
                }
                self.commands_open = false;
                if self.is_idle() {
                    break;
                }
                continue;
            }

            let wake = self.next_wake();
            tokio::select! {
                biased;

                command = self.rx.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => self.commands_open = false,
                },
                Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                    self.handle_completion(joined);
                }
                admission = admission_decision(&mut self.admitting), if self.admitting.is_some() => {
                    self.handle_admission(admission);
                }
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {}
                else => break,
            }
        }

        info!("Resource worker stopped");
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.parked.is_empty()
            && self.admitting.is_none()
            && self.executing.is_empty()
    }

    fn next_wake(&self) -> Option<Instant> {
        let throttle = self.throttled_until.filter(|_| !self.queue.is_empty());
        let parked = self.parked.iter().map(|p| p.ready_at).min();
        [throttle, parked, self.deadline].into_iter().flatten().min()
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue(item) => {
                if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    self.stats.record_dequeued();
                    item.reject(BrokerErrorKind::ShutdownTimeout);
                    return;
                }
                debug!(request_id = item.id, priority = %item.request.priority(), "Request queued");
                self.queue.push(item);
            }
            Command::Cancel(id) => self.cancel(id),
            Command::Shutdown { deadline } => {
                info!(
                    queued = self.queue.len(),
                    parked = self.parked.len(),
                    executing = self.executing.len(),
                    "Draining before shutdown"
                );
                self.draining = true;
                self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
            }
        }
    }

    fn cancel(&mut self, id: RequestId) {
        if self.admitting.as_ref().is_some_and(|a| a.item.id == id) {
            if let Some(Admitting { item, .. }) = self.admitting.take() {
                debug!(request_id = id, "Cancelled request awaiting admission");
                self.stats.record_dequeued();
                self.stats.record_cancelled();
                item.reject(BrokerErrorKind::Cancelled);
            }
            return;
        }

        if let Some(item) = self.queue.remove(|item| item.id == id) {
            debug!(request_id = id, "Cancelled queued request");
            self.stats.record_dequeued();
            self.stats.record_cancelled();
            item.reject(BrokerErrorKind::Cancelled);
            return;
        }

        if let Some(index) = self.parked.iter().position(|p| p.item.id == id) {
            debug!(request_id = id, "Cancelled request awaiting retry");
            let parked = self.parked.swap_remove(index);
            self.stats.record_cancelled();
            parked.item.reject(BrokerErrorKind::Cancelled);
            return;
        }

        let task = self
            .executing
            .iter()
            .find_map(|(task, exec)| (exec.item.id == id).then_some(*task));
        if let Some(exec) = task.and_then(|task| self.executing.remove(&task)) {
            debug!(request_id = id, "Aborting executing request");
            exec.abort.abort();
            self.stats.record_finished();
            self.stats.record_cancelled();
            exec.item.reject(BrokerErrorKind::Cancelled);
        }
    }

    /// Moves retries whose delay has elapsed back to the tail of their lane.
    fn release_parked(&mut self) {
        let now = Instant::now();
        let mut index = 0;
        while index < self.parked.len() {
            if self.parked[index].ready_at <= now {
                let Parked { item, .. } = self.parked.remove(index);
                debug!(request_id = item.id, attempt = item.attempt, "Retry re-queued");
                self.stats.record_queued();
                self.queue.push(item);
            } else {
                index += 1;
            }
        }
    }

    /// Starts queued work while concurrency and the rate limit allow.
    ///
    /// Only the head of the queue asks the limiter at a time; its decision is
    /// awaited in the run loop next to commands and the shutdown deadline.
    fn dispatch(&mut self) {
        let max_concurrent = *self.config.max_concurrent() as usize;

        while self.admitting.is_none() && self.executing.len() < max_concurrent {
            if self.throttled_until.is_some_and(|until| Instant::now() < until) {
                return;
            }
            self.throttled_until = None;

            let Some(item) = self.queue.pop() else {
                return;
            };

            if item.is_cancelled() {
                debug!(request_id = item.id, "Dropping cancelled request");
                self.stats.record_dequeued();
                self.stats.record_cancelled();
                item.reject(BrokerErrorKind::Cancelled);
                continue;
            }

            let backend = Arc::clone(&self.backend);
            let resource = self.resource.clone();
            let cost = item.cost();
            self.admitting = Some(Admitting {
                item,
                decision: Box::pin(async move { backend.acquire(&resource, cost).await }),
            });
        }
    }

    fn handle_admission(&mut self, admission: AcquireResult) {
        let Some(Admitting { item, .. }) = self.admitting.take() else {
            return;
        };

        if !admission.allowed {
            let wait = admission.retry_after().max(MIN_THROTTLE);
            warn!(
                request_id = item.id,
                retry_after_ms = wait.as_millis() as u64,
                "Rate limited, holding queue"
            );
            self.stats.record_rate_limited();
            self.queue.push_front(item);
            self.throttled_until = Some(Instant::now() + wait);
            return;
        }

        self.start(item);
    }

    fn start(&mut self, item: QueueItem) {
        debug!(
            request_id = item.id,
            attempt = item.attempt,
            waited_ms = item.enqueued_at.elapsed().as_millis() as u64,
            "Executing request"
        );
        self.stats.record_dequeued();
        self.stats.record_started();

        let executor = Arc::clone(self.config.executor());
        let request = Arc::clone(&item.request);
        let abort = self.in_flight.spawn(async move {
            executor
                .execute(request.operation(), request.args())
                .await
        });
        self.executing.insert(abort.id(), Executing { abort, item });
    }

    fn handle_completion(&mut self, joined: Result<(TaskId, Outcome), JoinError>) {
        let (task, outcome) = match joined {
            Ok((task, outcome)) => (task, outcome),
            Err(e) => {
                let outcome = if e.is_panic() {
                    Err(ProviderError::new(ProviderErrorKind::ExecutorPanicked(
                        e.to_string(),
                    )))
                } else {
                    Err(ProviderError::new(ProviderErrorKind::Other(
                        "executor task cancelled".to_string(),
                    )))
                };
                (e.id(), outcome)
            }
        };

        // Cancelled requests were already resolved when they were aborted.
        let Some(Executing { item, .. }) = self.executing.remove(&task) else {
            return;
        };
        self.stats.record_finished();

        match outcome {
            Ok(data) => {
                debug!(request_id = item.id, attempt = item.attempt, "Request succeeded");
                self.stats.record_succeeded();
                let attempt = item.attempt;
                item.resolve(Ok(ResourceResponse::success(data, attempt)));
            }
            Err(err) => self.handle_failure(item, err),
        }
    }

    fn handle_failure(&mut self, mut item: QueueItem, err: ProviderError) {
        if matches!(err.kind(), ProviderErrorKind::ExecutorPanicked(_)) {
            error!(request_id = item.id, error = %err, "Executor panicked");
        }

        if self.strategy.should_retry(item.attempt, &err) {
            let delay = self.strategy.delay_for(item.attempt, &err);
            warn!(
                request_id = item.id,
                attempt = item.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after failure"
            );
            item.attempt += 1;
            self.stats.record_retried();
            self.parked.push(Parked {
                ready_at: Instant::now() + delay,
                item,
            });
            return;
        }

        warn!(request_id = item.id, attempt = item.attempt, error = %err, "Request failed");
        self.stats.record_failed();
        let attempt = item.attempt;
        item.resolve(Ok(ResourceResponse::failure(err, attempt)));
    }

    /// Rejects everything still pending once the shutdown deadline passes.
    fn abandon_all(&mut self) {
        let mut queued = self.queue.drain();
        if let Some(Admitting { item, .. }) = self.admitting.take() {
            queued.push(item);
        }
        let parked = std::mem::take(&mut self.parked);
        let executing: Vec<Executing> = self.executing.drain().map(|(_, exec)| exec).collect();

        if !queued.is_empty() || !parked.is_empty() || !executing.is_empty() {
            warn!(
                queued = queued.len(),
                parked = parked.len(),
                executing = executing.len(),
                "Shutdown deadline reached, rejecting pending requests"
            );
        }

        for item in queued {
            self.stats.record_dequeued();
            item.reject(BrokerErrorKind::ShutdownTimeout);
        }
        for Parked { item, .. } in parked {
            item.reject(BrokerErrorKind::ShutdownTimeout);
        }
        for Executing { abort, item } in executing {
            abort.abort();
            self.stats.record_finished();
            item.reject(BrokerErrorKind::ShutdownTimeout);
        }

        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            if let Command::Enqueue(item) = command {
                self.stats.record_dequeued();
                item.reject(BrokerErrorKind::ShutdownTimeout);
            }
        }
    }
}

/// Resolves with the pending admission decision, or never when there is none.
async fn admission_decision(admitting: &mut Option<Admitting>) -> AcquireResult {
    match admitting {
        Some(admitting) => admitting.decision.as_mut().await,
        None => std::future::pending().await,
    }
}
