//! Queue entries and the caller's side of their reply channel.

use crate::queue::Prioritized;
use sluice_core::{Priority, ResourceRequest, ResourceResponse};
use sluice_error::{BrokerError, BrokerErrorKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Broker-wide monotonic request identifier.
pub type RequestId = u64;

type Reply = Result<ResourceResponse, BrokerError>;

/// A request owned by its resource worker until it resolves.
#[derive(Debug)]
pub(crate) struct QueueItem {
    pub(crate) id: RequestId,
    pub(crate) request: Arc<ResourceRequest>,
    pub(crate) enqueued_at: Instant,
    pub(crate) attempt: u32,
    reply: oneshot::Sender<Reply>,
    settled: CancellationToken,
}

impl QueueItem {
    pub(crate) fn new(
        id: RequestId,
        request: Arc<ResourceRequest>,
        reply: oneshot::Sender<Reply>,
        settled: CancellationToken,
    ) -> Self {
        Self {
            id,
            request,
            enqueued_at: Instant::now(),
            attempt: 0,
            reply,
            settled,
        }
    }

    pub(crate) fn cost(&self) -> u64 {
        *self.request.estimated_cost()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Delivers the final outcome. Consumes the item so it resolves once.
    pub(crate) fn resolve(self, reply: Reply) {
        self.settled.cancel();
        // The caller may have dropped its future.
        let _ = self.reply.send(reply);
    }

    #[track_caller]
    pub(crate) fn reject(self, kind: BrokerErrorKind) {
        self.resolve(Err(BrokerError::new(kind)));
    }
}

impl Prioritized for QueueItem {
    fn priority(&self) -> Priority {
        *self.request.priority()
    }
}

/// Eventual outcome of an enqueued request.
///
/// Resolves to the [`ResourceResponse`] once the request succeeds or fails
/// permanently, or to a [`BrokerError`] if it is cancelled or abandoned at
/// shutdown. Dropping it does not cancel the request; use the request's
/// cancellation token for that.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    resource: String,
    rx: oneshot::Receiver<Reply>,
}

impl PendingResponse {
    pub(crate) fn new(id: RequestId, resource: String, rx: oneshot::Receiver<Reply>) -> Self {
        Self { id, resource, rx }
    }

    /// Identifier assigned at admission.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Resource the request was queued on.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Future for PendingResponse {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(BrokerError::new(BrokerErrorKind::WorkerStopped(
                    self.resource.clone(),
                )))
            })
        })
    }
}
