//! Fetch tasks and the channel they report back on.
//!
//! Tasks run on the current `LocalSet`. They never touch layer state: every
//! result is sent to the layer's inbox and applied on the control thread
//! during the next `Layer::update`. A task that delivers data also asks the
//! host for a redraw, otherwise a host that only draws on request would never
//! call `update` again.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use foundation::ids::NodeId;
use futures_util::future::join_all;
use runtime::{ChangeNotifier, OperationCounter};
use streaming::{AbortSignal, QueueError, RequestQueue};
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::source::{ImageRequest, ImageResult, SourceError};

pub(crate) enum InboxMessage {
    Fetched {
        node: NodeId,
        generation: u64,
        outcome: FetchOutcome,
    },
    Root {
        generation: u64,
        results: Vec<Result<ImageResult, FetchFailure>>,
    },
    NodeDisposed(NodeId),
}

pub(crate) enum FetchOutcome {
    Aborted,
    Loaded {
        images: Vec<ImageResult>,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FetchFailure {
    Aborted,
    Failed(String),
}

/// Holds one unit on the layer's operation counter until dropped.
pub(crate) struct OperationGuard(Rc<RefCell<OperationCounter>>);

impl OperationGuard {
    pub fn new(counter: &Rc<RefCell<OperationCounter>>) -> Self {
        counter.borrow_mut().increment();
        Self(counter.clone())
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.0.borrow_mut().decrement();
    }
}

fn settle(result: Result<Result<ImageResult, SourceError>, QueueError>) -> Result<ImageResult, FetchFailure> {
    match result {
        Ok(Ok(image)) => Ok(image),
        Ok(Err(SourceError::Aborted)) | Err(QueueError::Aborted { .. }) => Err(FetchFailure::Aborted),
        Ok(Err(e)) => Err(FetchFailure::Failed(e.to_string())),
        Err(e) => Err(FetchFailure::Failed(e.to_string())),
    }
}

fn enqueue_all(
    queue: &RequestQueue,
    requests: Vec<ImageRequest>,
    signal: &AbortSignal,
) -> impl Future<Output = Vec<Result<ImageResult, FetchFailure>>> + 'static {
    let fetches: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let id = request.id().to_owned();
            let signal = signal.clone();
            queue.enqueue(
                id,
                move || !signal.is_aborted(),
                move || request.start(),
            )
        })
        .collect();
    async move { join_all(fetches).await.into_iter().map(settle).collect() }
}

pub(crate) struct FetchJob {
    pub node: NodeId,
    pub generation: u64,
    pub signal: AbortSignal,
    pub requests: Vec<ImageRequest>,
    pub debounce: Duration,
    pub queue: RequestQueue,
    pub inbox: UnboundedSender<InboxMessage>,
    pub waker: HostWaker,
    pub guard: OperationGuard,
}

/// Wakes the host once a result is in the inbox.
#[derive(Clone)]
pub(crate) struct HostWaker {
    pub layer: String,
    pub notifier: ChangeNotifier,
}

impl HostWaker {
    fn wake(&self) {
        self.notifier.notify_change(self.layer.clone(), false);
    }
}

/// Fetches the images a target is missing.
///
/// The debounce runs before anything is enqueued, so a node that is only
/// visible for a moment never reaches the network.
pub(crate) fn spawn_fetch(job: FetchJob) {
    tokio::task::spawn_local(async move {
        let FetchJob {
            node,
            generation,
            signal,
            requests,
            debounce,
            queue,
            inbox,
            waker,
            guard,
        } = job;
        let _guard = guard;

        tokio::time::sleep(debounce).await;
        if signal.is_aborted() {
            trace!(%node, generation, "fetch cancelled during debounce");
            let _ = inbox.send(InboxMessage::Fetched {
                node,
                generation,
                outcome: FetchOutcome::Aborted,
            });
            return;
        }

        let results = enqueue_all(&queue, requests, &signal).await;
        let outcome = if signal.is_aborted() {
            FetchOutcome::Aborted
        } else {
            let mut images = Vec::with_capacity(results.len());
            let mut error = None;
            for result in results {
                match result {
                    Ok(image) => images.push(image),
                    Err(FetchFailure::Aborted) => {}
                    Err(FetchFailure::Failed(msg)) => {
                        error.get_or_insert(msg);
                    }
                }
            }
            FetchOutcome::Loaded { images, error }
        };
        let delivered = matches!(outcome, FetchOutcome::Loaded { .. });
        let sent = inbox
            .send(InboxMessage::Fetched {
                node,
                generation,
                outcome,
            })
            .is_ok();
        if sent && delivered {
            waker.wake();
        }
    });
}

/// Fetches the coarse full-extent images used to learn an elevation range.
pub(crate) fn spawn_root_fetch(
    generation: u64,
    signal: AbortSignal,
    requests: Vec<ImageRequest>,
    queue: RequestQueue,
    inbox: UnboundedSender<InboxMessage>,
    waker: HostWaker,
    guard: OperationGuard,
) {
    let results = enqueue_all(&queue, requests, &signal);
    tokio::task::spawn_local(async move {
        let _guard = guard;
        let results = results.await;
        if inbox
            .send(InboxMessage::Root {
                generation,
                results,
            })
            .is_ok()
        {
            waker.wake();
        }
    });
}
