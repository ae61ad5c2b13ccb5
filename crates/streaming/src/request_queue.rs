use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use runtime::work_queue::WorkQueue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Shared request admission for image fetches.
///
/// At most `max_concurrent` requests run at once. When saturated, waiting
/// requests are admitted newest first: the most recently enqueued work is
/// the most likely to still be on screen. Each request carries a predicate
/// that is consulted right before it would start; a request whose predicate
/// returns `false` is rejected with [`QueueError::Aborted`] without running.
///
/// The queue is single-threaded (`Rc`) and meant to be shared by every layer
/// driven from the same control thread.
#[derive(Clone)]
pub struct RequestQueue {
    state: Rc<RefCell<QueueState>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQueueOptions {
    pub max_concurrent: usize,
    pub max_pending: usize,
}

impl Default for RequestQueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_pending: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("request `{id}` was aborted before it started")]
    Aborted { id: String },
    #[error("request queue is full ({max_len} pending)")]
    Full { max_len: usize },
}

struct Pending {
    id: String,
    should_execute: Box<dyn Fn() -> bool>,
    admit: oneshot::Sender<Permit>,
}

struct QueueState {
    queue: WorkQueue<Pending>,
    running: usize,
    sequence: i64,
    options: RequestQueueOptions,
}

impl QueueState {
    // Requests whose future was dropped must not hold room in a full queue.
    fn prune_withdrawn(&mut self) {
        self.queue.retain(|pending| !pending.admit.is_closed());
    }
}

/// Running slot. Dropping it frees the slot and admits the next request.
struct Permit {
    state: Weak<RefCell<QueueState>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            {
                let mut s = state.borrow_mut();
                s.running = s.running.saturating_sub(1);
            }
            pump(&state);
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(RequestQueueOptions::default())
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("RequestQueue")
            .field("pending", &s.queue.len())
            .field("running", &s.running)
            .field("options", &s.options)
            .finish()
    }
}

impl RequestQueue {
    pub fn new(options: RequestQueueOptions) -> Self {
        let options = RequestQueueOptions {
            max_concurrent: options.max_concurrent.max(1),
            ..options
        };
        Self {
            state: Rc::new(RefCell::new(QueueState {
                queue: WorkQueue::with_max_len(options.max_pending),
                running: 0,
                sequence: 0,
                options,
            })),
        }
    }

    pub fn options(&self) -> RequestQueueOptions {
        self.state.borrow().options
    }

    /// Requests waiting for a slot. Withdrawn requests are not counted.
    pub fn pending(&self) -> usize {
        let mut s = self.state.borrow_mut();
        s.prune_withdrawn();
        s.queue.len()
    }

    /// Requests currently holding a slot.
    pub fn running(&self) -> usize {
        self.state.borrow().running
    }

    /// Enqueues `request` and returns a future resolving to its output.
    ///
    /// The request is registered immediately; the returned future only has
    /// to be polled for the work itself to progress. Dropping the future
    /// withdraws the request (or frees its slot if it was already admitted).
    pub fn enqueue<T, F, Fut>(
        &self,
        id: impl Into<String>,
        should_execute: impl Fn() -> bool + 'static,
        request: F,
    ) -> impl Future<Output = Result<T, QueueError>> + 'static
    where
        T: 'static,
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let id = id.into();
        let (admit, admitted) = oneshot::channel();

        let pushed = {
            let mut s = self.state.borrow_mut();
            s.prune_withdrawn();
            s.sequence += 1;
            let priority = -s.sequence;
            s.queue.try_push(
                priority,
                Pending {
                    id: id.clone(),
                    should_execute: Box::new(should_execute),
                    admit,
                },
            )
        };

        match &pushed {
            Ok(_) => {
                trace!(%id, "request enqueued");
                pump(&self.state);
            }
            Err(full) => debug!(%id, max_len = full.max_len, "request queue full"),
        }

        async move {
            if let Err(full) = pushed {
                return Err(QueueError::Full {
                    max_len: full.max_len,
                });
            }
            let permit = admitted
                .await
                .map_err(|_| QueueError::Aborted { id: id.clone() })?;
            let output = request().await;
            drop(permit);
            Ok(output)
        }
    }
}

// Admits waiting requests while slots are free. No borrow is held while the
// predicate runs or a permit changes hands, since both can re-enter.
fn pump(state: &Rc<RefCell<QueueState>>) {
    loop {
        let next = {
            let mut s = state.borrow_mut();
            if s.running >= s.options.max_concurrent {
                return;
            }
            match s.queue.pop_next() {
                Some((_, pending)) => pending,
                None => return,
            }
        };

        if next.admit.is_closed() {
            trace!(id = %next.id, "request withdrawn");
            continue;
        }
        if !(next.should_execute)() {
            debug!(id = %next.id, "request no longer needed, skipped");
            continue;
        }

        state.borrow_mut().running += 1;
        let permit = Permit {
            state: Rc::downgrade(state),
        };
        // A receiver that vanished in between hands the permit back, which
        // releases the slot again.
        let _ = next.admit.send(permit);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use tokio::sync::oneshot;

    use super::{QueueError, RequestQueue, RequestQueueOptions};

    fn queue(max_concurrent: usize, max_pending: usize) -> RequestQueue {
        RequestQueue::new(RequestQueueOptions {
            max_concurrent,
            max_pending,
        })
    }

    #[tokio::test]
    async fn admits_newest_request_first_when_saturated() {
        let q = queue(1, 10);
        let order = Rc::new(RefCell::new(Vec::new()));
        let (release, released) = oneshot::channel::<()>();

        let first = q.enqueue("a", || true, move || async move {
            let _ = released.await;
            "a"
        });
        let o = order.clone();
        let second = q.enqueue("b", || true, move || async move {
            o.borrow_mut().push("b");
            "b"
        });
        let o = order.clone();
        let third = q.enqueue("c", || true, move || async move {
            o.borrow_mut().push("c");
            "c"
        });

        assert_eq!(q.running(), 1);
        assert_eq!(q.pending(), 2);

        release.send(()).unwrap();
        let (a, b, c) = tokio::join!(first, second, third);
        assert_eq!((a, b, c), (Ok("a"), Ok("b"), Ok("c")));
        assert_eq!(order.borrow().as_slice(), &["c", "b"]);
        assert_eq!(q.running(), 0);
        assert_eq!(q.pending(), 0);
    }

    #[tokio::test]
    async fn predicate_is_checked_right_before_start() {
        let q = queue(1, 10);
        let wanted = Rc::new(Cell::new(true));
        let ran = Rc::new(Cell::new(false));
        let (release, released) = oneshot::channel::<()>();

        let blocker = q.enqueue("blocker", || true, move || async move {
            let _ = released.await;
        });
        let w = wanted.clone();
        let r = ran.clone();
        let skipped = q.enqueue("skipped", move || w.get(), move || async move {
            r.set(true);
        });

        wanted.set(false);
        release.send(()).unwrap();
        let (blocker, skipped) = tokio::join!(blocker, skipped);
        assert_eq!(blocker, Ok(()));
        assert_eq!(
            skipped,
            Err(QueueError::Aborted {
                id: "skipped".to_string()
            })
        );
        assert!(!ran.get());
    }

    #[tokio::test]
    async fn rejects_requests_beyond_max_pending() {
        let q = queue(1, 1);
        let (_hold, held) = oneshot::channel::<()>();
        let _running = q.enqueue("a", || true, move || async move {
            let _ = held.await;
        });
        let _waiting = q.enqueue("b", || true, || async {});
        let rejected = q.enqueue("c", || true, || async {});

        assert_eq!(rejected.await, Err(QueueError::Full { max_len: 1 }));
        assert_eq!(q.pending(), 1);
    }

    #[tokio::test]
    async fn dropping_an_admitted_request_frees_its_slot() {
        let q = queue(1, 10);
        let dropped = q.enqueue("a", || true, || async { 1 });
        let next = q.enqueue("b", || true, || async { 2 });
        assert_eq!(q.running(), 1);

        drop(dropped);
        assert_eq!(q.running(), 1);
        assert_eq!(q.pending(), 0);
        assert_eq!(next.await, Ok(2));
        assert_eq!(q.running(), 0);
    }

    #[tokio::test]
    async fn withdrawn_requests_free_room_in_a_full_queue() {
        let q = queue(1, 1);
        let (_hold, held) = oneshot::channel::<()>();
        let _running = q.enqueue("a", || true, move || async move {
            let _ = held.await;
        });
        let withdrawn = q.enqueue("b", || true, || async { "b" });
        assert_eq!(q.pending(), 1);

        drop(withdrawn);
        assert_eq!(q.pending(), 0);
        let accepted = q.enqueue("c", || true, || async { "c" });
        assert_eq!(q.pending(), 1);
        drop(accepted);
    }
}
