//! Ordered-but-parallel delivery of domain events to listener code.

pub mod registry;

pub use self::registry::{Delivery, DispatchKey, HandlerRegistry, PacketHandler};

use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::error;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct KeyQueue {
    /// Whether a worker currently owns this key.
    active: bool,

    /// Deliveries waiting to run, in submission order.
    pending: Mutex<VecDeque<Task>>,
}

/// Delivers domain events to listener code with per-entity ordering.
///
/// Every [`DispatchKey`] maps to a strictly ordered queue. A fixed pool
/// of workers pulls keys that transitioned from idle to busy; at most one
/// worker drains a given key at any instant, so deliveries for one entity
/// never overlap or reorder while unrelated entities progress across the
/// whole pool. The pool size bounds concurrency independently of how many
/// keys are live.
///
/// A panicking delivery is caught and reported without disturbing the
/// rest of its queue or the worker that ran it.
pub struct EventDispatcher {
    queues: Arc<DashMap<DispatchKey, KeyQueue>>,
    ready_tx: flume::Sender<DispatchKey>,
    workers: Vec<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Spawns a dispatcher backed by `workers` worker tasks (clamped to
    /// at least one).
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let queues = Arc::new(DashMap::new());
        let (ready_tx, ready_rx) = flume::unbounded::<DispatchKey>();

        let workers = (0..workers.max(1))
            .map(|index| {
                let queues = Arc::clone(&queues);
                let ready_rx = ready_rx.clone();
                tokio::spawn(worker(index, queues, ready_rx))
            })
            .collect();

        Self {
            queues,
            ready_tx,
            workers,
        }
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues one delivery behind every other delivery of its key.
    pub fn submit(&self, delivery: Delivery) {
        let Delivery { key, run } = delivery;
        self.submit_task(key, run);
    }

    /// Enqueues a closure behind every other delivery of `key`.
    pub fn submit_with(&self, key: DispatchKey, run: impl FnOnce() + Send + 'static) {
        self.submit_task(key, Box::new(run));
    }

    fn submit_task(&self, key: DispatchKey, run: Task) {
        let mut queue = self.queues.entry(key).or_default();
        queue
            .pending
            .lock()
            .expect("lock is not poisoned")
            .push_back(run);

        // A key is handed to the pool exactly once per idle-to-busy
        // transition; the worker that owns it picks up everything
        // submitted while it drains.
        if !queue.active {
            queue.active = true;
            drop(queue);
            self.ready_tx.send(key).expect("worker pool is running");
        }
    }

    /// Stops intake and waits until the workers drained every queue.
    pub async fn close(self) {
        drop(self.ready_tx);
        for worker in self.workers {
            _ = worker.await;
        }
    }
}

impl Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("keys", &self.queues.len())
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

async fn worker(
    index: usize,
    queues: Arc<DashMap<DispatchKey, KeyQueue>>,
    ready_rx: flume::Receiver<DispatchKey>,
) {
    while let Ok(key) = ready_rx.recv_async().await {
        loop {
            let task = {
                let Some(mut queue) = queues.get_mut(&key) else {
                    break;
                };
                let popped = queue.pending.lock().expect("lock is not poisoned").pop_front();
                match popped {
                    Some(task) => task,
                    None => {
                        queue.active = false;
                        drop(queue);
                        // Idle keys are removed entirely; a resubmission
                        // recreates and reactivates them.
                        queues.remove_if(&key, |_, queue| {
                            !queue.active
                                && queue.pending.lock().expect("lock is not poisoned").is_empty()
                        });
                        break;
                    }
                }
            };

            if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!(worker = index, ?key, "listener delivery panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Delivery, DispatchKey, EventDispatcher};
    use heliograph_types::GuildId;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn preserves_order_within_a_key_under_noise() {
        let dispatcher = EventDispatcher::new(4);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let key = DispatchKey::Guild(GuildId::new(1));
        for index in 0..100u32 {
            // Unrelated keys churn the pool between every submission.
            for noise in 0..20u64 {
                let noise_key = DispatchKey::Guild(GuildId::new(1000 + noise));
                dispatcher.submit(Delivery::new(noise_key, || {}));
            }

            let observed = Arc::clone(&observed);
            dispatcher.submit(Delivery::new(key, move || {
                observed.lock().expect("lock is not poisoned").push(index);
            }));
        }

        dispatcher.close().await;

        let observed = observed.lock().expect("lock is not poisoned");
        assert_eq!(*observed, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_deliveries_do_not_block_their_key() {
        let dispatcher = EventDispatcher::new(2);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&observed);
        dispatcher.submit(Delivery::new(DispatchKey::Global, move || {
            first.lock().expect("lock is not poisoned").push(1);
        }));
        dispatcher.submit(Delivery::new(DispatchKey::Global, || {
            panic!("listener blew up");
        }));
        let second = Arc::clone(&observed);
        dispatcher.submit(Delivery::new(DispatchKey::Global, move || {
            second.lock().expect("lock is not poisoned").push(2);
        }));

        dispatcher.close().await;

        assert_eq!(*observed.lock().expect("lock is not poisoned"), vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_keys_progress_independently() {
        let dispatcher = EventDispatcher::new(2);
        let (unblock_tx, unblock_rx) = std::sync::mpsc::channel::<()>();

        // The first key parks its worker until the second key's delivery
        // runs; it only completes if the keys really run concurrently.
        dispatcher.submit(Delivery::new(DispatchKey::Guild(GuildId::new(1)), move || {
            unblock_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("the other key should unblock this one");
        }));
        dispatcher.submit(Delivery::new(DispatchKey::Guild(GuildId::new(2)), move || {
            unblock_tx.send(()).expect("receiver is waiting");
        }));

        dispatcher.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn idle_keys_are_reactivated_by_resubmission() {
        let dispatcher = EventDispatcher::new(1);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&observed);
        dispatcher.submit_with(DispatchKey::Global, move || {
            first.lock().expect("lock is not poisoned").push(1);
        });

        // Let the queue drain to empty before submitting again.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = Arc::clone(&observed);
        dispatcher.submit_with(DispatchKey::Global, move || {
            second.lock().expect("lock is not poisoned").push(2);
        });

        dispatcher.close().await;
        assert_eq!(*observed.lock().expect("lock is not poisoned"), vec![1, 2]);
    }
}
