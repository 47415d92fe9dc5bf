//! Bounded in-memory work queues with worker pools.
//!
//! Producers never block: a full queue rejects the task. Workers run the
//! handler inside a spawned task so a panic is contained to the task that
//! caused it, counted, and the worker keeps going. Per-queue counters are
//! logged on a slow cadence.

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const STATS_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue not found")]
    NotFound,
    #[error("queue is full")]
    Full,
}

/// A unit of work. `val` is whatever the queue was instantiated with.
#[derive(Debug, Clone)]
pub struct Task<V> {
    pub id: i64,
    pub val: V,
}

#[derive(Default)]
struct Stats {
    enqueued: AtomicI64,
    rejected: AtomicI64,
    processing: AtomicI64,
    processed: AtomicI64,
    failed: AtomicI64,
    workers: AtomicI64,
}

struct Queue<V> {
    name: String,
    tx: mpsc::Sender<Task<V>>,
    rx: Arc<Mutex<mpsc::Receiver<Task<V>>>>,
    stats: Arc<Stats>,
}

pub struct MemQueue<V> {
    next: AtomicU32,
    queues: DashMap<u32, Arc<Queue<V>>>,
    shutdown: CancellationToken,
}

impl<V: Send + 'static> MemQueue<V> {
    /// Must be called from within a tokio runtime; spawns the stats reporter.
    pub fn new() -> Arc<Self> {
        let svc = Arc::new(Self {
            next: AtomicU32::new(0),
            queues: DashMap::new(),
            shutdown: CancellationToken::new(),
        });
        svc.clone().spawn_stats_reporter();
        svc
    }

    pub fn create(&self, name: &str, size: usize) -> u32 {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(size);
        self.queues.insert(
            id,
            Arc::new(Queue {
                name: name.to_string(),
                tx,
                rx: Arc::new(Mutex::new(rx)),
                stats: Arc::new(Stats::default()),
            }),
        );
        id
    }

    /// Non-blocking enqueue; a full queue rejects with [`QueueError::Full`].
    pub fn add_task(&self, queue_id: u32, task: Task<V>) -> Result<(), QueueError> {
        let queue = self
            .queues
            .get(&queue_id)
            .ok_or(QueueError::NotFound)?
            .clone();

        match queue.tx.try_send(task) {
            Ok(()) => {
                queue.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                queue.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Full)
            }
        }
    }

    /// Spawn `count` workers draining the queue through `handler`.
    pub fn add_workers<F, Fut>(
        &self,
        queue_id: u32,
        count: u32,
        handler: F,
    ) -> Result<(), QueueError>
    where
        F: Fn(Task<V>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let queue = self
            .queues
            .get(&queue_id)
            .ok_or(QueueError::NotFound)?
            .clone();

        for _ in 0..count {
            let queue = queue.clone();
            let handler = handler.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = queue.rx.lock().await;
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { return };
                    process_with_recovery(&queue, task, &handler).await;
                }
            });
        }

        queue.stats.workers.fetch_add(i64::from(count), Ordering::Relaxed);
        Ok(())
    }

    /// Stop all workers and the stats reporter. In-flight handlers finish.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    fn spawn_stats_reporter(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        for entry in self.queues.iter() {
                            let q = entry.value();
                            tracing::info!(
                                id = *entry.key(),
                                queue = %q.name,
                                enqueued = q.stats.enqueued.load(Ordering::Relaxed),
                                rejected = q.stats.rejected.load(Ordering::Relaxed),
                                processing = q.stats.processing.load(Ordering::Relaxed),
                                processed = q.stats.processed.load(Ordering::Relaxed),
                                failed = q.stats.failed.load(Ordering::Relaxed),
                                workers = q.stats.workers.load(Ordering::Relaxed),
                                "queue stats"
                            );
                        }
                    }
                }
            }
        });
    }
}

async fn process_with_recovery<V, F, Fut>(queue: &Queue<V>, task: Task<V>, handler: &F)
where
    V: Send + 'static,
    F: Fn(Task<V>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let stats = queue.stats.clone();
    stats.processing.fetch_add(1, Ordering::Relaxed);
    let task_id = task.id;

    // spawn so a panicking handler surfaces as a JoinError instead of
    // unwinding through the worker loop
    let outcome = tokio::spawn(handler(task)).await;

    stats.processing.fetch_sub(1, Ordering::Relaxed);
    stats.processed.fetch_add(1, Ordering::Relaxed);

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(id = task_id, queue = %queue.name, error = %err, "processing task failed");
        }
        Err(join_err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(id = task_id, queue = %queue.name, error = %join_err, "worker panic recovered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn workers_drain_the_queue() {
        let q = MemQueue::new();
        let id = q.create("test", 16);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        q.add_workers(id, 2, move |task: Task<u64>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(task.val as usize, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        for i in 0..10 {
            q.add_task(id, Task { id: i, val: 1u64 }).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) < 10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("workers did not drain the queue in time");

        q.close();
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let q = MemQueue::<u64>::new();
        let id = q.create("tiny", 1);

        q.add_task(id, Task { id: 1, val: 1 }).unwrap();
        assert!(matches!(
            q.add_task(id, Task { id: 2, val: 2 }),
            Err(QueueError::Full)
        ));
        assert!(matches!(
            q.add_task(99, Task { id: 3, val: 3 }),
            Err(QueueError::NotFound)
        ));
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_the_worker() {
        let q = MemQueue::new();
        let id = q.create("panics", 8);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        q.add_workers(id, 1, move |task: Task<bool>| {
            let counter = counter.clone();
            async move {
                if task.val {
                    panic!("boom");
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        q.add_task(id, Task { id: 1, val: true }).unwrap();
        q.add_task(id, Task { id: 2, val: false }).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker died after panic");

        q.close();
    }
}
