//! Cancellation registry and concurrency-bounded task scheduler.
//!
//! Two independent queues share one registry of active cancellation tokens:
//! recognition admits 2 tasks at a time, generation exactly 1 (document
//! builders are not safely concurrent per process). The registry enforces
//! "at most one active task per key, of either kind": submitting a task for
//! a key that already has one cancels and evicts the prior task before the
//! new one is admitted, so the newest request for an entity always wins.
//!
//! ## Eviction race
//!
//! A finished task must clean its own registry entry up — but only if the
//! entry is still *its* entry. Each admission gets a monotonically
//! increasing generation number, and cleanup removes the entry only when the
//! generation matches, so an old task finishing late never evicts its
//! replacement.

use crate::error::ScanDocError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Which queue a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Recognition,
    Generation,
}

impl TaskKind {
    fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Recognition => "recognition",
            TaskKind::Generation => "generation",
        }
    }
}

/// Derived, read-only view of one queue. Recomputed on demand; never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks admitted but still waiting for a concurrency slot.
    pub size: usize,
    /// Tasks currently executing their body.
    pub pending: usize,
    pub is_paused: bool,
    /// Registry entries of this kind (queued or running).
    pub active_count: usize,
}

struct Entry {
    token: CancellationToken,
    kind: TaskKind,
    generation: u64,
}

struct QueueState {
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
    running: AtomicUsize,
    paused: AtomicBool,
    resume: Notify,
}

impl QueueState {
    fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
        }
    }
}

struct SchedulerInner {
    registry: Mutex<HashMap<String, Entry>>,
    generation: AtomicU64,
    recognition: QueueState,
    generation_queue: QueueState,
}

impl SchedulerInner {
    fn queue(&self, kind: TaskKind) -> &QueueState {
        match kind {
            TaskKind::Recognition => &self.recognition,
            TaskKind::Generation => &self.generation_queue,
        }
    }

    /// Remove the registry entry for `key` iff it still belongs to the
    /// task identified by `generation`.
    fn evict_if_current(&self, key: &str, generation: u64) {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        if registry
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            registry.remove(key);
        }
    }
}

/// Concurrency-bounded two-queue task scheduler with cancel-on-replace.
///
/// Cloning is cheap and shares the same queues and registry.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    /// Create a scheduler with the given per-queue concurrency ceilings.
    pub fn new(recognition_concurrency: usize, generation_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                recognition: QueueState::new(recognition_concurrency.max(1)),
                generation_queue: QueueState::new(generation_concurrency.max(1)),
            }),
        }
    }

    /// Admit a task for `key` on the queue matching `kind`.
    ///
    /// If a task already exists for `key` — regardless of kind — its token
    /// is cancelled and it is evicted *before* the new task is admitted.
    /// The cancellation is synchronous within this call, so the prior
    /// task's token is observably cancelled before the new body can run.
    ///
    /// `work` receives a fresh token it must poll at its own checkpoints.
    /// A cancelled task's error is swallowed; any other error is logged and
    /// does not stop the queue.
    pub fn submit<F, Fut>(&self, key: &str, kind: TaskKind, work: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ScanDocError>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);

        {
            let mut registry = self.inner.registry.lock().expect("registry lock poisoned");
            if let Some(prior) = registry.insert(
                key.to_string(),
                Entry {
                    token: token.clone(),
                    kind,
                    generation,
                },
            ) {
                warn!(
                    key,
                    prior_kind = prior.kind.as_str(),
                    "task already active for key, cancelling prior task"
                );
                prior.token.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        inner.queue(kind).queued.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let queue = inner.queue(kind);

            // Honour pause before competing for a slot.
            while queue.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = queue.resume.notified() => {}
                    _ = token.cancelled() => {
                        queue.queued.fetch_sub(1, Ordering::SeqCst);
                        inner.evict_if_current(&key, generation);
                        debug!(key, "task cancelled while queue paused");
                        return;
                    }
                }
            }

            let semaphore = Arc::clone(&queue.semaphore);
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        // Semaphore closed only if the scheduler is gone.
                        queue.queued.fetch_sub(1, Ordering::SeqCst);
                        inner.evict_if_current(&key, generation);
                        return;
                    }
                },
                _ = token.cancelled() => {
                    queue.queued.fetch_sub(1, Ordering::SeqCst);
                    inner.evict_if_current(&key, generation);
                    debug!(key, "task cancelled before start");
                    return;
                }
            };

            queue.queued.fetch_sub(1, Ordering::SeqCst);
            queue.running.fetch_add(1, Ordering::SeqCst);
            debug!(
                key,
                kind = kind.as_str(),
                queued = queue.queued.load(Ordering::SeqCst),
                running = queue.running.load(Ordering::SeqCst),
                "task started"
            );

            if token.is_cancelled() {
                debug!(key, "task cancelled before body ran");
            } else {
                match work(token.clone()).await {
                    Ok(()) => {}
                    Err(err) if token.is_cancelled() || matches!(err, ScanDocError::Cancelled) => {
                        debug!(key, "task aborted by cancellation");
                    }
                    Err(err) => {
                        // One task's failure must never wedge the queue.
                        error!(key, kind = kind.as_str(), %err, "task failed");
                    }
                }
            }

            queue.running.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
            inner.evict_if_current(&key, generation);
        });
    }

    /// Cancel and evict the task for `key`, whatever its kind.
    pub fn cancel(&self, key: &str) {
        let entry = {
            let mut registry = self.inner.registry.lock().expect("registry lock poisoned");
            registry.remove(key)
        };
        if let Some(entry) = entry {
            entry.token.cancel();
            debug!(key, kind = entry.kind.as_str(), "cancelled task");
        }
    }

    /// Cancel everything and empty both queues. Process-wide teardown only.
    pub fn clear(&self) {
        let entries: Vec<Entry> = {
            let mut registry = self.inner.registry.lock().expect("registry lock poisoned");
            registry.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        for entry in entries {
            entry.token.cancel();
        }
        debug!(count, "cleared all queues");
    }

    pub fn pause(&self, kind: TaskKind) {
        self.inner.queue(kind).paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self, kind: TaskKind) {
        let queue = self.inner.queue(kind);
        queue.paused.store(false, Ordering::SeqCst);
        queue.resume.notify_waiters();
    }

    /// Snapshot the stats of one queue.
    pub fn stats(&self, kind: TaskKind) -> QueueStats {
        let queue = self.inner.queue(kind);
        let active_count = self
            .inner
            .registry
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|entry| entry.kind == kind)
            .count();
        QueueStats {
            size: queue.queued.load(Ordering::SeqCst),
            pending: queue.running.load(Ordering::SeqCst),
            is_paused: queue.paused.load(Ordering::SeqCst),
            active_count,
        }
    }

    /// Whether any task (queued or running) exists for `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.inner
            .registry
            .lock()
            .expect("registry lock poisoned")
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn settle() {
        // Enough for spawned tasks to reach their next await point.
        sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn runs_submitted_work() {
        let scheduler = TaskScheduler::new(2, 1);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        scheduler.submit("p1", TaskKind::Recognition, move |_token| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        settle().await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(!scheduler.is_active("p1"), "entry evicted after completion");
    }

    #[tokio::test]
    async fn enforces_recognition_concurrency_of_two() {
        let scheduler = TaskScheduler::new(2, 1);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        for i in 0..4 {
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            scheduler.submit(
                &format!("p{i}"),
                TaskKind::Recognition,
                move |_token| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(40)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
            );
        }

        sleep(Duration::from_millis(250)).await;
        assert!(peak.load(Ordering::SeqCst) <= 2, "recognition ceiling is 2");
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resubmit_cancels_prior_token_before_new_body() {
        let scheduler = TaskScheduler::new(2, 1);
        let first_token = Arc::new(Mutex::new(None::<CancellationToken>));

        let slot = Arc::clone(&first_token);
        scheduler.submit("p1", TaskKind::Recognition, move |token| async move {
            *slot.lock().unwrap() = Some(token.clone());
            token.cancelled().await;
            Ok(())
        });
        settle().await;

        let observed = Arc::new(AtomicBool::new(false));
        let prior = Arc::clone(&first_token);
        let saw_cancelled = Arc::clone(&observed);
        scheduler.submit("p1", TaskKind::Recognition, move |_token| async move {
            let prior_token = prior.lock().unwrap().clone();
            if let Some(t) = prior_token {
                saw_cancelled.store(t.is_cancelled(), Ordering::SeqCst);
            }
            Ok(())
        });
        settle().await;

        assert!(
            observed.load(Ordering::SeqCst),
            "prior token must already be cancelled when replacement runs"
        );
    }

    #[tokio::test]
    async fn cancel_prevents_pending_task_from_running() {
        let scheduler = TaskScheduler::new(1, 1);
        let ran = Arc::new(AtomicBool::new(false));

        // Occupy the single slot.
        scheduler.submit("busy", TaskKind::Recognition, |_token| async {
            sleep(Duration::from_millis(80)).await;
            Ok(())
        });
        let flag = Arc::clone(&ran);
        scheduler.submit("victim", TaskKind::Recognition, move |_token| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        scheduler.cancel("victim");
        sleep(Duration::from_millis(150)).await;
        assert!(!ran.load(Ordering::SeqCst), "cancelled task must not run");
    }

    #[tokio::test]
    async fn failure_does_not_wedge_the_queue() {
        let scheduler = TaskScheduler::new(1, 1);
        let ran = Arc::new(AtomicBool::new(false));

        scheduler.submit("bad", TaskKind::Generation, |_token| async {
            Err(ScanDocError::Store("disk on fire".into()))
        });
        let flag = Arc::clone(&ran);
        scheduler.submit("good", TaskKind::Generation, move |_token| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        settle().await;
        assert!(ran.load(Ordering::SeqCst), "queue keeps processing after a failure");
    }

    #[tokio::test]
    async fn clear_cancels_everything() {
        let scheduler = TaskScheduler::new(1, 1);
        let ran = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let counter = Arc::clone(&ran);
            scheduler.submit(&format!("p{i}"), TaskKind::Generation, move |token| async move {
                sleep(Duration::from_millis(60)).await;
                if !token.is_cancelled() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            });
        }
        scheduler.clear();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.stats(TaskKind::Generation).active_count, 0);
    }

    #[tokio::test]
    async fn stats_track_queued_and_running() {
        let scheduler = TaskScheduler::new(1, 1);
        for i in 0..3 {
            scheduler.submit(&format!("p{i}"), TaskKind::Recognition, |_token| async {
                sleep(Duration::from_millis(100)).await;
                Ok(())
            });
        }
        settle().await;

        let stats = scheduler.stats(TaskKind::Recognition);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.active_count, 3);
        assert!(!stats.is_paused);
    }

    #[tokio::test]
    async fn paused_queue_holds_work_until_resume() {
        let scheduler = TaskScheduler::new(2, 1);
        scheduler.pause(TaskKind::Recognition);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        scheduler.submit("p1", TaskKind::Recognition, move |_token| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        settle().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(scheduler.stats(TaskKind::Recognition).is_paused);

        scheduler.resume(TaskKind::Recognition);
        settle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cross_kind_replacement_still_cancels() {
        let scheduler = TaskScheduler::new(2, 1);
        let token_slot = Arc::new(Mutex::new(None::<CancellationToken>));

        let slot = Arc::clone(&token_slot);
        scheduler.submit("p1", TaskKind::Recognition, move |token| async move {
            *slot.lock().unwrap() = Some(token.clone());
            token.cancelled().await;
            Ok(())
        });
        settle().await;

        scheduler.submit("p1", TaskKind::Generation, |_token| async { Ok(()) });
        settle().await;

        let token = token_slot.lock().unwrap().clone();
        assert!(token.is_some_and(|t| t.is_cancelled()));
    }
}
