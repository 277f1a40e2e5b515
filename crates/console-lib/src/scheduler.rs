//! Coalescing scheduler for debounced work
//!
//! The scheduler holds a single pending task. Submitting a new task replaces
//! the pending one; whichever task is pending when the quiet interval elapses
//! without another submission is the one that runs. Replaced tasks are
//! dropped, never run.

use crate::ingress::{validate, IngressDraft, ValidationContext, ValidationErrorMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Default quiet interval before a revalidation runs
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(500);

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Slot {
    /// Bumped on every submission; a timer only fires the task it was armed for
    generation: u64,
    task: Option<Task>,
}

/// Single-slot, last-write-wins task queue
#[derive(Clone)]
pub struct CoalescingScheduler {
    quiet: Duration,
    slot: Arc<Mutex<Slot>>,
    executed: Arc<AtomicU64>,
}

impl CoalescingScheduler {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            slot: Arc::new(Mutex::new(Slot::default())),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn quiet_interval(&self) -> Duration {
        self.quiet
    }

    /// Replace the pending task. Must be called from within a tokio runtime.
    pub async fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            if slot.task.replace(Box::new(task)).is_some() {
                debug!(generation = slot.generation, "Pending task superseded");
            }
            slot.generation
        };

        let slot = Arc::clone(&self.slot);
        let executed = Arc::clone(&self.executed);
        let quiet = self.quiet;

        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;

            let task = {
                let mut slot = slot.lock().await;
                if slot.generation != generation {
                    return;
                }
                slot.task.take()
            };

            if let Some(task) = task {
                task();
                executed.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    pub async fn is_pending(&self) -> bool {
        self.slot.lock().await.task.is_some()
    }

    /// Run the pending task now instead of waiting. Returns whether one ran.
    pub async fn flush(&self) -> bool {
        let task = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            slot.task.take()
        };

        match task {
            Some(task) => {
                task();
                self.executed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Number of tasks that have run
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

/// One completed validation, tagged with the draft it was computed for
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPass {
    pub draft: IngressDraft,
    pub errors: ValidationErrorMap,
}

/// Revalidates drafts after a quiet interval and publishes the latest pass
pub struct DebouncedValidator {
    scheduler: CoalescingScheduler,
    tx: Arc<watch::Sender<Option<ValidationPass>>>,
}

impl DebouncedValidator {
    pub fn new(quiet: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            scheduler: CoalescingScheduler::new(quiet),
            tx: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ValidationPass>> {
        self.tx.subscribe()
    }

    /// Queue a pass over `draft`, superseding any pass not yet run
    pub async fn request(&self, draft: IngressDraft, ctx: ValidationContext) {
        let tx = Arc::clone(&self.tx);
        self.scheduler
            .schedule(move || {
                let errors = validate(&draft, &ctx);
                debug!(rule = %draft.name, error_count = errors.len(), "Debounced validation complete");
                tx.send_replace(Some(ValidationPass { draft, errors }));
            })
            .await;
    }

    /// Run the queued pass immediately
    pub async fn flush(&self) -> bool {
        self.scheduler.flush().await
    }

    /// Number of passes that have run
    pub fn passes(&self) -> u64 {
        self.scheduler.executed()
    }
}

impl Default for DebouncedValidator {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_INTERVAL)
    }
}
