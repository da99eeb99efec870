// ABOUTME: Debounced thumbnail regeneration
// ABOUTME: Keeps at most one pending timer per deck and runs the job once edits settle

use crate::errors::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Work executed once a deck's edits have settled.
#[async_trait]
pub trait Regenerate: Send + Sync {
    async fn regenerate(&self, deck_id: &str) -> Result<Option<String>>;
}

/// A deferred run for one deck.
///
/// Cancelling the token before the delay elapses prevents the run. Once the
/// delay has elapsed the run is committed and completes regardless of the token.
struct PendingTask {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

type TaskTable = Arc<Mutex<HashMap<String, PendingTask>>>;

/// Process-local registry of pending regenerations, keyed by deck id.
///
/// `schedule` and `cancel` are the only ways to change the registry. Nothing is
/// shared across processes; a restart forgets pending timers.
pub struct RegenerationScheduler {
    job: Arc<dyn Regenerate>,
    tasks: TaskTable,
    next_id: AtomicU64,
}

impl RegenerationScheduler {
    pub fn new(job: Arc<dyn Regenerate>) -> Self {
        Self {
            job,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run the job for `deck_id` after `delay`, superseding any pending timer
    /// for the same deck. Must be called from within a Tokio runtime.
    ///
    /// A run that has already started is not interrupted; it finishes even
    /// though a newer timer has replaced it.
    pub fn schedule(&self, deck_id: &str, delay: Duration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        // Held across spawn so a zero-delay task cannot finish before it is registered
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.remove(deck_id) {
            previous.token.cancel();
            debug!("Superseded pending regeneration {} for deck {}", previous.id, deck_id);
        }

        let handle = tokio::spawn(run_after_quiet_period(
            Arc::clone(&self.job),
            Arc::clone(&self.tasks),
            deck_id.to_string(),
            id,
            token.clone(),
            delay,
        ));

        tasks.insert(deck_id.to_string(), PendingTask { id, token, handle });
        debug!("Scheduled regeneration {} for deck {} in {:?}", id, deck_id, delay);
    }

    /// Cancel the pending timer for `deck_id`. Returns whether one was registered.
    pub fn cancel(&self, deck_id: &str) -> bool {
        match self.tasks.lock().remove(deck_id) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        for (deck_id, task) in self.tasks.lock().drain() {
            task.token.cancel();
            debug!("Cancelled regeneration {} for deck {}", task.id, deck_id);
        }
    }

    /// Whether a timer is waiting or a run is in progress for `deck_id`.
    pub fn is_pending(&self, deck_id: &str) -> bool {
        self.tasks.lock().contains_key(deck_id)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether the registered task for `deck_id` has run to completion or
    /// been cancelled. `None` when nothing is registered.
    pub fn is_finished(&self, deck_id: &str) -> Option<bool> {
        self.tasks.lock().get(deck_id).map(|t| t.handle.is_finished())
    }
}

impl Drop for RegenerationScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_after_quiet_period(
    job: Arc<dyn Regenerate>,
    tasks: TaskTable,
    deck_id: String,
    id: u64,
    token: CancellationToken,
    delay: Duration,
) {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("Regeneration {} for deck {} cancelled before firing", id, deck_id);
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    match job.regenerate(&deck_id).await {
        Ok(Some(_)) => info!("Regenerated thumbnail for deck {}", deck_id),
        Ok(None) => debug!("Nothing to render for deck {}", deck_id),
        // No retry: the next edit schedules another attempt
        Err(e) => error!("Thumbnail regeneration for deck {} failed: {}", deck_id, e),
    }

    let mut tasks = tasks.lock();
    if tasks.get(&deck_id).map_or(false, |t| t.id == id) {
        tasks.remove(&deck_id);
    }
}
