//! Per-path debouncing.
//!
//! Each path has at most one pending timer. Scheduling a path that already
//! has a timer aborts the old one and starts the delay again, so a burst of
//! events collapses into a single action once the path has been quiet for
//! the full delay.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<PathBuf, Pending>>>;

pub struct PathDebouncer {
    delay: Duration,
    pending: PendingMap,
    generation: AtomicU64,
}

impl PathDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `action(path)` once `path` has been quiet for the delay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, path: PathBuf, action: F)
    where
        F: FnOnce(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let delay = self.delay;
        let key = path.clone();

        // Held across spawn + insert so the new task cannot observe the map
        // before its own entry is present.
        let mut map = self.pending.lock();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&key);
                    }
                    // Superseded by a later schedule
                    _ => return,
                }
            }
            action(key).await;
        });

        if let Some(previous) = map.insert(path.clone(), Pending { generation, handle }) {
            previous.handle.abort();
            tracing::debug!(path = %path.display(), "debounce timer re-armed");
        }
    }

    /// Whether `path` has a timer that has not fired yet.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().contains_key(path)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Abort every timer that has not fired yet.
    pub fn cancel_all(&self) {
        let drained: Vec<Pending> = self.pending.lock().drain().map(|(_, p)| p).collect();
        for entry in drained {
            entry.handle.abort();
        }
    }
}

impl Drop for PathDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn bump(count: &Arc<AtomicUsize>) -> impl FnOnce(PathBuf) -> std::future::Ready<()> + Send + 'static {
        let count = count.clone();
        move |_path| {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_single_fire() {
        let debouncer = PathDebouncer::new(Duration::from_millis(2000));
        let count = Arc::new(AtomicUsize::new(0));
        let path = PathBuf::from("/uploads/a.png");

        debouncer.schedule(path.clone(), bump(&count));
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.schedule(path.clone(), bump(&count));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // 2000ms after the first event, but only 1500ms after the re-arm
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending(&path));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&path));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_paths_fire_independently() {
        let debouncer = PathDebouncer::new(Duration::from_millis(100));
        let count = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(PathBuf::from("/uploads/a.png"), bump(&count));
        debouncer.schedule(PathBuf::from("/uploads/b.png"), bump(&count));
        assert_eq!(debouncer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_prevents_fire() {
        let debouncer = PathDebouncer::new(Duration::from_millis(100));
        let count = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(PathBuf::from("/uploads/a.png"), bump(&count));
        debouncer.cancel_all();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
