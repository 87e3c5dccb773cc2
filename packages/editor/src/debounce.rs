//! Trailing-edge debouncer
//!
//! One action, one timer: `trigger` (re)starts the delay, the action runs
//! once when the delay elapses without another trigger. `flush` runs a
//! pending action immediately; `cancel` drops it. Used for snapshot
//! capture (rapid keystrokes collapse into one history entry) and for the
//! page/layout metadata refresh.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub type DebouncedAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Debouncer {
    delay: Duration,
    action: DebouncedAction,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    handle: Option<JoinHandle<()>>,
    /// Guards against a stale timer clearing a newer pending entry.
    generation: u64,
}

impl Debouncer {
    pub fn new(delay: Duration, action: DebouncedAction) -> Self {
        Self {
            delay,
            action,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Schedule the action after the delay, restarting any pending timer.
    pub fn trigger(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
        inner.generation += 1;
        let generation = inner.generation;

        let delay = self.delay;
        let action = self.action.clone();
        let shared = self.inner.clone();
        inner.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
            let mut inner = shared.lock().unwrap();
            if inner.generation == generation {
                inner.handle = None;
            }
        }));
    }

    /// Run a pending action now instead of waiting out the delay.
    pub async fn flush(&self) {
        let pending = {
            let mut inner = self.inner.lock().unwrap();
            match inner.handle.take() {
                Some(handle) => {
                    handle.abort();
                    inner.generation += 1;
                    true
                }
                None => false,
            }
        };
        if pending {
            (self.action)().await;
        }
    }

    /// Drop a pending action without running it.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.handle.take() {
            handle.abort();
            inner.generation += 1;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().unwrap().handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (DebouncedAction, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let action: DebouncedAction = Arc::new(move || {
            let inner = inner.clone();
            async move {
                inner.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        (action, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_triggers_collapse_into_one_run() {
        let (action, count) = counting();
        let debouncer = Debouncer::new(Duration::from_millis(500), action);

        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_each_fire() {
        let (action, count) = counting();
        let debouncer = Debouncer::new(Duration::from_millis(100), action);

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_pending_immediately() {
        let (action, count) = counting();
        let debouncer = Debouncer::new(Duration::from_secs(60), action);

        debouncer.trigger();
        debouncer.flush().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Nothing pending now; flush is a no-op.
        debouncer.flush().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending() {
        let (action, count) = counting();
        let debouncer = Debouncer::new(Duration::from_millis(100), action);

        debouncer.trigger();
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
