//! One-shot cancellable timer keyed by a generation counter
//!
//! Arming spawns a task that sleeps and then sends an event built from the
//! generation it was armed with. Cancelling aborts the task, but an event may
//! already be queued by then, so the receiver must always pass the event's
//! generation to [`GenerationTimer::fire`]: only the most recent arming is
//! accepted, and only once.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct GenerationTimer {
    generation: u64,
    armed: bool,
    handle: Option<JoinHandle<()>>,
}

impl GenerationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer. Any previous arming becomes stale.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<E, F>(&mut self, delay: Duration, tx: mpsc::UnboundedSender<E>, make_event: F) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.abort_task();
        self.generation += 1;
        self.armed = true;
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make_event(generation));
        }));
        generation
    }

    /// Cancel the pending fire, if any
    pub fn cancel(&mut self) {
        self.abort_task();
        self.generation += 1;
        self.armed = false;
    }

    /// Accept a fire event. Returns false for stale or duplicate fires.
    pub fn fire(&mut self, generation: u64) -> bool {
        if !self.armed || generation != self.generation {
            return false;
        }
        self.armed = false;
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn abort_task(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for GenerationTimer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fire_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = GenerationTimer::new();
        let generation = timer.arm(Duration::from_secs(5), tx, |g| g);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, generation);
        assert!(timer.fire(received));
        assert!(!timer.fire(received));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = GenerationTimer::new();
        let first = timer.arm(Duration::from_secs(1), tx.clone(), |g| g);
        let second = timer.arm(Duration::from_secs(2), tx, |g| g);
        assert_ne!(first, second);

        // First task was aborted; only the second fires.
        let received = rx.recv().await.unwrap();
        assert_eq!(received, second);
        assert!(!timer.fire(first));
        assert!(timer.fire(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rejects_queued_event() {
        let (tx, _rx) = mpsc::unbounded_channel::<u64>();
        let mut timer = GenerationTimer::new();
        let generation = timer.arm(Duration::from_secs(1), tx, |g| g);
        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.fire(generation));
    }
}
