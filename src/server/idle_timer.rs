use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// One-shot inactivity countdown.
///
/// Every [`arm`](IdleTimer::arm) bumps a generation counter. The expiry task
/// only runs its callback if the generation is still the one it was armed
/// with, so a cancel that loses the race against expiry is a no-op and a
/// timer fires at most once per arm.
pub struct IdleTimer {
    generation: Arc<AtomicU64>,
    armed: Mutex<Option<Armed>>,
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleTimer {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            armed: Mutex::new(None),
        }
    }

    /// Cancels any pending countdown and starts a new one.
    pub fn arm<F>(&self, after: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut armed = self.armed.lock();
        Self::disarm(&self.generation, &mut armed);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = Arc::clone(&self.generation);

        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Claim the expiry; a concurrent cancel moves the counter first.
            if current
                .compare_exchange(generation, generation + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                on_expire();
            }
        });

        *armed = Some(Armed { generation, task });
    }

    pub fn cancel(&self) {
        let mut armed = self.armed.lock();
        Self::disarm(&self.generation, &mut armed);
    }

    /// True while a countdown is pending and has neither fired nor been
    /// cancelled.
    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .is_some_and(|a| a.generation == self.generation.load(Ordering::Acquire))
    }

    fn disarm(generation: &AtomicU64, armed: &mut Option<Armed>) {
        if let Some(previous) = armed.take() {
            if generation
                .compare_exchange(
                    previous.generation,
                    previous.generation + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                previous.task.abort();
            }
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.get_mut().take() {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&fired);
        (fired, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_deadline() {
        let timer = IdleTimer::new();
        let (fired, hook) = counter();

        timer.arm(Duration::from_secs(5), hook);
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timer = IdleTimer::new();
        let (fired, hook) = counter();

        timer.arm(Duration::from_secs(1), hook);
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_countdown() {
        let timer = IdleTimer::new();
        let (first, first_hook) = counter();
        let (second, second_hook) = counter();

        timer.arm(Duration::from_secs(2), first_hook);
        tokio::time::sleep(Duration::from_secs(1)).await;
        timer.arm(Duration::from_secs(2), second_hook);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_is_a_no_op() {
        let timer = IdleTimer::new();
        let (fired, hook) = counter();

        timer.arm(Duration::from_millis(10), hook);
        tokio::time::sleep(Duration::from_millis(20)).await;
        timer.cancel();
        timer.cancel();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
