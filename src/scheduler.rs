//! Timer primitives on the tokio runtime.

use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Cancels its timer when cancelled or dropped, unless detached.
#[derive(Debug)]
pub struct TimerHandle {
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    fn new(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    pub fn cancel(mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    /// Let the timer run to completion without holding the handle.
    pub fn detach(mut self) {
        self.abort = None;
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// "Call me later" and "call me every so often".
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle;

    /// First call happens one `interval` after scheduling.
    fn schedule_periodic(
        &self,
        interval: Duration,
        callback: Box<dyn FnMut() + Send>,
    ) -> TimerHandle;
}

/// Scheduler backed by `tokio::time`. Must be used inside a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(task.abort_handle())
    }

    fn schedule_periodic(
        &self,
        interval: Duration,
        mut callback: Box<dyn FnMut() + Send>,
    ) -> TimerHandle {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        TimerHandle::new(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _timer = TokioScheduler.schedule_once(
            Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_until_cancelled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = TokioScheduler.schedule_periodic(
            Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);

        timer.cancel();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_timer_still_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        TokioScheduler
            .schedule_once(
                Duration::from_secs(1),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .detach();

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        drop(TokioScheduler.schedule_once(
            Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
