//! Throttler - paces outbound commands to a downstream endpoint.
//!
//! Fixed windows: at most `limit` items are forwarded between two timer
//! ticks. Anything over the limit waits in a FIFO buffer and goes out on the
//! following ticks, oldest first. Nothing is ever dropped.
//!
//! Producers may call [`Throttler::send`] from any thread. The counter, the
//! buffer and the forwarding call sit behind one mutex, so concurrent
//! producers cannot overtake buffered items or exceed the cap. The
//! downstream must therefore not block; endpoints never do.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::{Error, Result};
use crate::messaging::{Deliver, Endpoint};
use crate::scheduler::{Scheduler, TimerHandle};

/// Counter and overflow buffer of the current window.
#[derive(Debug)]
struct Window<T> {
    limit: usize,
    sent: usize,
    buffer: VecDeque<T>,
    running: bool,
}

impl<T> Window<T> {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            sent: 0,
            buffer: VecDeque::new(),
            running: false,
        }
    }

    /// Hand `item` back if it may go out now, otherwise buffer it.
    fn admit(&mut self, item: T) -> Option<T> {
        if self.running && self.buffer.is_empty() && self.sent < self.limit {
            self.sent += 1;
            Some(item)
        } else {
            self.buffer.push_back(item);
            None
        }
    }

    /// Next buffered item, while the window has room.
    fn release(&mut self) -> Option<T> {
        if !self.running || self.sent >= self.limit {
            return None;
        }
        let item = self.buffer.pop_front()?;
        self.sent += 1;
        Some(item)
    }

    fn reset(&mut self) {
        self.sent = 0;
    }
}

struct ThrottlerInner<T> {
    name: String,
    window: Mutex<Window<T>>,
    downstream: Box<dyn Fn(T) + Send + Sync>,
}

impl<T> ThrottlerInner<T> {
    fn send(&self, item: T) {
        let mut window = self.window.lock();
        match window.admit(item) {
            Some(item) => (self.downstream)(item),
            None => debug!(throttler = %self.name, buffered = window.buffer.len(), "throttling"),
        }
    }

    fn drain(&self, window: &mut Window<T>) -> usize {
        let mut forwarded = 0;
        while let Some(item) = window.release() {
            (self.downstream)(item);
            forwarded += 1;
        }
        forwarded
    }

    fn roll(&self) {
        let mut window = self.window.lock();
        window.reset();
        let forwarded = self.drain(&mut window);
        if forwarded > 0 {
            debug!(
                throttler = %self.name,
                forwarded,
                buffered = window.buffer.len(),
                "released buffered items"
            );
        }
    }
}

impl<T: Send> Deliver<T> for ThrottlerInner<T> {
    fn deliver(&self, message: T) -> std::result::Result<(), T> {
        self.send(message);
        Ok(())
    }

    fn target(&self) -> &str {
        &self.name
    }
}

pub struct Throttler<T> {
    inner: Arc<ThrottlerInner<T>>,
    interval: Duration,
    scheduler: Arc<dyn Scheduler>,
    timer: Mutex<Option<TimerHandle>>,
}

impl<T: Send + 'static> Throttler<T> {
    /// `limit` items per `interval`, forwarded through `downstream`.
    /// Created stopped.
    pub fn new<F>(
        name: impl Into<String>,
        interval: Duration,
        limit: usize,
        downstream: F,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(Error::validation(format!("throttler {}: interval must be positive", name)));
        }
        if limit == 0 {
            return Err(Error::validation(format!("throttler {}: limit must be positive", name)));
        }

        Ok(Self {
            inner: Arc::new(ThrottlerInner {
                name,
                window: Mutex::new(Window::new(limit)),
                downstream: Box::new(downstream),
            }),
            interval,
            scheduler,
            timer: Mutex::new(None),
        })
    }

    /// Throttle everything sent on to `downstream`.
    pub fn for_endpoint(
        name: impl Into<String>,
        interval: Duration,
        limit: usize,
        downstream: Endpoint<T>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        Self::new(name, interval, limit, move |item| downstream.send(item), scheduler)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Endpoint feeding this throttler.
    pub fn endpoint(&self) -> Endpoint<T> {
        Endpoint::new(self.inner.clone() as Arc<dyn Deliver<T>>)
    }

    /// Forward now if the window has room, otherwise buffer.
    pub fn send(&self, item: T) {
        self.inner.send(item);
    }

    pub fn buffered(&self) -> usize {
        self.inner.window.lock().buffer.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.window.lock().running
    }

    /// Begin periodic rollover and release what the current window allows.
    pub fn start(&self) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let released = {
            let mut window = self.inner.window.lock();
            window.running = true;
            self.inner.drain(&mut window)
        };

        let inner = self.inner.clone();
        *timer = Some(
            self.scheduler
                .schedule_periodic(self.interval, Box::new(move || inner.roll())),
        );
        info!(
            throttler = %self.inner.name,
            interval_ms = self.interval.as_millis() as u64,
            released,
            "throttler started"
        );
    }

    /// Stop rollover. Items sent while stopped are buffered.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
        let buffered = {
            let mut window = self.inner.window.lock();
            window.running = false;
            window.buffer.len()
        };
        info!(throttler = %self.inner.name, buffered, "throttler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TokioScheduler;
    use tokio::time::{self, Instant};

    type Log = Arc<Mutex<Vec<(u32, Duration)>>>;

    fn recording(interval: Duration, limit: usize) -> (Throttler<u32>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let origin = Instant::now();
        let throttler = Throttler::new(
            "test",
            interval,
            limit,
            move |item| sink.lock().push((item, origin.elapsed())),
            Arc::new(TokioScheduler),
        )
        .unwrap();
        (throttler, log)
    }

    fn items(log: &Log) -> Vec<u32> {
        log.lock().iter().map(|(item, _)| *item).collect()
    }

    #[test]
    fn test_window_caps_and_orders() {
        let mut window = Window::new(2);
        window.running = true;

        assert_eq!(window.admit(1), Some(1));
        assert_eq!(window.admit(2), Some(2));
        assert_eq!(window.admit(3), None);
        assert_eq!(window.admit(4), None);
        assert_eq!(window.release(), None);

        window.reset();
        assert_eq!(window.release(), Some(3));
        assert_eq!(window.admit(5), None);
        assert_eq!(window.release(), Some(4));
        assert_eq!(window.release(), None);
        assert_eq!(window.buffer.len(), 1);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);
        assert!(Throttler::<u32>::new("t", Duration::ZERO, 1, |_| {}, scheduler.clone()).is_err());
        assert!(Throttler::<u32>::new("t", Duration::from_secs(1), 0, |_| {}, scheduler).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_items_paced_over_three_windows() {
        let (throttler, log) = recording(Duration::from_secs(1), 2);
        throttler.start();

        for i in 1..=5 {
            throttler.send(i);
        }
        assert_eq!(throttler.buffered(), 3);

        time::sleep(Duration::from_millis(3_500)).await;

        let log = log.lock().clone();
        assert_eq!(log.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        let in_window = |lo: u64, hi: u64| {
            log.iter()
                .filter(|(_, at)| *at >= Duration::from_secs(lo) && *at < Duration::from_secs(hi))
                .count()
        };
        assert_eq!(in_window(0, 1), 2);
        assert_eq!(in_window(1, 2), 2);
        assert_eq!(in_window(2, 3), 1);
        assert_eq!(throttler.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_throttler_only_buffers() {
        let (throttler, log) = recording(Duration::from_secs(1), 2);
        assert!(!throttler.is_running());

        for i in 1..=3 {
            throttler.send(i);
        }
        time::sleep(Duration::from_secs(5)).await;
        assert!(items(&log).is_empty());
        assert_eq!(throttler.buffered(), 3);

        throttler.start();
        assert_eq!(items(&log), vec![1, 2]);

        throttler.stop();
        throttler.send(4);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(items(&log), vec![1, 2]);
        assert_eq!(throttler.buffered(), 2);

        throttler.start();
        time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(items(&log), vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_exceed_cap() {
        let (throttler, log) = recording(Duration::from_secs(1), 2);
        throttler.start();
        throttler.send(1);
        throttler.send(2);
        throttler.stop();
        throttler.send(3);
        throttler.start();

        assert_eq!(items(&log), vec![1, 2]);
        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(items(&log), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_producers_keep_fifo_and_cap() {
        let (throttler, log) = recording(Duration::from_secs(1), 10);
        throttler.start();

        std::thread::scope(|scope| {
            for producer in 0..4u32 {
                let throttler = &throttler;
                scope.spawn(move || {
                    for i in 0..25 {
                        throttler.send(producer * 100 + i);
                    }
                });
            }
        });
        assert_eq!(items(&log).len(), 10);
        assert_eq!(throttler.buffered(), 90);

        time::sleep(Duration::from_millis(9_500)).await;
        let forwarded = items(&log);
        assert_eq!(forwarded.len(), 100);
        for producer in 0..4u32 {
            let seen: Vec<u32> = forwarded
                .iter()
                .copied()
                .filter(|i| i / 100 == producer)
                .collect();
            assert_eq!(seen, (0..25).map(|i| producer * 100 + i).collect::<Vec<_>>());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_feeds_throttler() {
        let (throttler, log) = recording(Duration::from_secs(1), 1);
        throttler.start();
        let endpoint = throttler.endpoint();

        assert!(endpoint.send_async(1).await);
        endpoint.send(2);
        assert_eq!(endpoint.target(), "test");
        assert_eq!(endpoint, throttler.endpoint());
        assert_eq!(items(&log), vec![1]);

        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(items(&log), vec![1, 2]);
    }
}
