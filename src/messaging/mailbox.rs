//! Mailbox - a single-consumer queue with typed dispatch.
//!
//! A [`Mailbox`] owns its component's state, an unbounded FIFO queue and
//! the handler table. [`Mailbox::start`] moves all of it into one tokio task
//! that processes messages strictly one at a time; the rest of the system
//! only ever sees [`Endpoint`]s.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use super::endpoint::{Deliver, Endpoint};
use super::handler::{Handler, Invocation, Registry, UnhandledMessages, UnhandledSink};
use super::message::{Envelope, Payload, Variant};
use crate::core::{Error, Result};

/// Sending half of a mailbox queue.
struct MailboxQueue<P> {
    name: Arc<str>,
    tx: flume::Sender<Envelope<P>>,
}

impl<P: Payload> Deliver<Envelope<P>> for MailboxQueue<P> {
    fn deliver(&self, message: Envelope<P>) -> std::result::Result<(), Envelope<P>> {
        self.tx.send(message).map_err(|flume::SendError(message)| message)
    }

    fn target(&self) -> &str {
        &self.name
    }
}

/// A component's mailbox, before it starts consuming.
///
/// Messages sent to its endpoint before [`start`](Mailbox::start) are kept
/// and processed once it runs.
pub struct Mailbox<S, P: Payload> {
    name: Arc<str>,
    state: S,
    registry: Registry<S, P>,
    unhandled: Option<UnhandledSink<P>>,
    unhandled_messages: UnhandledMessages<P>,
    queue: Arc<MailboxQueue<P>>,
    rx: flume::Receiver<Envelope<P>>,
}

impl<S, P> Mailbox<S, P>
where
    S: Send + 'static,
    P: Payload,
{
    pub fn new(name: impl Into<String>, state: S) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = flume::unbounded();
        Self {
            registry: Registry::new(name.clone()),
            queue: Arc::new(MailboxQueue {
                name: name.clone(),
                tx,
            }),
            name,
            state,
            unhandled: None,
            unhandled_messages: UnhandledMessages::new(),
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint<Envelope<P>> {
        Endpoint::new(self.queue.clone() as Arc<dyn Deliver<Envelope<P>>>)
    }

    /// Component state, for wiring done before start.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Handle messages carrying a `T`. One handler per type.
    pub fn register_handler<T, F>(&mut self, mut handler: F) -> Result<()>
    where
        T: Variant<P>,
        F: FnMut(&mut S, Envelope<T>) -> anyhow::Result<()> + Send + 'static,
    {
        self.registry.insert(Handler {
            kind: Some(T::KIND),
            type_name: type_name::<T>(),
            invoke: Box::new(move |state: &mut S, envelope: Envelope<P>| {
                match envelope.try_map(T::extract) {
                    Ok(typed) => Invocation::Done(handler(state, typed)),
                    Err(original) => Invocation::Unmatched(original),
                }
            }),
        })
    }

    /// Like [`register_handler`](Mailbox::register_handler), but the handler
    /// returns a future. The mailbox stays busy until it resolves.
    pub fn register_async_handler<T, F, Fut>(&mut self, mut handler: F) -> Result<()>
    where
        T: Variant<P>,
        F: FnMut(&mut S, Envelope<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.insert(Handler {
            kind: Some(T::KIND),
            type_name: type_name::<T>(),
            invoke: Box::new(move |state: &mut S, envelope: Envelope<P>| {
                match envelope.try_map(T::extract) {
                    Ok(typed) => Invocation::Pending(Box::pin(handler(state, typed))),
                    Err(original) => Invocation::Unmatched(original),
                }
            }),
        })
    }

    /// Handle every message of the family. Consulted after all specific
    /// handlers, whatever the registration order.
    pub fn register_any<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut S, Envelope<P>) -> anyhow::Result<()> + Send + 'static,
    {
        self.registry.insert(Handler {
            kind: None,
            type_name: type_name::<P>(),
            invoke: Box::new(move |state: &mut S, envelope: Envelope<P>| {
                Invocation::Done(handler(state, envelope))
            }),
        })
    }

    /// Replace the default unhandled sink.
    pub fn register_unhandled<F>(&mut self, sink: F)
    where
        F: FnMut(Envelope<P>) + Send + 'static,
    {
        self.unhandled = Some(Box::new(sink));
    }

    /// Messages no handler matched, when the default sink is in use.
    pub fn unhandled_messages(&self) -> UnhandledMessages<P> {
        self.unhandled_messages.clone()
    }

    /// Begin consuming. Must be called inside a tokio runtime.
    pub fn start(self) -> MailboxHandle<S, P> {
        let Mailbox {
            name,
            mut state,
            registry,
            unhandled,
            unhandled_messages,
            queue,
            rx,
        } = self;

        let sink = unhandled.unwrap_or_else(|| {
            let list = unhandled_messages.clone();
            Box::new(move |envelope: Envelope<P>| list.push(envelope)) as UnhandledSink<P>
        });
        let mut dispatcher = registry.compile(sink);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let component = name.clone();
        let task = tokio::spawn(async move {
            info!(component = %component, "mailbox started");
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    next = rx.recv_async() => match next {
                        Ok(envelope) => dispatcher.dispatch(&mut state, envelope).await,
                        Err(_) => break,
                    },
                }
            }
            let discarded = rx.len();
            drop(rx);
            info!(component = %component, discarded, "mailbox stopped");
            state
        });

        MailboxHandle {
            name,
            queue,
            stop: stop_tx,
            task,
        }
    }
}

/// A running mailbox. Dropping the handle stops the worker.
pub struct MailboxHandle<S, P> {
    name: Arc<str>,
    queue: Arc<MailboxQueue<P>>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<S>,
}

impl<S, P: Payload> MailboxHandle<S, P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint<Envelope<P>> {
        Endpoint::new(self.queue.clone() as Arc<dyn Deliver<Envelope<P>>>)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Let the in-flight handler finish, discard whatever is still queued,
    /// and hand back the component state.
    pub async fn stop(self) -> Result<S> {
        let MailboxHandle {
            name, stop, task, ..
        } = self;
        let _ = stop.send(());
        task.await
            .map_err(|e| Error::Shutdown(format!("mailbox {}: {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong(u32);

    #[derive(Debug)]
    struct Boom;

    #[derive(Debug)]
    struct Crash;

    #[derive(Debug)]
    struct Flush(oneshot::Sender<()>);

    crate::payload_enum! {
        #[derive(Debug)]
        enum Probe => ProbeKind {
            Ping(Ping),
            Pong(Pong),
            Boom(Boom),
            Crash(Crash),
            Flush(Flush),
        }
    }

    #[derive(Default)]
    struct Counter {
        pings: Vec<u32>,
        pongs: Vec<u32>,
        caught: usize,
    }

    fn with_flush<S: Send + 'static>(name: &str, state: S) -> Mailbox<S, Probe> {
        let mut mailbox = Mailbox::new(name, state);
        mailbox
            .register_handler::<Flush, _>(|_, env| {
                let _ = env.into_payload().0.send(());
                Ok(())
            })
            .unwrap();
        mailbox
    }

    fn recording(name: &str) -> Mailbox<Counter, Probe> {
        let mut mailbox = with_flush(name, Counter::default());
        mailbox
            .register_handler::<Ping, _>(|state, env| {
                state.pings.push(env.payload().0);
                Ok(())
            })
            .unwrap();
        mailbox
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("late crash")
    }

    async fn nap() -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// Resolves once everything sent before it has been processed.
    async fn flush(endpoint: &Endpoint<Envelope<Probe>>) {
        let (tx, rx) = oneshot::channel();
        endpoint.send(Envelope::command(Flush(tx)));
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_unmatched_message_goes_to_unhandled() {
        let mailbox = recording("probe");
        let unhandled = mailbox.unhandled_messages();
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        endpoint.send(Envelope::command(Ping(1)));
        endpoint.send(Envelope::command(Pong(2)));
        flush(&endpoint).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings.len(), 1);

        let unmatched = unhandled.take();
        assert_eq!(unmatched.len(), 1);
        assert!(matches!(unmatched[0].payload(), Probe::Pong(Pong(2))));
    }

    #[tokio::test]
    async fn test_forwarding_preserves_order() {
        let mut b = with_flush("b", Counter::default());
        b.register_handler::<Pong, _>(|state, env| {
            state.pongs.push(env.payload().0);
            Ok(())
        })
        .unwrap();

        let mut a = with_flush("a", b.endpoint());
        a.register_handler::<Ping, _>(|downstream, env| {
            downstream.send(Envelope::event(Pong(env.payload().0)));
            Ok(())
        })
        .unwrap();

        let b = b.start();
        let a = a.start();
        let to_a = a.endpoint();
        for i in 0..100 {
            to_a.send(Envelope::command(Ping(i)));
        }
        flush(&to_a).await;
        flush(&b.endpoint()).await;

        a.stop().await.unwrap();
        let state = b.stop().await.unwrap();
        assert_eq!(state.pongs, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_per_sender_under_concurrency() {
        let handle = recording("fifo").start();

        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let endpoint = handle.endpoint();
                tokio::spawn(async move {
                    for i in 0..250 {
                        endpoint.send(Envelope::command(Ping(producer * 1_000 + i)));
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        flush(&handle.endpoint()).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings.len(), 1_000);
        for producer in 0..4u32 {
            let seen: Vec<u32> = state
                .pings
                .iter()
                .copied()
                .filter(|p| p / 1_000 == producer)
                .collect();
            let expected: Vec<u32> = (0..250).map(|i| producer * 1_000 + i).collect();
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn test_handler_fault_is_isolated() {
        let mut mailbox = recording("faulty");
        mailbox
            .register_handler::<Boom, _>(|_, _| Err(anyhow::anyhow!("boom")))
            .unwrap();
        mailbox
            .register_handler::<Crash, _>(|_, _| panic!("crash"))
            .unwrap();
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        endpoint.send(Envelope::command(Boom));
        endpoint.send(Envelope::command(Crash));
        endpoint.send(Envelope::command(Ping(7)));
        flush(&endpoint).await;

        assert!(!handle.is_finished());
        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings, vec![7]);
    }

    #[tokio::test]
    async fn test_async_handler_panic_is_isolated() {
        let mut mailbox = recording("faulty-async");
        mailbox
            .register_async_handler::<Crash, _, _>(|_, _| explode())
            .unwrap();
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        endpoint.send(Envelope::command(Crash));
        endpoint.send(Envelope::command(Ping(1)));
        flush(&endpoint).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings, vec![1]);
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let mut mailbox = recording("dup");
        let err = mailbox
            .register_handler::<Ping, _>(|_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler { .. }));

        mailbox.register_any(|_, _| Ok(())).unwrap();
        assert!(mailbox.register_any(|_, _| Ok(())).is_err());
    }

    #[tokio::test]
    async fn test_catch_all_evaluated_last() {
        let mut mailbox = with_flush("catch", Counter::default());
        mailbox
            .register_any(|state: &mut Counter, _| {
                state.caught += 1;
                Ok(())
            })
            .unwrap();
        mailbox
            .register_handler::<Ping, _>(|state, env| {
                state.pings.push(env.payload().0);
                Ok(())
            })
            .unwrap();
        let unhandled = mailbox.unhandled_messages();
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        endpoint.send(Envelope::command(Ping(1)));
        endpoint.send(Envelope::command(Pong(2)));
        flush(&endpoint).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings, vec![1]);
        assert_eq!(state.caught, 1);
        assert!(unhandled.is_empty());
    }

    #[tokio::test]
    async fn test_custom_unhandled_sink() {
        let (tx, rx) = flume::unbounded();
        let mut mailbox = recording("sink");
        mailbox.register_unhandled(move |env: Envelope<Probe>| {
            let _ = tx.send(env.payload().kind());
        });
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        endpoint.send(Envelope::command(Boom));
        flush(&endpoint).await;

        assert_eq!(rx.try_recv().unwrap(), ProbeKind::Boom);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_sent_before_start_are_kept() {
        let mailbox = recording("early");
        let endpoint = mailbox.endpoint();
        endpoint.send(Envelope::command(Ping(1)));

        let handle = mailbox.start();
        assert_eq!(handle.endpoint(), endpoint);
        flush(&endpoint).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings, vec![1]);
    }

    #[tokio::test]
    async fn test_send_after_stop_is_delivery_failure() {
        let handle = recording("gone").start();
        let endpoint = handle.endpoint();
        assert!(endpoint.send_async(Envelope::command(Ping(1))).await);
        flush(&endpoint).await;

        handle.stop().await.unwrap();
        assert!(!endpoint.send_async(Envelope::command(Ping(2))).await);
        endpoint.send(Envelope::command(Ping(3)));
    }

    #[tokio::test]
    async fn test_endpoints_of_different_mailboxes_differ() {
        let a = recording("a");
        let b = recording("b");
        assert_eq!(a.endpoint(), a.endpoint());
        assert_ne!(a.endpoint(), b.endpoint());
        assert_eq!(a.endpoint().target(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_finishes_in_flight_and_discards_queue() {
        let mut mailbox = with_flush("slow", Counter::default());
        mailbox
            .register_async_handler::<Ping, _, _>(|state, env| {
                state.pings.push(env.payload().0);
                nap()
            })
            .unwrap();
        let handle = mailbox.start();
        let endpoint = handle.endpoint();

        for i in 1..=3 {
            endpoint.send(Envelope::command(Ping(i)));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = handle.stop().await.unwrap();
        assert_eq!(state.pings, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_worker() {
        let handle = recording("dropped").start();
        let endpoint = handle.endpoint();
        assert!(endpoint.send_async(Envelope::command(Ping(1))).await);
        flush(&endpoint).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!endpoint.send_async(Envelope::command(Ping(2))).await);
    }
}
