//! Handler registry and dispatcher.
//!
//! Handlers are collected while a mailbox is being built and compiled into a
//! kind index when it starts. Dispatch is one hash lookup on the payload's
//! discriminant; a catch-all handler for the whole family is consulted only
//! when no specific handler matches, and the unhandled sink after that.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use super::message::{Envelope, Payload};
use crate::core::{Error, Result};

pub(crate) type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// What invoking a handler produced.
pub(crate) enum Invocation<P> {
    Done(anyhow::Result<()>),
    Pending(HandlerFuture),
    /// The handler's variant did not match after all.
    Unmatched(Envelope<P>),
}

pub(crate) type Invoke<S, P> = Box<dyn FnMut(&mut S, Envelope<P>) -> Invocation<P> + Send>;

pub(crate) struct Handler<S, P: Payload> {
    /// `None` for the family-wide catch-all.
    pub(crate) kind: Option<P::Kind>,
    pub(crate) type_name: &'static str,
    pub(crate) invoke: Invoke<S, P>,
}

/// Default unhandled sink: an observable list of unmatched messages.
pub struct UnhandledMessages<P> {
    inner: Arc<Mutex<Vec<Envelope<P>>>>,
}

impl<P> UnhandledMessages<P> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn push(&self, envelope: Envelope<P>) {
        self.inner.lock().push(envelope);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Envelope<P>> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn snapshot(&self) -> Vec<Envelope<P>>
    where
        P: Clone,
    {
        self.inner.lock().clone()
    }
}

impl<P> Clone for UnhandledMessages<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) type UnhandledSink<P> = Box<dyn FnMut(Envelope<P>) + Send>;

/// Handler list under construction.
pub(crate) struct Registry<S, P: Payload> {
    component: Arc<str>,
    handlers: Vec<Handler<S, P>>,
}

impl<S, P: Payload> Registry<S, P> {
    pub(crate) fn new(component: Arc<str>) -> Self {
        Self {
            component,
            handlers: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, handler: Handler<S, P>) -> Result<()> {
        if self.handlers.iter().any(|h| h.kind == handler.kind) {
            return Err(Error::DuplicateHandler {
                component: self.component.to_string(),
                message_type: handler.type_name.to_string(),
            });
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Freeze registration order into a lookup table. Catch-all goes last.
    pub(crate) fn compile(self, unhandled: UnhandledSink<P>) -> Dispatcher<S, P> {
        let Registry {
            component,
            mut handlers,
        } = self;

        // Stable: specific handlers keep registration order.
        handlers.sort_by_key(|h| h.kind.is_none());

        let mut index = HashMap::with_capacity(handlers.len());
        let mut catch_all = None;
        for (slot, handler) in handlers.iter().enumerate() {
            match handler.kind {
                Some(kind) => {
                    index.insert(kind, slot);
                }
                None => catch_all = Some(slot),
            }
        }

        Dispatcher {
            component,
            handlers,
            index,
            catch_all,
            unhandled,
        }
    }
}

/// Compiled, immutable handler table for one running mailbox.
pub(crate) struct Dispatcher<S, P: Payload> {
    component: Arc<str>,
    handlers: Vec<Handler<S, P>>,
    index: HashMap<P::Kind, usize>,
    catch_all: Option<usize>,
    unhandled: UnhandledSink<P>,
}

impl<S, P: Payload> Dispatcher<S, P> {
    /// Run one message to completion. Handler faults are logged here and
    /// never escape.
    pub(crate) async fn dispatch(&mut self, state: &mut S, envelope: Envelope<P>) {
        let kind = envelope.payload().kind();

        let mut envelope = envelope;
        let candidates = [self.index.get(&kind).copied(), self.catch_all];
        for slot in candidates.into_iter().flatten() {
            let handler = &mut self.handlers[slot];
            let type_name = handler.type_name;
            debug!(
                component = %self.component,
                message_type = ?kind,
                handler = type_name,
                "dispatch"
            );

            let invoked =
                panic::catch_unwind(AssertUnwindSafe(|| (handler.invoke)(&mut *state, envelope)));
            let outcome = match invoked {
                Ok(Invocation::Done(result)) => result,
                Ok(Invocation::Pending(fut)) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(panicked(payload)),
                },
                Ok(Invocation::Unmatched(back)) => {
                    envelope = back;
                    continue;
                }
                Err(payload) => Err(panicked(payload)),
            };

            if let Err(e) = outcome {
                error!(
                    component = %self.component,
                    message_type = ?kind,
                    handler = type_name,
                    error = %e,
                    "handler fault"
                );
            }
            return;
        }

        debug!(component = %self.component, message_type = ?kind, "unhandled");
        (self.unhandled)(envelope);
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    anyhow::anyhow!("handler panicked: {}", msg)
}
