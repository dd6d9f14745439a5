//! Endpoints - opaque send handles.

use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Something that can accept messages: a mailbox queue, a throttler input.
pub trait Deliver<M>: Send + Sync {
    /// Accept `message`, or hand it back if the target is gone.
    fn deliver(&self, message: M) -> Result<(), M>;

    /// Name used in logs.
    fn target(&self) -> &str;
}

/// Cheap, clonable handle to a delivery target.
///
/// Two endpoints compare equal iff they point at the same target.
pub struct Endpoint<M> {
    target: Arc<dyn Deliver<M>>,
}

impl<M> Endpoint<M> {
    pub fn new(target: Arc<dyn Deliver<M>>) -> Self {
        Self { target }
    }

    /// Fire-and-forget. A message for a torn-down target is dropped and
    /// logged.
    pub fn send(&self, message: M) {
        if self.target.deliver(message).is_err() {
            warn!(
                target_name = %self.target.target(),
                "delivery failure: target is gone, message dropped"
            );
        }
    }

    /// Resolves to whether the message was accepted into the target queue.
    pub async fn send_async(&self, message: M) -> bool {
        match self.target.deliver(message) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    target_name = %self.target.target(),
                    "delivery failure: target is gone, message dropped"
                );
                false
            }
        }
    }

    pub fn target(&self) -> &str {
        self.target.target()
    }
}

impl<M> Clone for Endpoint<M> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
        }
    }
}

impl<M> PartialEq for Endpoint<M> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.target), Arc::as_ptr(&other.target))
    }
}

impl<M> Eq for Endpoint<M> {}

impl<M> fmt::Debug for Endpoint<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("target", &self.target.target())
            .finish()
    }
}
