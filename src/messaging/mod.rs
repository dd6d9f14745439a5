//! Messaging - envelopes, endpoints, and single-consumer mailboxes

pub mod endpoint;
pub mod handler;
pub mod mailbox;
pub mod message;

pub use endpoint::{Deliver, Endpoint};
pub use handler::UnhandledMessages;
pub use mailbox::{Mailbox, MailboxHandle};
pub use message::{Envelope, Header, MessageCategory, Payload, Variant};
