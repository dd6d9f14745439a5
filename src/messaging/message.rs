//! Message envelopes and payload families.
//!
//! Every message travelling through a mailbox is an [`Envelope`]: an
//! immutable [`Header`] plus a payload. Payloads belong to a closed family
//! (an enum implementing [`Payload`]); each concrete payload type in the
//! family implements [`Variant`], which is what handlers are registered
//! against. The [`payload_enum!`](crate::payload_enum) macro generates all of
//! it from one declaration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

use crate::core::{Error, Result};

/// What a message means to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Command,
    Event,
    Document,
    Request,
    Response,
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageCategory::Command => "command",
            MessageCategory::Event => "event",
            MessageCategory::Document => "document",
            MessageCategory::Request => "request",
            MessageCategory::Response => "response",
        };
        f.write_str(s)
    }
}

/// Identity and metadata shared by every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HeaderRepr")]
pub struct Header {
    id: Uuid,
    timestamp: DateTime<Utc>,
    category: MessageCategory,
    correlation_id: Option<Uuid>,
}

impl Header {
    fn stamped(category: MessageCategory, correlation_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            correlation_id,
        }
    }

    /// Rebuild a header received from outside the process.
    pub fn from_parts(
        id: Uuid,
        timestamp: DateTime<Utc>,
        category: MessageCategory,
        correlation_id: Option<Uuid>,
    ) -> Result<Self> {
        if id.is_nil() {
            return Err(Error::validation("message id must not be nil"));
        }
        if timestamp == DateTime::<Utc>::default() {
            return Err(Error::validation("message timestamp must be set"));
        }
        if category == MessageCategory::Response && correlation_id.is_none() {
            return Err(Error::validation("response must carry a correlation id"));
        }
        Ok(Self {
            id,
            timestamp,
            category,
            correlation_id,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn category(&self) -> MessageCategory {
        self.category
    }

    /// Id of the request a response answers.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }
}

#[derive(Deserialize)]
struct HeaderRepr {
    id: Uuid,
    timestamp: DateTime<Utc>,
    category: MessageCategory,
    correlation_id: Option<Uuid>,
}

impl TryFrom<HeaderRepr> for Header {
    type Error = Error;

    fn try_from(repr: HeaderRepr) -> Result<Self> {
        Header::from_parts(repr.id, repr.timestamp, repr.category, repr.correlation_id)
    }
}

/// A header plus a payload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    header: Header,
    payload: P,
}

impl<P> Envelope<P> {
    pub fn new(category: MessageCategory, payload: impl Into<P>) -> Self {
        Self {
            header: Header::stamped(category, None),
            payload: payload.into(),
        }
    }

    pub fn command(payload: impl Into<P>) -> Self {
        Self::new(MessageCategory::Command, payload)
    }

    pub fn event(payload: impl Into<P>) -> Self {
        Self::new(MessageCategory::Event, payload)
    }

    pub fn document(payload: impl Into<P>) -> Self {
        Self::new(MessageCategory::Document, payload)
    }

    pub fn request(payload: impl Into<P>) -> Self {
        Self::new(MessageCategory::Request, payload)
    }

    /// A response answering the request with id `correlation_id`.
    pub fn response(payload: impl Into<P>, correlation_id: Uuid) -> Self {
        Self {
            header: Header::stamped(MessageCategory::Response, Some(correlation_id)),
            payload: payload.into(),
        }
    }

    pub fn from_parts(header: Header, payload: P) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.header.timestamp
    }

    pub fn category(&self) -> MessageCategory {
        self.header.category
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.header.correlation_id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn into_parts(self) -> (Header, P) {
        (self.header, self.payload)
    }

    /// Re-wrap the payload, keeping the header. On failure the original
    /// envelope is handed back untouched.
    pub fn try_map<U>(
        self,
        f: impl FnOnce(P) -> std::result::Result<U, P>,
    ) -> std::result::Result<Envelope<U>, Envelope<P>> {
        let Envelope { header, payload } = self;
        match f(payload) {
            Ok(payload) => Ok(Envelope { header, payload }),
            Err(payload) => Err(Envelope { header, payload }),
        }
    }

    /// Widen a typed envelope back into its family.
    pub fn widen<F>(self) -> Envelope<F>
    where
        P: Into<F>,
    {
        Envelope {
            header: self.header,
            payload: self.payload.into(),
        }
    }
}

/// A closed family of payload types accepted by one mailbox.
pub trait Payload: Send + 'static {
    /// Discriminant used as the dispatch key.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// One concrete member of a payload family.
pub trait Variant<P: Payload>: Sized + Send + 'static {
    const KIND: P::Kind;

    /// Take the payload apart if it is this variant.
    fn extract(payload: P) -> std::result::Result<Self, P>;
}

/// Declare a payload family.
///
/// ```ignore
/// payload_enum! {
///     #[derive(Debug, Clone)]
///     pub enum Heartbeat => HeartbeatKind {
///         Ping(Ping),
///         Pong(Pong),
///     }
/// }
/// ```
///
/// generates the `Heartbeat` enum, a `HeartbeatKind` discriminant enum, the
/// [`Payload`] impl, and a [`Variant`] plus `From` impl for every member
/// type. Member types must be distinct.
#[macro_export]
macro_rules! payload_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident => $kind:ident {
            $($variant:ident($inner:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant($inner)),+
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $kind {
            $($variant),+
        }

        impl $crate::messaging::Payload for $name {
            type Kind = $kind;

            fn kind(&self) -> $kind {
                match self {
                    $($name::$variant(_) => $kind::$variant),+
                }
            }
        }

        $(
            impl $crate::messaging::Variant<$name> for $inner {
                const KIND: $kind = $kind::$variant;

                #[allow(unreachable_patterns)]
                fn extract(payload: $name) -> ::std::result::Result<Self, $name> {
                    match payload {
                        $name::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }

            impl ::std::convert::From<$inner> for $name {
                fn from(inner: $inner) -> Self {
                    $name::$variant(inner)
                }
            }
        )+
    };
}
