//! Core domain types and service traits for notifr
//!
//! This module defines the message that travels through the relay, the
//! channel kinds a target can route to, and the `Channel` capability that
//! every delivery transport implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The kind of a delivery channel, as written in the routing configuration.
///
/// Kinds are compared by name. A kind that no channel implementation is
/// registered for is rejected when the routing configuration is validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKind(String);

impl ChannelKind {
    /// The SMTP (email) channel kind.
    pub const SMTP: &'static str = "smtp";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn smtp() -> Self {
        Self::new(Self::SMTP)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_smtp(&self) -> bool {
        self.0 == Self::SMTP
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A message received over HTTP for relaying to delivery channels.
///
/// `text` is Markdown. When `subject` is absent or empty, each channel derives
/// its own subject from `text` at send time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            subject: None,
            text: text.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Returns the explicit subject if one was supplied and is non-empty.
    pub fn explicit_subject(&self) -> Option<&str> {
        self.subject.as_deref().filter(|s| !s.is_empty())
    }
}

/// An error returned by a channel when a message could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport failed, either permanently or after exhausting retries.
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: usize,
        #[source]
        source: TransportError,
    },

    /// The outgoing payload could not be built (e.g. an unparsable address).
    #[error("failed to build message: {0}")]
    Build(String),

    /// The delivery task stopped before reporting an outcome.
    #[error("delivery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Any other channel-specific failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Whether a transport failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection reset, connection aborted or timed out.
    Transient,
    /// Everything else: rejected recipients, protocol errors, refused connections.
    Permanent,
}

/// A failure reported by a transport, classified once where it originates.
#[derive(Debug, Error)]
#[error("{class:?} transport error: {source}")]
pub struct TransportError {
    pub class: FailureClass,
    #[source]
    pub source: BoxError,
}

impl TransportError {
    pub fn transient(source: impl Into<BoxError>) -> Self {
        Self {
            class: FailureClass::Transient,
            source: source.into(),
        }
    }

    pub fn permanent(source: impl Into<BoxError>) -> Self {
        Self {
            class: FailureClass::Permanent,
            source: source.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == FailureClass::Transient
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Sends a message to a list of recipients over one transport.
///
/// Implementations may retry internally. They must be safe to call from many
/// tasks at once, because a single channel instance serves every request.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The channel kind this implementation serves (e.g. "smtp").
    fn kind(&self) -> ChannelKind;

    /// Delivers `message` to `recipients`.
    ///
    /// # Returns
    /// * `Ok(())` once the transport accepted the message
    /// * `Err` if delivery failed permanently or every retry was exhausted
    async fn send(&self, recipients: &[String], message: &Message) -> Result<(), DeliveryError>;
}
