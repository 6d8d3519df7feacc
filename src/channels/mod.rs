//! Delivery channels and the registry that maps channel kinds to them.
//!
//! The registry is assembled once at startup and shared read-only with every
//! request. New transports are added by implementing [`Channel`] and
//! registering the implementation; the dispatcher never changes.

pub mod render;
pub mod smtp;

use crate::core::{Channel, ChannelKind};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub use smtp::SmtpChannel;

/// An immutable set of channel implementations keyed by kind.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::default()
    }

    pub fn get(&self, kind: &ChannelKind) -> Option<Arc<dyn Channel>> {
        self.channels.get(kind).cloned()
    }

    /// The channel kinds this process can deliver to.
    pub fn kinds(&self) -> HashSet<ChannelKind> {
        self.channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.channels.keys().map(ChannelKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ChannelRegistry").field("kinds", &kinds).finish()
    }
}

/// Collects channels before the registry is frozen.
#[derive(Default)]
pub struct ChannelRegistryBuilder {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
}

impl ChannelRegistryBuilder {
    /// Adds a channel under its own kind, replacing any earlier one.
    pub fn register(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn build(self) -> ChannelRegistry {
        ChannelRegistry {
            channels: self.channels,
        }
    }
}
