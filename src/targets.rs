//! Target routing configuration
//!
//! A routing configuration maps target names to the channels (and recipients
//! on each channel) a message for that target is relayed to. It is written as
//! a compact string of comma-separated `target:channel:recipient` entries:
//!
//! ```text
//! ops:smtp:oncall@example.com,ops:smtp:lead@example.com,billing:smtp:ar@example.com
//! ```
//!
//! Repeated `target:channel` pairs append to one delivery. Targets and the
//! deliveries within a target keep the order of their first appearance.

use crate::core::ChannelKind;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors raised while decoding or validating a routing configuration.
///
/// Every variant except `EmptyTargets` carries the offending
/// `target:channel:recipient` entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetsError {
    #[error("invalid target's syntax: {0:?}")]
    InvalidSyntax(String),
    #[error("empty targets")]
    EmptyTargets,
    #[error("unsupported delivery type: {0:?}")]
    UnsupportedChannel(String),
    #[error("invalid email: {0:?}")]
    InvalidRecipient(String),
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$",
    )
    .expect("email pattern is a valid regex")
});

/// Returns true if `recipient` looks like a plain email address.
pub fn is_valid_email(recipient: &str) -> bool {
    EMAIL_RE.is_match(recipient)
}

/// One channel and the recipients it delivers to for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: ChannelKind,
    pub recipients: Vec<String>,
}

/// A named destination: its deliveries, at most one per channel kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub deliveries: Vec<Delivery>,
}

impl Target {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            deliveries: Vec::new(),
        }
    }

    fn add(&mut self, channel: ChannelKind, recipient: &str) {
        match self.deliveries.iter_mut().find(|d| d.channel == channel) {
            Some(delivery) => delivery.recipients.push(recipient.to_string()),
            None => self.deliveries.push(Delivery {
                channel,
                recipients: vec![recipient.to_string()],
            }),
        }
    }
}

/// The decoded routing configuration.
///
/// Decoded once at startup and read-only afterwards. An empty configuration
/// can be constructed (it is what an empty string decodes to) but never
/// passes [`TargetsConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct TargetsConfig {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
}

impl PartialEq for TargetsConfig {
    fn eq(&self, other: &Self) -> bool {
        self.targets == other.targets
    }
}

impl Eq for TargetsConfig {}

impl TargetsConfig {
    /// Decodes a `target:channel:recipient[,target:channel:recipient...]` string.
    pub fn decode(value: &str) -> Result<Self, TargetsError> {
        let mut cfg = Self::default();
        if value.is_empty() {
            return Ok(cfg);
        }
        for entry in value.split(',') {
            let fields: Vec<&str> = entry.split(':').collect();
            let [target, channel, recipient] = fields.as_slice() else {
                return Err(TargetsError::InvalidSyntax(entry.to_string()));
            };
            if target.is_empty() || channel.is_empty() || recipient.is_empty() {
                return Err(TargetsError::InvalidSyntax(entry.to_string()));
            }
            cfg.insert(target, ChannelKind::new(*channel), recipient);
        }
        Ok(cfg)
    }

    fn insert(&mut self, target: &str, channel: ChannelKind, recipient: &str) {
        let idx = match self.index.get(target) {
            Some(&idx) => idx,
            None => {
                self.targets.push(Target::new(target));
                let idx = self.targets.len() - 1;
                self.index.insert(target.to_string(), idx);
                idx
            }
        };
        self.targets[idx].add(channel, recipient);
    }

    /// Merges another configuration into this one, with the same rules as
    /// repeated entries in a single string.
    pub fn merge(&mut self, other: TargetsConfig) {
        for (target, channel, recipient) in other.entries() {
            self.insert(target, channel.clone(), recipient);
        }
    }

    /// Looks up a target by name.
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.index.get(name).map(|&idx| &self.targets[idx])
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Iterates every `(target, channel, recipient)` triple in held order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ChannelKind, &str)> {
        self.targets.iter().flat_map(|target| {
            target.deliveries.iter().flat_map(move |delivery| {
                delivery
                    .recipients
                    .iter()
                    .map(move |r| (target.name.as_str(), &delivery.channel, r.as_str()))
            })
        })
    }

    /// Checks the configuration against the channel kinds the process runs with.
    ///
    /// Triples are checked in held order and the first failure is returned.
    /// SMTP recipients must be plain email addresses.
    pub fn validate(&self, available: &HashSet<ChannelKind>) -> Result<(), TargetsError> {
        if self.is_empty() {
            return Err(TargetsError::EmptyTargets);
        }
        for (target, channel, recipient) in self.entries() {
            // Reported per recipient so the message names a full config entry.
            let entry = format!("{target}:{channel}:{recipient}");
            if !available.contains(channel) {
                return Err(TargetsError::UnsupportedChannel(entry));
            }
            if channel.is_smtp() && !is_valid_email(recipient) {
                return Err(TargetsError::InvalidRecipient(entry));
            }
        }
        Ok(())
    }
}

impl FromStr for TargetsConfig {
    type Err = TargetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Renders the canonical `target:channel:recipient,...` form.
impl fmt::Display for TargetsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (target, channel, recipient)) in self.entries().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{target}:{channel}:{recipient}")?;
        }
        Ok(())
    }
}

impl Serialize for TargetsConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::decode(&raw).map_err(de::Error::custom)
    }
}
