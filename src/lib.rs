//! notifr - a notification relay
//!
//! Accepts a message over HTTP, resolves a named target to its configured
//! delivery channels and recipients, and fans the message out to those
//! channels concurrently.

pub mod app;
pub mod channels;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod internal_metrics;
pub mod server;
pub mod targets;

pub use crate::core::{Channel, ChannelKind, DeliveryError, Message};
