//! Fans a message out to every delivery of a target.
//!
//! Each delivery runs in its own spawned task, so a channel that is slow or
//! sleeping between retries never holds up its siblings. The dispatcher waits
//! for all of them before returning. Delivery failures are logged and counted,
//! never returned to the caller.

use crate::channels::ChannelRegistry;
use crate::core::{DeliveryError, Message};
use crate::targets::{Target, TargetsConfig, TargetsError};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Errors caused by the caller. No delivery is attempted when one occurs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Parameter 'target' is missed")]
    MissingTarget,
    #[error("Unknown target {0:?}")]
    UnknownTarget(String),
    #[error("No body")]
    MissingBody,
    #[error("Invalid body")]
    InvalidBody,
    #[error("Missing required fields: {0}")]
    MissingRequiredField(&'static str),
}

/// Outcome counts of one fan-out, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub deliveries: usize,
    pub failed: usize,
}

/// Resolves targets and fans messages out to their channels.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    targets: Arc<TargetsConfig>,
    channels: Arc<ChannelRegistry>,
}

impl Dispatcher {
    /// Validates `targets` against the registered channels and builds the dispatcher.
    pub fn new(targets: TargetsConfig, channels: ChannelRegistry) -> Result<Self, TargetsError> {
        targets.validate(&channels.kinds())?;
        Ok(Self {
            targets: Arc::new(targets),
            channels: Arc::new(channels),
        })
    }

    /// Looks up a target by name.
    fn target(&self, name: &str) -> Result<&Target, RequestError> {
        if name.is_empty() {
            return Err(RequestError::MissingTarget);
        }
        self.targets
            .get(name)
            .ok_or_else(|| RequestError::UnknownTarget(name.to_string()))
    }

    /// Runs the request checks in order: target, then body, then required fields.
    fn accept(&self, target_name: &str, body: &[u8]) -> Result<(&Target, Message), RequestError> {
        let target = self.target(target_name)?;
        if body.is_empty() {
            return Err(RequestError::MissingBody);
        }
        let message: Message = serde_json::from_slice(body).map_err(|e| {
            debug!(error = %e, "Failed to decode message body");
            RequestError::InvalidBody
        })?;
        if message.text.is_empty() {
            return Err(RequestError::MissingRequiredField("text"));
        }
        Ok((target, message))
    }

    /// Checks a raw request and fans its message out to the target's deliveries.
    ///
    /// Nothing is sent when a check fails.
    pub async fn notify(
        &self,
        target_name: &str,
        body: &[u8],
    ) -> Result<DispatchReport, RequestError> {
        let (target, message) = self.accept(target_name, body)?;
        Ok(self.dispatch(target, message).await)
    }

    /// Sends `message` to every delivery of `target` concurrently and waits
    /// for all of them to finish.
    async fn dispatch(&self, target: &Target, message: Message) -> DispatchReport {
        let mut report = DispatchReport {
            deliveries: target.deliveries.len(),
            failed: 0,
        };
        let mut handles = Vec::with_capacity(target.deliveries.len());

        for delivery in &target.deliveries {
            let Some(channel) = self.channels.get(&delivery.channel) else {
                // Unreachable once validated; counted rather than trusted.
                error!(channel = %delivery.channel, "No channel registered for delivery");
                report.failed += 1;
                continue;
            };
            let recipients = delivery.recipients.clone();
            let message = message.clone();
            let span = info_span!("delivery", target_name = %target.name, channel = %delivery.channel);
            let handle = tokio::spawn(
                async move { channel.send(&recipients, &message).await }.instrument(span),
            );
            handles.push((delivery.channel.clone(), handle));
        }

        let (kinds, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        for (kind, result) in kinds.into_iter().zip(results) {
            let outcome = result.map_err(DeliveryError::from).and_then(|sent| sent);
            match outcome {
                Ok(()) => {
                    debug!(channel = %kind, "Delivery succeeded");
                    metrics::counter!("notifr_deliveries_total", "channel" => kind.to_string(), "outcome" => "success")
                        .increment(1);
                }
                Err(err) => {
                    warn!(channel = %kind, error = %err, message = ?message, "Failed to send message");
                    metrics::counter!("notifr_deliveries_total", "channel" => kind.to_string(), "outcome" => "failure")
                        .increment(1);
                    report.failed += 1;
                }
            }
        }

        info!(
            target_name = %target.name,
            deliveries = report.deliveries,
            failed = report.failed,
            "Dispatch finished"
        );
        report
    }
}
