//! A metrics recorder that periodically logs every captured counter.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Keeps counters in memory and logs a snapshot of them on a fixed interval.
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    /// Creates the recorder and spawns the task that logs its snapshots.
    ///
    /// The task stops when `shutdown_rx` changes or its sender is dropped,
    /// logging one final snapshot on the way out.
    pub fn new(interval: Duration, mut shutdown_rx: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(Registry::new(AtomicStorage));
        let recorder = Self {
            registry: registry.clone(),
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; nothing has been counted yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => log_snapshot(&registry),
                    _ = shutdown_rx.changed() => {
                        log_snapshot(&registry);
                        debug!("Metrics logging task received shutdown signal");
                        break;
                    }
                }
            }
        });

        (recorder, handle)
    }
}

/// Current counter values, sorted by their rendered key.
fn snapshot(registry: &Registry<Key, AtomicStorage>) -> Vec<(String, u64)> {
    let mut counters: Vec<_> = registry
        .get_counter_handles()
        .into_iter()
        .map(|(key, counter)| (render_key(&key), counter.load(Ordering::Relaxed)))
        .collect();
    counters.sort();
    counters
}

/// Renders a key as `name` or `name{label=value,...}`.
fn render_key(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|label| format!("{}={}", label.key(), label.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

fn log_snapshot(registry: &Registry<Key, AtomicStorage>) {
    for (key, value) in snapshot(registry) {
        info!("[Counter] {}: {}", key, value);
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}
