use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::prometheus::{report_rotation, WINDOW_UNIQUE_COUNT};
use crate::publisher::{AggregatedMessage, Publisher};
use crate::store::DedupStore;
use crate::time::TimeSource;

/// Closes the open window on a fixed interval and hands its unique count to
/// the publisher.
pub struct WindowAggregator {
    store: Arc<dyn DedupStore + Send + Sync>,
    publisher: Arc<dyn Publisher + Send + Sync>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    window: Duration,
}

impl WindowAggregator {
    pub fn new(
        store: Arc<dyn DedupStore + Send + Sync>,
        publisher: Arc<dyn Publisher + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            timesource,
            window,
        }
    }

    /// Rotate once: snapshot and clear the store, then publish the count.
    ///
    /// Returns the message handed to the publisher, or `None` when the store
    /// could not be read or cleared. In that case the window's count is lost.
    pub async fn rotate(&self) -> Option<AggregatedMessage> {
        let unique_count = match self.store.snapshot_and_clear().await {
            Ok(count) => count,
            Err(err) => {
                error!("failed to rotate unique request window: {}", err);
                report_rotation("store_error");
                return None;
            }
        };

        let message = AggregatedMessage {
            window_end: self.timesource.unix_seconds(),
            unique_count,
            window: self.window,
        };
        gauge!(WINDOW_UNIQUE_COUNT).set(unique_count as f64);

        match self.publisher.publish(message.clone()).await {
            Ok(()) => report_rotation("published"),
            Err(err) => {
                error!("failed to send unique request count: {}", err);
                report_rotation("publish_error");
            }
        }

        Some(message)
    }

    /// Rotate every `window` for the lifetime of the process. The first
    /// rotation happens one full window after start.
    pub async fn run(&self) {
        info!("rotating unique request window every {:?}", self.window);

        let mut ticker = interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.rotate().await;
        }
    }
}
