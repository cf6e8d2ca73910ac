//! Receiver - Tracker Dispatch
//!
//! Accepts decoded remote-write batches, keeps ingestion counters, hands each
//! batch to every registered tracker and drives each tracker's periodic
//! recompute.

pub mod remote_write;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prometheus::{IntCounter, IntGauge, Registry};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::tracker::{LabelSet, Tracker};

pub use remote_write::{decode_write_request, to_label_sets, TimeSeries};

/// How often each tracker recomputes its gauges.
pub const RECOMPUTE_INTERVAL: Duration = Duration::from_secs(15);

/// Fans received batches out to trackers.
pub struct Receiver {
    /// Trackers in registration order
    trackers: Vec<Arc<dyn Tracker>>,
    /// Total series received
    received: IntCounter,
    /// Newest sample timestamp seen, in milliseconds
    latest_sample_ts: IntGauge,
    /// Backing value for `latest_sample_ts`; the gauge is only set under
    /// this lock
    max_ts: Mutex<i64>,
}

impl Receiver {
    /// Create a receiver and register its counters in `registry`.
    ///
    /// Recompute loops are started separately with
    /// [`Receiver::spawn_recompute_loops`].
    pub fn new(trackers: Vec<Arc<dyn Tracker>>, registry: &Registry) -> Result<Self> {
        let received = IntCounter::new(
            "timeseries_rcv_total",
            "the total number of timeseries received",
        )?;
        let latest_sample_ts = IntGauge::new(
            "latest_sample_ts",
            "the furthest in the future timestamp for all seen samples",
        )?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(latest_sample_ts.clone()))?;

        Ok(Self {
            trackers,
            received,
            latest_sample_ts,
            max_ts: Mutex::new(0),
        })
    }

    /// Number of registered trackers.
    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Total series received so far.
    pub fn received_total(&self) -> u64 {
        self.received.get()
    }

    /// Newest sample timestamp seen so far, in milliseconds.
    pub fn latest_sample_timestamp(&self) -> i64 {
        *self.max_ts.lock()
    }

    /// Start one recompute loop per tracker.
    ///
    /// Each loop recomputes immediately, then every [`RECOMPUTE_INTERVAL`],
    /// until `shutdown` is cancelled.
    pub fn spawn_recompute_loops(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        self.spawn_recompute_loops_every(RECOMPUTE_INTERVAL, shutdown)
    }

    /// Like [`Receiver::spawn_recompute_loops`] with a custom period.
    pub fn spawn_recompute_loops_every(
        &self,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        self.trackers
            .iter()
            .enumerate()
            .map(|(index, tracker)| {
                let tracker = Arc::clone(tracker);
                let shutdown = shutdown.clone();
                tokio::spawn(run_recompute_loop(index, tracker, period, shutdown))
            })
            .collect()
    }

    /// Decode a remote-write body and record its series.
    ///
    /// Returns the number of series in the body.
    pub fn receive_body(&self, body: &[u8]) -> Result<usize> {
        let timeseries = decode_write_request(body)?;
        self.receive(&timeseries)?;
        Ok(timeseries.len())
    }

    /// Record a decoded batch: update counters, then dispatch to trackers.
    pub fn receive(&self, timeseries: &[TimeSeries]) -> Result<()> {
        if timeseries.is_empty() {
            return Ok(());
        }

        self.update_max_timestamp(timeseries);
        self.received.inc_by(timeseries.len() as u64);

        if self.trackers.is_empty() {
            return Ok(());
        }

        let batch = to_label_sets(timeseries);
        self.dispatch(&batch)
    }

    /// Hand `batch` to every tracker in registration order.
    ///
    /// A failing tracker does not stop dispatch to the rest; the first
    /// failure is returned once all trackers have been called.
    pub fn dispatch(&self, batch: &[LabelSet]) -> Result<()> {
        let mut first_err = None;

        for (index, tracker) in self.trackers.iter().enumerate() {
            if let Err(e) = tracker.observe(batch) {
                warn!(tracker = index, "Tracker rejected batch of {}: {}", batch.len(), e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn update_max_timestamp(&self, timeseries: &[TimeSeries]) {
        let Some(newest) = timeseries.iter().filter_map(TimeSeries::max_timestamp).max() else {
            return;
        };

        let mut max_ts = self.max_ts.lock();
        if newest > *max_ts {
            *max_ts = newest;
            self.latest_sample_ts.set(newest);
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("trackers", &self.trackers.len())
            .field("received", &self.received.get())
            .finish()
    }
}

#[instrument(skip(tracker, shutdown))]
async fn run_recompute_loop(
    index: usize,
    tracker: Arc<dyn Tracker>,
    period: Duration,
    shutdown: CancellationToken,
) {
    info!("Starting recompute loop every {:?}", period);

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Recompute loop shutting down");
                break;
            }

            _ = tick.tick() => {
                tracker.recompute_metrics();
                debug!("Recompute pass complete");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
