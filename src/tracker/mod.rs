//! Trackers
//!
//! Stateful aggregations over the stream of received series identities.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  observe(batch)   ┌──────────────────────┐
//! │  Receiver  │──────────────────▶│  ActiveTracker       │──▶ prom_count_active_metrics{window}
//! │            │                   └──────────────────────┘
//! │            │  observe(batch)   ┌──────────────────────┐
//! │            │──────────────────▶│  LabelCountTracker   │──▶ metric_count{label_*}
//! └────────────┘                   └──────────────────────┘
//!        │ every 15s: recompute_metrics()       ▲
//!        └──────────────────────────────────────┘
//! ```
//!
//! Each tracker serializes its own state behind one lock. Trackers never
//! share state with one another.

mod active;
mod identity;
mod label_count;
mod proptest;

pub use active::ActiveTracker;
pub use identity::{fingerprint, project, Fingerprint, LabelSet, METRIC_NAME_LABEL};
pub use label_count::{LabelCountTracker, LABEL_PREFIX};

use crate::error::Result;

/// Namespace for gauges published by the trackers.
pub const METRIC_NAMESPACE: &str = "prom_count";

/// Contract shared by every tracker.
pub trait Tracker: Send + Sync {
    /// Record every series in `batch` as seen now.
    fn observe(&self, batch: &[LabelSet]) -> Result<()>;

    /// Publish aggregates from the current state, evicting stale entries.
    fn recompute_metrics(&self);
}
