//! prom-count - Series Cardinality Receiver
//!
//! Receives Prometheus remote-write traffic and publishes, as gauges, how
//! many distinct series are active and how series are distributed over a
//! reduced set of labels.
//!
//! # Architecture
//!
//! ```text
//! POST /receive → Receiver → ActiveTracker     → prom_count_active_metrics{window}
//!                          → LabelCountTracker → metric_count{label_*}
//! ```
//!
//! # Modules
//!
//! - [`config`] - Tracker configuration and duration handling
//! - [`error`] - Error types
//! - [`receiver`] - Remote-write decoding and tracker dispatch
//! - [`server`] - HTTP endpoints
//! - [`tracker`] - Series identity and the tracker implementations

pub mod config;
pub mod error;
pub mod receiver;
pub mod server;
pub mod tracker;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use receiver::{Receiver, RECOMPUTE_INTERVAL};
pub use tracker::{ActiveTracker, LabelCountTracker, LabelSet, Tracker};

use std::sync::Arc;

use prometheus::Registry;

/// Build the default tracker set from `config`, registering gauges in
/// `registry`.
pub fn build_trackers(config: &TrackerConfig, registry: &Registry) -> Result<Vec<Arc<dyn Tracker>>> {
    config.validate()?;

    let active = ActiveTracker::new(config.windows.clone(), registry)?;
    let label_count = LabelCountTracker::new(config.ttl, config.labels.as_slice(), registry)?;

    let trackers: Vec<Arc<dyn Tracker>> = vec![Arc::new(active), Arc::new(label_count)];
    Ok(trackers)
}
