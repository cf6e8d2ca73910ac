//! Active-Window Tracker
//!
//! Remembers when each series was last received and, on every recompute,
//! publishes how many distinct series were seen within each configured
//! trailing window. Series older than the longest window are dropped during
//! the recompute pass.

use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use parking_lot::Mutex;
use prometheus::{GaugeVec, Opts, Registry};
use tracing::debug;

use super::identity::{Fingerprint, LabelSet};
use super::{Tracker, METRIC_NAMESPACE};
use crate::config::format_duration;
use crate::error::Result;

/// Counts distinct series per trailing window.
pub struct ActiveTracker {
    /// Configured windows, in configuration order
    windows: Vec<Duration>,
    /// Pre-rendered `window` label values, parallel to `windows`
    window_labels: Vec<String>,
    /// Longest window; entries older than this are evicted
    max_window: Option<Duration>,
    /// Last time each fingerprint was observed
    seen: Mutex<FnvHashMap<Fingerprint, Instant>>,
    /// Published gauge, one series per window
    gauge: GaugeVec,
}

impl ActiveTracker {
    /// Create a tracker and register its gauge in `registry`.
    pub fn new(windows: Vec<Duration>, registry: &Registry) -> Result<Self> {
        let gauge = GaugeVec::new(
            Opts::new(
                "active_metrics",
                "the number of active metrics over the given window",
            )
            .namespace(METRIC_NAMESPACE),
            &["window"],
        )?;
        registry.register(Box::new(gauge.clone()))?;

        let window_labels = windows.iter().map(|w| format_duration(*w)).collect();
        let max_window = windows.iter().max().copied();

        Ok(Self {
            windows,
            window_labels,
            max_window,
            seen: Mutex::new(FnvHashMap::default()),
            gauge,
        })
    }

    /// Number of fingerprints currently held.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no fingerprints are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `batch` as seen at `now`.
    ///
    /// Without any window no series can ever count, so nothing is kept.
    pub fn observe_at(&self, batch: &[LabelSet], now: Instant) {
        if self.max_window.is_none() {
            return;
        }

        let mut seen = self.seen.lock();
        for labels in batch {
            seen.entry(labels.fingerprint())
                .and_modify(|last| {
                    if now > *last {
                        *last = now;
                    }
                })
                .or_insert(now);
        }
    }

    /// Count series per window as of `now` and publish the result.
    ///
    /// A series whose age equals a window exactly counts toward that window.
    pub fn recompute_at(&self, now: Instant) {
        let Some(max_window) = self.max_window else {
            return;
        };

        let mut counts = vec![0u64; self.windows.len()];
        let (live, evicted) = {
            let mut seen = self.seen.lock();
            let before = seen.len();
            seen.retain(|_, last| {
                let age = now.saturating_duration_since(*last);
                for (count, window) in counts.iter_mut().zip(&self.windows) {
                    if age <= *window {
                        *count += 1;
                    }
                }
                age <= max_window
            });
            (seen.len(), before - seen.len())
        };

        for (label, count) in self.window_labels.iter().zip(&counts) {
            self.gauge.with_label_values(&[label.as_str()]).set(*count as f64);
        }

        debug!(live, evicted, "Recomputed active series windows");
    }
}

impl std::fmt::Debug for ActiveTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveTracker")
            .field("windows", &self.window_labels)
            .finish()
    }
}

impl Tracker for ActiveTracker {
    fn observe(&self, batch: &[LabelSet]) -> Result<()> {
        self.observe_at(batch, Instant::now());
        Ok(())
    }

    fn recompute_metrics(&self) {
        self.recompute_at(Instant::now());
    }
}

// =============================================================================
// Tests
// =============================================================================
