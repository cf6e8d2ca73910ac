//! Reduced-Label Cardinality Tracker
//!
//! Counts live series grouped by a configured subset of their labels.
//!
//! # Design
//!
//! Two maps sit behind one lock:
//!
//! - full fingerprint → (reduced fingerprint, last seen), one entry per
//!   distinct series, expired individually after the TTL
//! - reduced fingerprint → reduced label set, one entry per published series
//!
//! The reduced label set of a series is computed once, when the series is
//! first seen. A reduced series whose count drops to zero is published once
//! at zero, then removed from the gauge on the following pass.

use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use parking_lot::Mutex;
use prometheus::{GaugeVec, Opts, Registry};
use tracing::{debug, warn};

use super::identity::{Fingerprint, LabelSet};
use super::Tracker;
use crate::config::format_duration;
use crate::error::Result;

/// Prefix applied to tracked label names on the published gauge.
pub const LABEL_PREFIX: &str = "label";

#[derive(Debug, Clone, Copy)]
struct FullEntry {
    reduced: Fingerprint,
    last: Instant,
}

#[derive(Debug, Default)]
struct State {
    /// Every live series, keyed by its full fingerprint
    full: FnvHashMap<Fingerprint, FullEntry>,
    /// Reduced label sets still being published
    reduced: FnvHashMap<Fingerprint, LabelSet>,
    /// Label values published at zero on the last pass
    retired: FnvHashMap<Fingerprint, Vec<String>>,
}

/// Counts live series per reduced label set, subject to a TTL.
pub struct LabelCountTracker {
    /// How long a series stays live after it was last seen
    ttl: Duration,
    /// Input label names kept in the reduced label set
    tracked: Vec<String>,
    /// Maps, guarded together
    state: Mutex<State>,
    /// Published gauge, labelled by the prefixed tracked names
    gauge: GaugeVec,
}

impl LabelCountTracker {
    /// Create a tracker and register its gauge in `registry`.
    ///
    /// Repeated label names are kept once.
    pub fn new<S: AsRef<str>>(ttl: Duration, labels: &[S], registry: &Registry) -> Result<Self> {
        let mut tracked: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            if !tracked.iter().any(|t| t == label) {
                tracked.push(label.to_string());
            }
        }

        let output_labels: Vec<String> = tracked.iter().map(|l| output_label(l)).collect();
        let output_refs: Vec<&str> = output_labels.iter().map(String::as_str).collect();

        let gauge = GaugeVec::new(
            Opts::new(
                "metric_count",
                format!(
                    "the number of metrics observed in the last {} for the given {}_ labels",
                    format_duration(ttl),
                    LABEL_PREFIX
                ),
            ),
            &output_refs,
        )?;
        registry.register(Box::new(gauge.clone()))?;

        Ok(Self {
            ttl,
            tracked,
            state: Mutex::new(State::default()),
            gauge,
        })
    }

    /// Tracked input label names, in gauge label order.
    pub fn tracked_labels(&self) -> &[String] {
        &self.tracked
    }

    /// Number of live series held.
    pub fn series_count(&self) -> usize {
        self.state.lock().full.len()
    }

    /// Number of reduced label sets held.
    pub fn reduced_count(&self) -> usize {
        self.state.lock().reduced.len()
    }

    /// Record `batch` as seen at `now`.
    pub fn observe_at(&self, batch: &[LabelSet], now: Instant) {
        let mut state = self.state.lock();

        for labels in batch {
            let fp = labels.fingerprint();
            if let Some(entry) = state.full.get_mut(&fp) {
                if now > entry.last {
                    entry.last = now;
                }
                continue;
            }

            let reduced = labels.project(self.tracked.as_slice());
            let reduced_fp = reduced.fingerprint();
            state.full.insert(
                fp,
                FullEntry {
                    reduced: reduced_fp,
                    last: now,
                },
            );
            state.reduced.entry(reduced_fp).or_insert(reduced);
        }
    }

    /// Count live series per reduced label set as of `now` and publish.
    ///
    /// A series last seen exactly `ttl` ago is still live.
    pub fn recompute_at(&self, now: Instant) {
        let mut state = self.state.lock();
        let State {
            full,
            reduced,
            retired,
        } = &mut *state;

        for (fp, values) in retired.drain() {
            if reduced.contains_key(&fp) {
                continue;
            }
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            if let Err(e) = self.gauge.remove_label_values(&values) {
                warn!("Failed to remove zeroed series {:?}: {}", values, e);
            }
        }

        let before = full.len();
        let mut counts: FnvHashMap<Fingerprint, u64> = FnvHashMap::default();
        full.retain(|_, entry| {
            if now.saturating_duration_since(entry.last) > self.ttl {
                return false;
            }
            *counts.entry(entry.reduced).or_insert(0) += 1;
            true
        });
        let expired = before - full.len();

        for (fp, labels) in reduced.iter() {
            let values: Vec<&str> = self
                .tracked
                .iter()
                .map(|name| labels.get(name).unwrap_or_default())
                .collect();
            let count = counts.get(fp).copied().unwrap_or(0);
            self.gauge.with_label_values(&values).set(count as f64);

            if count == 0 {
                retired.insert(*fp, values.iter().map(|v| v.to_string()).collect());
            }
        }

        reduced.retain(|fp, _| counts.contains_key(fp));

        debug!(
            live = full.len(),
            expired,
            reduced = reduced.len(),
            zeroed = retired.len(),
            "Recomputed reduced label counts"
        );
    }
}

impl std::fmt::Debug for LabelCountTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelCountTracker")
            .field("ttl", &self.ttl)
            .field("tracked", &self.tracked)
            .finish()
    }
}

impl Tracker for LabelCountTracker {
    fn observe(&self, batch: &[LabelSet]) -> Result<()> {
        self.observe_at(batch, Instant::now());
        Ok(())
    }

    fn recompute_metrics(&self) {
        self.recompute_at(Instant::now());
    }
}

fn output_label(input: &str) -> String {
    format!("{}_{}", LABEL_PREFIX, input)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn series(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().copied().collect()
    }

    fn setup(labels: &[&str]) -> (LabelCountTracker, Registry) {
        let registry = Registry::new();
        let tracker = LabelCountTracker::new(TTL, labels, &registry).unwrap();
        (tracker, registry)
    }

    fn exposition(registry: &Registry) -> String {
        prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap()
    }

    #[test]
    fn test_untracked_labels_are_combined() {
        let (tracker, registry) = setup(&["job"]);
        let t0 = Instant::now();

        tracker.observe_at(
            &[
                series(&[("job", "x"), ("pod", "1")]),
                series(&[("job", "x"), ("pod", "2")]),
            ],
            t0,
        );
        tracker.recompute_at(t0);

        assert_eq!(tracker.series_count(), 2);
        assert_eq!(tracker.reduced_count(), 1);
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 2"#));
    }

    #[test]
    fn test_expired_series_published_once_at_zero() {
        let (tracker, registry) = setup(&["job"]);
        let t0 = Instant::now();

        tracker.observe_at(
            &[
                series(&[("job", "x"), ("pod", "1")]),
                series(&[("job", "x"), ("pod", "2")]),
            ],
            t0,
        );
        tracker.recompute_at(t0);
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 2"#));

        tracker.recompute_at(t0 + Duration::from_secs(61));
        assert_eq!(tracker.series_count(), 0);
        assert_eq!(tracker.reduced_count(), 0);
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 0"#));

        tracker.recompute_at(t0 + Duration::from_secs(76));
        assert!(!exposition(&registry).contains(r#"label_job="x""#));
    }

    #[test]
    fn test_ttl_boundary_is_inclusive() {
        let (tracker, registry) = setup(&["job"]);
        let t0 = Instant::now();

        tracker.observe_at(&[series(&[("job", "x")])], t0);
        tracker.recompute_at(t0 + TTL);

        assert_eq!(tracker.series_count(), 1);
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 1"#));
    }

    #[test]
    fn test_refresh_keeps_series_live() {
        let (tracker, _registry) = setup(&["job"]);
        let t0 = Instant::now();
        let s = series(&[("job", "x"), ("pod", "1")]);

        tracker.observe_at(&[s.clone()], t0);
        tracker.observe_at(&[s], t0 + Duration::from_secs(50));
        tracker.recompute_at(t0 + Duration::from_secs(100));

        assert_eq!(tracker.series_count(), 1);
        assert_eq!(tracker.reduced_count(), 1);
    }

    #[test]
    fn test_partial_expiry() {
        let (tracker, registry) = setup(&["job"]);
        let t0 = Instant::now();

        tracker.observe_at(&[series(&[("job", "x"), ("pod", "1")])], t0);
        tracker.observe_at(
            &[series(&[("job", "x"), ("pod", "2")])],
            t0 + Duration::from_secs(30),
        );
        tracker.recompute_at(t0 + Duration::from_secs(70));

        assert_eq!(tracker.series_count(), 1);
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 1"#));
    }

    #[test]
    fn test_reappearing_series_is_republished() {
        let (tracker, registry) = setup(&["job"]);
        let t0 = Instant::now();
        let s = series(&[("job", "x"), ("pod", "1")]);

        tracker.observe_at(&[s.clone()], t0);
        tracker.recompute_at(t0);
        tracker.recompute_at(t0 + Duration::from_secs(61));
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 0"#));

        tracker.observe_at(&[s], t0 + Duration::from_secs(65));
        tracker.recompute_at(t0 + Duration::from_secs(76));
        assert!(exposition(&registry).contains(r#"metric_count{label_job="x"} 1"#));
    }

    #[test]
    fn test_missing_tracked_label_is_empty() {
        let (tracker, registry) = setup(&["__name__", "job"]);
        let t0 = Instant::now();

        tracker.observe_at(&[series(&[("__name__", "up"), ("pod", "1")])], t0);
        tracker.recompute_at(t0);

        assert!(exposition(&registry)
            .contains(r#"metric_count{label___name__="up",label_job=""} 1"#));
    }

    #[test]
    fn test_observe_concurrent_with_recompute() {
        let (tracker, registry) = setup(&["job"]);
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    tracker.recompute_metrics();
                }
            });

            let writers: Vec<_> = (0..4)
                .map(|worker| {
                    let tracker = &tracker;
                    scope.spawn(move || {
                        for i in 0..250 {
                            let pod = format!("{}-{}", worker, i);
                            let batch = [series(&[("job", "api"), ("pod", pod.as_str())])];
                            tracker.observe(&batch).unwrap();
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, std::sync::atomic::Ordering::Release);
        });

        tracker.recompute_metrics();
        assert_eq!(tracker.series_count(), 1000);
        assert_eq!(tracker.reduced_count(), 1);
        assert!(exposition(&registry).contains("metric_count{label_job=\"api\"} 1000\n"));
    }

    #[test]
    fn test_duplicate_labels_collapse() {
        let (tracker, _registry) = setup(&["job", "job", "instance"]);
        assert_eq!(tracker.tracked_labels(), ["job", "instance"]);
    }

    #[test]
    fn test_invalid_label_name_rejected() {
        let registry = Registry::new();
        assert!(LabelCountTracker::new(TTL, &["not-valid"], &registry).is_err());
    }

    #[test]
    fn test_help_names_ttl() {
        let (tracker, registry) = setup(&["job"]);
        tracker.observe_at(&[series(&[("job", "x")])], Instant::now());
        tracker.recompute_metrics();

        assert!(exposition(&registry).contains("in the last 1m0s for the given label_ labels"));
    }
}
