//! Property-Based Tests for the Trackers
//!
//! # Test Properties
//!
//! 1. **Window Counts**: each window counts exactly the series seen within it
//! 2. **Idempotence**: repeated observations never add entries
//! 3. **Reduction**: published counts sum to the number of live series
//! 4. **Projection**: projecting onto all names is the identity

#![cfg(test)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use prometheus::Registry;

use super::{ActiveTracker, LabelCountTracker, LabelSet};

// =============================================================================
// Property Strategies
// =============================================================================

/// Small label sets drawn from a narrow alphabet so collisions of whole
/// label sets are common.
fn label_set_strategy() -> impl Strategy<Value = LabelSet> {
    prop::collection::btree_map("[a-c]", "[x-z]{0,2}", 0..3).prop_map(LabelSet::from)
}

/// Observation offsets in seconds paired with label sets.
fn observations_strategy() -> impl Strategy<Value = Vec<(u64, LabelSet)>> {
    prop::collection::vec((0u64..3600, label_set_strategy()), 0..40)
}

fn windows_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..1800, 1..5)
}

// =============================================================================
// Active-Window Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Counts match a naive last-seen computation.
    #[test]
    fn prop_active_counts_match_model(
        observations in observations_strategy(),
        windows in windows_strategy(),
        recompute_at in 0u64..7200,
    ) {
        let t0 = Instant::now();
        let windows: Vec<Duration> = windows.into_iter().map(Duration::from_secs).collect();
        let registry = Registry::new();
        let tracker = ActiveTracker::new(windows.clone(), &registry).unwrap();

        let mut model: HashMap<LabelSet, u64> = HashMap::new();
        for (offset, labels) in &observations {
            tracker.observe_at(std::slice::from_ref(labels), t0 + Duration::from_secs(*offset));
            let last = model.entry(labels.clone()).or_insert(*offset);
            *last = (*last).max(*offset);
        }

        let now = recompute_at.max(observations.iter().map(|(o, _)| *o).max().unwrap_or(0));
        tracker.recompute_at(t0 + Duration::from_secs(now));

        let text = prometheus::TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        for window in &windows {
            let expected = model
                .values()
                .filter(|last| now - **last <= window.as_secs())
                .count();
            let line = format!(
                "prom_count_active_metrics{{window=\"{}\"}} {}\n",
                crate::config::format_duration(*window),
                expected
            );
            prop_assert!(text.contains(&line), "missing {} in\n{}", line, text);
        }

        let max = windows.iter().max().unwrap().as_secs();
        let retained = model.values().filter(|last| now - **last <= max).count();
        prop_assert_eq!(tracker.len(), retained);
    }

    /// Re-observing the same batch never grows the tracker.
    #[test]
    fn prop_active_observe_idempotent(batch in prop::collection::vec(label_set_strategy(), 0..20)) {
        let tracker = ActiveTracker::new(vec![Duration::from_secs(60)], &Registry::new()).unwrap();
        let t0 = Instant::now();

        tracker.observe_at(&batch, t0);
        let first = tracker.len();
        tracker.observe_at(&batch, t0 + Duration::from_secs(1));

        prop_assert_eq!(tracker.len(), first);
        prop_assert!(first <= batch.len());
    }
}

// =============================================================================
// Reduced-Label Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every live series is counted under exactly one reduced label set.
    #[test]
    fn prop_reduced_counts_sum_to_live_series(
        batch in prop::collection::vec(label_set_strategy(), 0..30),
    ) {
        let registry = Registry::new();
        let tracker = LabelCountTracker::new(Duration::from_secs(60), &["a"], &registry).unwrap();
        let t0 = Instant::now();

        tracker.observe_at(&batch, t0);
        tracker.recompute_at(t0);

        let distinct: std::collections::HashSet<&LabelSet> = batch.iter().collect();
        let mut expected: HashMap<String, usize> = HashMap::new();
        for labels in &distinct {
            *expected.entry(labels.get("a").unwrap_or_default().to_string()).or_insert(0) += 1;
        }

        prop_assert_eq!(tracker.series_count(), distinct.len());
        prop_assert_eq!(tracker.reduced_count(), expected.len());

        let text = prometheus::TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        for (value, count) in &expected {
            let line = format!("metric_count{{label_a=\"{}\"}} {}\n", value, count);
            prop_assert!(text.contains(&line), "missing {} in\n{}", line, text);
        }
    }

    /// Projection onto a set's own names returns the same set.
    #[test]
    fn prop_project_own_names(labels in label_set_strategy()) {
        let names: Vec<String> = labels.names().map(str::to_string).collect();
        prop_assert_eq!(labels.project(names.as_slice()), labels.clone());
    }

    /// Projection onto no names always gives the same fingerprint.
    #[test]
    fn prop_project_empty_is_constant(a in label_set_strategy(), b in label_set_strategy()) {
        let none: [&str; 0] = [];
        prop_assert_eq!(a.project(&none).fingerprint(), b.project(&none).fingerprint());
    }
}
