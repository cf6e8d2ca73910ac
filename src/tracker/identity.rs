//! Series Identity
//!
//! A [`LabelSet`] identifies one time series by its label names and values,
//! without samples. [`Fingerprint`] is a fast, order-independent 64-bit hash
//! of a label set, used as a map key by the trackers. Distinct label sets may
//! share a fingerprint with small probability.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;

/// FNV-1a 64-bit offset basis, returned for the empty label set.
const EMPTY_FINGERPRINT: u64 = 0xcbf2_9ce4_8422_2325;

/// Separates a label name from its value inside a label hash.
const SEPARATOR: u8 = 0xff;

/// Name of the label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Opaque fingerprint of a [`LabelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Immutable mapping of label name to label value.
///
/// Equality ignores insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate labels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Label names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    /// Fingerprint of this label set.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }

    /// Restrict to `names`, using the empty string for absent labels.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> LabelSet {
        project(self, names)
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Compute the fingerprint of a label set.
///
/// Each label is hashed on its own with FNV-1a and the results are XORed,
/// so the outcome does not depend on iteration order.
pub fn fingerprint(labels: &LabelSet) -> Fingerprint {
    if labels.is_empty() {
        return Fingerprint(EMPTY_FINGERPRINT);
    }

    let mut combined = 0u64;
    for (name, value) in labels.iter() {
        let mut hasher = FnvHasher::default();
        hasher.write(name.as_bytes());
        hasher.write_u8(SEPARATOR);
        hasher.write(value.as_bytes());
        combined ^= hasher.finish();
    }

    Fingerprint(combined)
}

/// Build a new label set holding only `names`.
///
/// Names missing from `labels` map to the empty string, so the result always
/// has exactly one entry per distinct requested name.
pub fn project<S: AsRef<str>>(labels: &LabelSet, names: &[S]) -> LabelSet {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            (name, labels.get(name).unwrap_or_default())
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
