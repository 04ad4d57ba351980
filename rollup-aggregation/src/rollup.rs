//! Parsing of the `rollup` marker tag.
//!
//! The marker value has the form `<macro>:<expression>`. The macro picks the
//! aggregation family and the expression picks which tags become aggregation
//! dimensions:
//!
//! - `*` selects every tag.
//! - `az;env` selects the listed tags. A token containing `*` selects every tag
//!   whose key starts with the text before the `*`.
//! - `*-core;pid` selects every tag except the listed ones.
//!
//! ```
//! use rollup_aggregation::rollup::{AggregationFamily, RollupSelection};
//! use std::collections::BTreeMap;
//!
//! let tags = BTreeMap::from([
//!     ("rollup".to_owned(), "timer:az;foo".to_owned()),
//!     ("az".to_owned(), "sea1".to_owned()),
//!     ("env".to_owned(), "dev".to_owned()),
//! ]);
//!
//! let selection = RollupSelection::resolve(&tags).unwrap();
//! assert_eq!(selection.family, Some(AggregationFamily::Timer));
//! assert!(!selection.tags.contains_key("rollup"));
//! assert_eq!(selection.dimensions.keys().collect::<Vec<_>>(), ["az"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, warn};

use crate::NamedAggregate;
use crate::constants::{BAD_DATA_ROLLUP, ROLLUP_TAG};

/// How a windowed rollup should be summarized downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationFamily {
    /// Latency-like values.
    Timer,
    /// Monotonic counts; the only family that carries a running sum.
    Counter,
    /// Sampled levels.
    Gauge,
    /// The macro wasn't recognized.
    Unsupported,
}

impl AggregationFamily {
    /// Map a rollup macro to its family.
    ///
    /// Returns `None` for `local`, which selects the local aggregation variant
    /// instead of a family.
    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "timer" => Some(Self::Timer),
            "counter" => Some(Self::Counter),
            "gauge" | "default" => Some(Self::Gauge),
            "local" => None,
            other => {
                debug!(rollup_macro = other, "unsupported rollup macro");
                Some(Self::Unsupported)
            }
        }
    }

    /// Value of the `aggregates` output tag.
    pub fn label(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Unsupported => "unsupported",
        }
    }

    /// The statistics consumers of this family compute from the digest.
    pub fn aggregates(self) -> &'static [NamedAggregate] {
        use NamedAggregate::*;
        match self {
            Self::Timer => &[Min, Max, Count, Median, P90, P95, P99],
            Self::Counter => &[Sum, Count],
            Self::Gauge => &[Min, Max, Median],
            Self::Unsupported => &[],
        }
    }
}

impl fmt::Display for AggregationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of resolving a measurement's `rollup` tag.
///
/// Computed once per measurement and shared by every bucketing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupSelection {
    /// All tags of the measurement except the `rollup` marker.
    pub tags: BTreeMap<String, String>,
    /// The tags selected as aggregation dimensions.
    pub dimensions: BTreeMap<String, String>,
    /// `None` selects the local aggregation variant.
    pub family: Option<AggregationFamily>,
}

impl RollupSelection {
    /// Resolve the `rollup` tag of a tag set.
    ///
    /// Returns `None` when there is no `rollup` tag. A value without a macro is
    /// replaced by `bad_data:*` rather than rejected.
    pub fn resolve(tags: &BTreeMap<String, String>) -> Option<Self> {
        let rollup = tags.get(ROLLUP_TAG)?;
        let (rollup_macro, expression) = split_rollup_value(rollup);

        let mut tags = tags.clone();
        tags.remove(ROLLUP_TAG);
        let dimensions = reduce_to_rollup_tags(&tags, expression);

        Some(Self {
            family: AggregationFamily::from_macro(rollup_macro),
            dimensions,
            tags,
        })
    }
}

/// Split a rollup value into its macro and expression.
pub fn split_rollup_value(value: &str) -> (&str, &str) {
    match value.split_once(':') {
        Some((rollup_macro, expression)) if !rollup_macro.is_empty() => (rollup_macro, expression),
        _ => {
            warn!(rollup = value, "malformed rollup tag, aggregating as bad data");
            BAD_DATA_ROLLUP
                .split_once(':')
                .unwrap_or((BAD_DATA_ROLLUP, "*"))
        }
    }
}

/// Restrict `tags` to the keys selected by a rollup expression.
pub fn reduce_to_rollup_tags(
    tags: &BTreeMap<String, String>,
    expression: &str,
) -> BTreeMap<String, String> {
    let (subtractive, expression) = match expression.strip_prefix("*-") {
        Some(rest) => (true, rest),
        None => (false, expression),
    };

    let mut selected = BTreeSet::new();
    for token in expression.split(';').filter(|token| !token.is_empty()) {
        if token.contains('*') {
            selected.extend(expand_wildcard(token, tags.keys().map(String::as_str)));
        } else {
            selected.insert(token);
        }
    }

    tags.iter()
        .filter(|(key, _)| selected.contains(key.as_str()) != subtractive)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// The keys matching a wildcard token, by prefix up to the first `*`.
pub fn expand_wildcard<'a>(
    token: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Vec<&'a str> {
    let prefix = token.split('*').next().unwrap_or_default();
    keys.into_iter()
        .filter(|key| key.starts_with(prefix))
        .collect()
}
