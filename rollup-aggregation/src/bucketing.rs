//! Derivation of bucket keys and output tags.
//!
//! A bucket key identifies the cell a value is aggregated into. It is built as
//! `<name>_<source>` followed by the values of the remaining dimensions, in tag
//! key order. Required tags that are missing are replaced by a `MISSING_<key>`
//! sentinel and flagged with an SLA violation tag, so a measurement is never
//! dropped for lacking a tag.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    AGGREGATES_TAG, ATOM_SLA_VIOLATION_TAG, ATOM_TAG, BUCKET_KEY_TAG, KEY_DELIMITER, ROLLUP_TAG,
    SLA_VIOLATION_MISSING, SOURCE_SLA_VIOLATION_TAG, SOURCE_TAG, missing_value,
};
use crate::rollup::{AggregationFamily, RollupSelection};

/// Tags that never participate in a bucket key.
const ALWAYS_EXCLUDED: [&str; 2] = [ROLLUP_TAG, AGGREGATES_TAG];

/// One way of grouping values into buckets.
///
/// Every value is aggregated once per configured policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketingPolicy {
    /// Tags removed from the aggregation dimensions.
    #[serde(default)]
    pub exclude_tags: BTreeSet<String>,
    /// Tag whose value becomes the `source` of the rollup.
    pub source_tag_key: String,
    /// Tag whose value becomes the `atom` when the measurement has no `atom` tag.
    #[serde(default)]
    pub atom_replacement_tag_key: Option<String>,
}

impl BucketingPolicy {
    /// A policy with no exclusions and no atom replacement.
    pub fn new(source_tag_key: impl Into<String>) -> Self {
        Self {
            exclude_tags: BTreeSet::new(),
            source_tag_key: source_tag_key.into(),
            atom_replacement_tag_key: None,
        }
    }

    /// Use the value of `tag_key` as the atom when there is no `atom` tag.
    pub fn with_atom_replacement(mut self, tag_key: impl Into<String>) -> Self {
        self.atom_replacement_tag_key = Some(tag_key.into());
        self
    }

    /// Exclude `tag_key` from the aggregation dimensions.
    pub fn excluding(mut self, tag_key: impl Into<String>) -> Self {
        self.exclude_tags.insert(tag_key.into());
        self
    }
}

/// Where a value lands under one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAssignment {
    /// Identity of the aggregation cell within its window.
    pub bucket_key: String,
    /// Tags attached to the emitted point.
    pub tags: BTreeMap<String, String>,
    /// `None` for local aggregations.
    pub family: Option<AggregationFamily>,
}

/// Builds [`BucketAssignment`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketKeyBuilder;

impl BucketKeyBuilder {
    /// Assign the value named `base_name` to a bucket under `policy`.
    ///
    /// The explicit atom, the atom replacement and the source are looked up in
    /// the full tag set of the selection, so they resolve even when the rollup
    /// expression didn't select them as dimensions.
    pub fn build(
        base_name: &str,
        selection: &RollupSelection,
        policy: &BucketingPolicy,
    ) -> BucketAssignment {
        let mut dimensions = selection.dimensions.clone();
        let mut markers = BTreeMap::new();

        let atom = match (
            selection.tags.get(ATOM_TAG),
            policy.atom_replacement_tag_key.as_deref(),
        ) {
            (Some(atom), _) => atom.clone(),
            (None, Some(replacement)) => match selection.tags.get(replacement) {
                Some(atom) => atom.clone(),
                None => {
                    let atom = missing_value(replacement);
                    debug!(base_name, tag = replacement, "atom replacement tag missing");
                    dimensions.insert(replacement.to_owned(), atom.clone());
                    markers.insert(ATOM_SLA_VIOLATION_TAG, SLA_VIOLATION_MISSING);
                    atom
                }
            },
            (None, None) => {
                debug!(base_name, "atom tag missing");
                markers.insert(ATOM_SLA_VIOLATION_TAG, SLA_VIOLATION_MISSING);
                missing_value(ATOM_TAG)
            }
        };

        let source = match selection.tags.get(&policy.source_tag_key) {
            Some(source) => source.clone(),
            None => {
                let source = missing_value(&policy.source_tag_key);
                debug!(base_name, tag = %policy.source_tag_key, "source tag missing");
                dimensions.insert(policy.source_tag_key.clone(), source.clone());
                markers.insert(SOURCE_SLA_VIOLATION_TAG, SLA_VIOLATION_MISSING);
                source
            }
        };

        dimensions.retain(|key, _| {
            !policy.exclude_tags.contains(key) && !ALWAYS_EXCLUDED.contains(&key.as_str())
        });

        let mut bucket_key = format!("{base_name}{KEY_DELIMITER}{source}");
        for value in dimensions.values() {
            bucket_key.push_str(KEY_DELIMITER);
            bucket_key.push_str(value);
        }

        let mut tags = dimensions;
        tags.extend(
            markers
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value.to_owned())),
        );
        tags.insert(ATOM_TAG.to_owned(), atom);
        tags.insert(SOURCE_TAG.to_owned(), source);
        tags.insert(BUCKET_KEY_TAG.to_owned(), bucket_key.clone());
        if let Some(family) = selection.family {
            tags.insert(AGGREGATES_TAG.to_owned(), family.label().to_owned());
        }

        BucketAssignment {
            bucket_key,
            tags,
            family: selection.family,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    fn selection(pairs: &[(&str, &str)]) -> RollupSelection {
        let tags = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RollupSelection::resolve(&tags).unwrap()
    }

    fn timer_tags() -> Vec<(&'static str, &'static str)> {
        vec![
            ("host", "ubuntu"),
            ("az", "sea1"),
            ("env", "dev"),
            ("service", "telegraf"),
            ("rollup", "timer:*"),
        ]
    }

    #[test]
    fn key_is_source_then_sorted_dimensions() {
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&timer_tags()), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_dev_ubuntu_telegraf");
        check!(assignment.family == Some(AggregationFamily::Timer));
        check!(assignment.tags["atom"] == "ubuntu");
        check!(assignment.tags["source"] == "telegraf");
        check!(assignment.tags["aggregates"] == "timer");
        check!(!assignment.tags.contains_key("rollup"));
    }

    #[test]
    fn deterministic() {
        let policy = BucketingPolicy::new("service")
            .with_atom_replacement("host")
            .excluding("env");
        let selection = selection(&timer_tags());
        let first = BucketKeyBuilder::build("m1_a", &selection, &policy);
        let second = BucketKeyBuilder::build("m1_a", &selection, &policy);
        check!(first == second);
    }

    #[test]
    fn lookups_use_unselected_tags() {
        let selection = selection(&[
            ("foo", "bar"),
            ("az", "sea1"),
            ("env", "dev"),
            ("service", "telegraf"),
            ("rollup", "timer:az;foo"),
            ("host", "ubuntu"),
        ]);
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection, &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_bar");
        check!(
            assignment.tags
                == BTreeMap::from(
                    [
                        ("foo", "bar"),
                        ("az", "sea1"),
                        ("aggregates", "timer"),
                        ("bucket_key", "m1_a_telegraf_sea1_bar"),
                        ("source", "telegraf"),
                        ("atom", "ubuntu"),
                    ]
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                )
        );
    }

    #[test]
    fn missing_source_is_substituted() {
        let mut tags = timer_tags();
        tags.retain(|(k, _)| *k != "service");
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&tags), &policy);
        check!(assignment.bucket_key == "m1_a_MISSING_service_sea1_dev_ubuntu_MISSING_service");
        check!(assignment.tags["source"] == "MISSING_service");
        check!(assignment.tags["service"] == "MISSING_service");
        check!(assignment.tags["sla.violation.source_tag"] == "MISSING");
        check!(!assignment.tags.contains_key("sla.violation.atom_tag"));
    }

    #[test]
    fn missing_atom_replacement_becomes_a_dimension() {
        let mut tags = timer_tags();
        tags.retain(|(k, _)| *k != "host");
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&tags), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_dev_MISSING_host_telegraf");
        check!(assignment.tags["atom"] == "MISSING_host");
        check!(assignment.tags["host"] == "MISSING_host");
        check!(assignment.tags["sla.violation.atom_tag"] == "MISSING");
    }

    #[test]
    fn missing_atom_without_replacement() {
        let policy = BucketingPolicy::new("service");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&timer_tags()), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_dev_ubuntu_telegraf");
        check!(assignment.tags["atom"] == "MISSING_atom");
        check!(assignment.tags["host"] == "ubuntu");
        check!(assignment.tags["sla.violation.atom_tag"] == "MISSING");
    }

    #[test]
    fn explicit_atom_wins() {
        let mut tags = timer_tags();
        tags.retain(|(k, _)| *k != "host");
        tags.push(("atom", "carbon"));
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&tags), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_carbon_sea1_dev_telegraf");
        check!(assignment.tags["atom"] == "carbon");
        check!(!assignment.tags.contains_key("host"));
        check!(!assignment.tags.contains_key("sla.violation.atom_tag"));
    }

    #[test]
    fn excluded_atom_replacement_still_resolves() {
        let policy = BucketingPolicy::new("service")
            .with_atom_replacement("host")
            .excluding("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&timer_tags()), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_dev_telegraf");
        check!(assignment.tags["atom"] == "ubuntu");
        check!(!assignment.tags.contains_key("host"));
    }

    #[test]
    fn aggregates_tag_never_joins_the_key() {
        let mut tags = timer_tags();
        tags.push(("aggregates", "spoofed"));
        let policy = BucketingPolicy::new("service").with_atom_replacement("host");
        let assignment = BucketKeyBuilder::build("m1_a", &selection(&tags), &policy);
        check!(assignment.bucket_key == "m1_a_telegraf_sea1_dev_ubuntu_telegraf");
        check!(assignment.tags["aggregates"] == "timer");
    }
}
