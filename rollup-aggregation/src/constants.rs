//! Tag keys, field names and sentinels shared by emitted points.
//!
//! These names are part of the output protocol: downstream consumers match on
//! them, so they must not change.

use std::time::Duration;

/// Marker tag that opts a measurement into rollup. Its value is a rollup macro.
pub const ROLLUP_TAG: &str = "rollup";
/// Optional input tag naming the finest-grained originator of a measurement.
pub const ATOM_TAG: &str = "atom";
/// Output tag carrying the resolved rollup source.
pub const SOURCE_TAG: &str = "source";
/// Output tag carrying the derived bucket key.
pub const BUCKET_KEY_TAG: &str = "bucket_key";
/// Output tag carrying the aggregation family label.
pub const AGGREGATES_TAG: &str = "aggregates";
/// Tag naming the originating host, used by local aggregations.
pub const HOST_TAG: &str = "host";

/// Attached when no atom could be resolved.
pub const ATOM_SLA_VIOLATION_TAG: &str = "sla.violation.atom_tag";
/// Attached when the configured source tag is missing.
pub const SOURCE_SLA_VIOLATION_TAG: &str = "sla.violation.source_tag";
/// Value of both SLA violation tags.
pub const SLA_VIOLATION_MISSING: &str = "MISSING";
/// Prefix of the value substituted for a missing required tag.
pub const MISSING_VALUE_PREFIX: &str = "MISSING_";

/// Substituted for a rollup value that has no macro.
pub const BAD_DATA_ROLLUP: &str = "bad_data:*";
/// Separator between the parts of a bucket key and of a point name.
pub const KEY_DELIMITER: &str = "_";

/// Field carrying the digest compression.
pub const FIELD_COMPRESSION: &str = "compression";
/// Field carrying the encoded digest snapshot.
pub const FIELD_CENTROIDS: &str = "centroids";
/// Suffix marking a field as derived bookkeeping rather than a statistic.
pub const UTILITY_SUFFIX: &str = "_utility";

/// Width of an aggregation window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Name of the points emitted by [`crate::FlushDelayCounts`].
pub const FLUSH_DELAY_METRIC: &str = "rollup_flush_delay";
/// Tag carrying the flush delay of a [`FLUSH_DELAY_METRIC`] point.
pub const DELAY_MINUTES_TAG: &str = "delay_minutes";

pub(crate) fn missing_value(tag_key: &str) -> String {
    format!("{MISSING_VALUE_PREFIX}{tag_key}")
}
