//! Per-bucket, per-window aggregation state.

use std::collections::BTreeMap;
use std::time::SystemTime;

use rollup_tdigest::{DigestError, TDigest};

use crate::constants::{
    AGGREGATES_TAG, BUCKET_KEY_TAG, FIELD_CENTROIDS, FIELD_COMPRESSION, HOST_TAG, SOURCE_TAG,
    UTILITY_SUFFIX, missing_value,
};
use crate::rollup::AggregationFamily;
use crate::{Accumulator, BucketAssignment, FieldValue, NamedAggregate, Point};

/// How a cell is emitted. Chosen when the cell is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationVariant {
    /// Emits the encoded digest at the window start, for downstream merging.
    Windowed {
        /// The family requested by the rollup macro.
        family: AggregationFamily,
    },
    /// Emits summary statistics attributed to the originating host.
    Local {
        /// Value of the `host` tag, or `MISSING_host`.
        host: String,
    },
}

impl AggregationVariant {
    /// Pick the variant for a family, taking the host from `tags` for local
    /// aggregations.
    pub fn select(family: Option<AggregationFamily>, tags: &BTreeMap<String, String>) -> Self {
        match family {
            Some(family) => Self::Windowed { family },
            None => Self::Local {
                host: tags
                    .get(HOST_TAG)
                    .cloned()
                    .unwrap_or_else(|| missing_value(HOST_TAG)),
            },
        }
    }
}

/// Statistics for one bucket within one window.
#[derive(Debug, Clone)]
pub struct AggregationCell {
    digest: TDigest,
    variant: AggregationVariant,
    base_name: String,
    tags: BTreeMap<String, String>,
    sum: f64,
    window: SystemTime,
    created_at: SystemTime,
}

impl AggregationCell {
    /// Create an empty cell.
    pub fn new(
        assignment: BucketAssignment,
        variant: AggregationVariant,
        base_name: impl Into<String>,
        compression: f64,
        window: SystemTime,
        created_at: SystemTime,
    ) -> Self {
        Self {
            digest: TDigest::new(compression),
            variant,
            base_name: base_name.into(),
            tags: assignment.tags,
            sum: 0.0,
            window,
            created_at,
        }
    }

    /// Add a value to the digest and the running sum.
    ///
    /// Invalid values are rejected and leave the cell unchanged.
    pub fn add_value(&mut self, value: f64) -> Result<(), DigestError> {
        self.digest.add(value, 1.0)?;
        self.sum += value;
        Ok(())
    }

    /// Read one statistic.
    ///
    /// Returns NaN for quantiles of an empty cell.
    pub fn aggregate(&mut self, aggregate: NamedAggregate) -> Result<f64, DigestError> {
        Ok(match aggregate {
            NamedAggregate::Min => self.digest.min(),
            NamedAggregate::Max => self.digest.max(),
            NamedAggregate::Sum => self.sum,
            NamedAggregate::Count => self.digest.count(),
            NamedAggregate::Median
            | NamedAggregate::P90
            | NamedAggregate::P95
            | NamedAggregate::P99 => {
                let q = aggregate.quantile().unwrap_or(0.5);
                self.digest.quantile(q)?
            }
        })
    }

    /// Emit this cell as one point.
    pub fn emit<A: Accumulator + ?Sized>(&mut self, accumulator: &mut A) -> Result<(), DigestError> {
        let point = match self.variant.clone() {
            AggregationVariant::Windowed { family } => {
                let mut fields = BTreeMap::new();
                if family.aggregates().contains(&NamedAggregate::Sum) {
                    fields.insert(
                        format!("{}{UTILITY_SUFFIX}", NamedAggregate::Sum),
                        FieldValue::Float(self.sum),
                    );
                }
                fields.insert(
                    FIELD_COMPRESSION.to_owned(),
                    FieldValue::Float(self.digest.compression()),
                );
                fields.insert(
                    FIELD_CENTROIDS.to_owned(),
                    FieldValue::Bytes(self.digest.encode()?),
                );
                Point {
                    name: self.base_name.clone(),
                    fields,
                    tags: self.tags.clone(),
                    timestamp: Some(self.window),
                }
            }
            AggregationVariant::Local { host } => {
                let mut tags = self.tags.clone();
                tags.remove(BUCKET_KEY_TAG);
                tags.remove(AGGREGATES_TAG);
                tags.insert(SOURCE_TAG.to_owned(), host);

                let mut fields = BTreeMap::new();
                for aggregate in [
                    NamedAggregate::Max,
                    NamedAggregate::Min,
                    NamedAggregate::Count,
                    NamedAggregate::Median,
                ] {
                    fields.insert(
                        aggregate.to_string(),
                        FieldValue::Float(self.aggregate(aggregate)?),
                    );
                }
                Point {
                    name: self.base_name.clone(),
                    fields,
                    tags,
                    timestamp: None,
                }
            }
        };
        accumulator.emit(point);
        Ok(())
    }

    /// Whether no value has been added.
    pub fn is_empty(&self) -> bool {
        self.digest.is_empty()
    }

    /// Start of the window this cell aggregates.
    pub fn window(&self) -> SystemTime {
        self.window
    }

    /// When the first value landed in this cell.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Measurement name joined with the field name.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Tags attached to windowed emissions.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The emission variant.
    pub fn variant(&self) -> &AggregationVariant {
        &self.variant
    }

    /// The digest backing this cell.
    pub fn digest(&self) -> &TDigest {
        &self.digest
    }
}
