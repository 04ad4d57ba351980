#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod accumulator;
pub mod bucketing;
pub mod cell;
mod config;
pub mod constants;
pub mod engine;
mod measurement;
mod named;
pub mod rollup;
mod self_metrics;
#[cfg(feature = "test-util")]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;
mod worker;

pub use accumulator::{Accumulator, Point};
pub use bucketing::{BucketAssignment, BucketKeyBuilder, BucketingPolicy};
pub use cell::{AggregationCell, AggregationVariant};
pub use config::{ConfigError, RollupConfig};
pub use engine::{AggregationEngine, CacheKey};
pub use measurement::{FieldValue, Measurement};
pub use named::{NamedAggregate, UnknownAggregate};
pub use rollup::{AggregationFamily, RollupSelection};
pub use self_metrics::{FlushDelayCounts, MetricsRsSelfMetrics, NoopSelfMetrics, SelfMetrics};
pub use worker::FlushWorker;
