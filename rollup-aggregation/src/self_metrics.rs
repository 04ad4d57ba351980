//! Observability of the engine itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::Ordering;

use metrics_024::{Key, Label};
use metrics_util_020::registry::{AtomicStorage, Registry};

use crate::constants::{DELAY_MINUTES_TAG, FLUSH_DELAY_METRIC};
use crate::{Accumulator, FieldValue, Point};

/// Receives measurements about the engine's own behavior.
pub trait SelfMetrics: Send + Sync {
    /// A cell was flushed `delay_minutes` after it was created.
    ///
    /// Computed as whole minutes between the cell's creation and the flush,
    /// minus one.
    fn record_flush_delay(&self, delay_minutes: i64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSelfMetrics;

impl SelfMetrics for NoopSelfMetrics {
    fn record_flush_delay(&self, _delay_minutes: i64) {}
}

fn flush_delay_key(delay_minutes: i64) -> Key {
    Key::from_parts(
        FLUSH_DELAY_METRIC,
        vec![Label::new(DELAY_MINUTES_TAG, delay_minutes.to_string())],
    )
}

fn delay_of(key: &Key) -> Option<i64> {
    key.labels()
        .find(|label| label.key() == DELAY_MINUTES_TAG)
        .and_then(|label| label.value().parse().ok())
}

/// Reports flush delays to the installed [`metrics`](metrics_024) recorder.
///
/// Each flushed cell increments the `rollup_flush_delay` counter labelled with
/// its `delay_minutes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRsSelfMetrics;

impl SelfMetrics for MetricsRsSelfMetrics {
    fn record_flush_delay(&self, delay_minutes: i64) {
        metrics_024::counter!(FLUSH_DELAY_METRIC, DELAY_MINUTES_TAG => delay_minutes.to_string())
            .increment(1);
    }
}

/// Counts flushes per delay in a local [`metrics`](metrics_024) registry, for
/// callers that report through an [`Accumulator`] instead of a recorder.
///
/// ```
/// use rollup_aggregation::{FlushDelayCounts, Point, SelfMetrics};
///
/// let counts = FlushDelayCounts::default();
/// counts.record_flush_delay(0);
/// counts.record_flush_delay(0);
/// counts.record_flush_delay(3);
///
/// let mut points: Vec<Point> = vec![];
/// counts.emit(&mut points);
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[0].tags["delay_minutes"], "0");
/// assert!(counts.counts().is_empty());
/// ```
pub struct FlushDelayCounts {
    registry: Registry<Key, AtomicStorage>,
}

impl Default for FlushDelayCounts {
    fn default() -> Self {
        Self {
            registry: Registry::new(AtomicStorage),
        }
    }
}

impl fmt::Debug for FlushDelayCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushDelayCounts")
            .field("counts", &self.counts())
            .finish()
    }
}

impl FlushDelayCounts {
    fn collect(&self, drain: bool) -> BTreeMap<i64, u64> {
        let mut counts = BTreeMap::new();
        self.registry.visit_counters(|key, counter| {
            let count = if drain {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            };
            if count == 0 {
                return;
            }
            if let Some(delay) = delay_of(key) {
                *counts.entry(delay).or_default() += count;
            }
        });
        counts
    }

    /// Current count per delay.
    pub fn counts(&self) -> BTreeMap<i64, u64> {
        self.collect(false)
    }

    /// Emit one `rollup_flush_delay` point per delay, in delay order, and reset
    /// the counts.
    pub fn emit<A: Accumulator + ?Sized>(&self, accumulator: &mut A) {
        for (delay, count) in self.collect(true) {
            accumulator.emit(Point {
                name: FLUSH_DELAY_METRIC.to_owned(),
                fields: BTreeMap::from([("count".to_owned(), FieldValue::UInt(count))]),
                tags: BTreeMap::from([(DELAY_MINUTES_TAG.to_owned(), delay.to_string())]),
                timestamp: None,
            });
        }
    }
}

impl SelfMetrics for FlushDelayCounts {
    fn record_flush_delay(&self, delay_minutes: i64) {
        self.registry
            .get_or_create_counter(&flush_delay_key(delay_minutes), |counter| {
                counter.fetch_add(1, Ordering::Relaxed)
            });
    }
}
