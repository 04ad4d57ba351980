//! The aggregation engine: routes values into cells and flushes them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use metrique_timesource::TimeSource;
use tracing::{debug, error, trace};

use crate::cell::{AggregationCell, AggregationVariant};
use crate::constants::{KEY_DELIMITER, WINDOW};
use crate::rollup::RollupSelection;
use crate::{
    Accumulator, BucketAssignment, BucketKeyBuilder, BucketingPolicy, ConfigError, Measurement,
    NoopSelfMetrics, RollupConfig, SelfMetrics,
};

/// Identity of a cell.
///
/// Ordered by window first so that [`AggregationEngine::push`] emits in time order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Start of the window.
    pub window: SystemTime,
    /// Bucket key of the cell.
    pub bucket_key: String,
}

/// A shared handle on a cell.
pub type SharedCell = Arc<Mutex<AggregationCell>>;

/// Aggregates measurements into per-window digests.
///
/// Every numeric field of a measurement carrying a `rollup` tag is added to one
/// cell per bucketing policy. [`push`](Self::push) emits every cell and
/// [`reset`](Self::reset) forgets them; a scheduler is expected to call both
/// periodically, see [`crate::FlushWorker`].
///
/// The engine can be shared between threads. The cache lock only covers
/// finding or creating a cell; values are added under the cell's own lock.
/// `push` followed by `reset` is not atomic: a value added on another thread
/// after `push` has read a cell and before `reset` runs is dropped without
/// being emitted. Route adds and flushes through one thread, as
/// [`crate::FlushWorker`] does, when every value must be emitted.
///
/// ```
/// use rollup_aggregation::{AggregationEngine, BucketingPolicy, Measurement, Point};
/// use std::time::UNIX_EPOCH;
///
/// let engine = AggregationEngine::new(
///     100.0,
///     vec![BucketingPolicy::new("service").with_atom_replacement("host")],
/// );
/// engine.add(
///     &Measurement::new("http", UNIX_EPOCH)
///         .with_tag("rollup", "timer:*")
///         .with_tag("service", "api")
///         .with_tag("host", "a1")
///         .with_field("latency", 12.5),
/// );
///
/// let mut points: Vec<Point> = vec![];
/// engine.push(&mut points);
/// engine.reset();
///
/// assert_eq!(points.len(), 1);
/// assert_eq!(points[0].name, "http_latency");
/// assert_eq!(points[0].tags["bucket_key"], "http_latency_api_a1_api");
/// ```
pub struct AggregationEngine {
    compression: f64,
    policies: Vec<BucketingPolicy>,
    cache: Mutex<hashbrown::HashMap<CacheKey, SharedCell>>,
    time_source: TimeSource,
    self_metrics: Arc<dyn SelfMetrics>,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("compression", &self.compression)
            .field("policies", &self.policies)
            .field("cells", &self.len())
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    /// Create an engine. Prefer [`from_config`](Self::from_config) for
    /// configuration read from a file.
    pub fn new(compression: f64, policies: Vec<BucketingPolicy>) -> Self {
        Self {
            compression,
            policies,
            cache: Mutex::default(),
            time_source: TimeSource::default(),
            self_metrics: Arc::new(NoopSelfMetrics),
        }
    }

    /// Create an engine from a configuration, validating it first.
    pub fn from_config(config: &RollupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.compression, config.bucketing.clone()))
    }

    /// Use `time_source` for cell creation times and flush delays.
    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Report the engine's own behavior to `self_metrics`.
    pub fn with_self_metrics(mut self, self_metrics: Arc<dyn SelfMetrics>) -> Self {
        self.self_metrics = self_metrics;
        self
    }

    /// Aggregate every numeric field of a measurement.
    ///
    /// Measurements without a `rollup` tag are ignored. Values the digest
    /// rejects (NaN or infinite) are logged and skipped.
    pub fn add(&self, measurement: &Measurement) {
        let Some(selection) = RollupSelection::resolve(&measurement.tags) else {
            trace!(name = %measurement.name, "measurement has no rollup tag");
            return;
        };
        let window = window_start(measurement.timestamp);

        for (field, value) in &measurement.fields {
            let Some(value) = value.as_f64() else {
                continue;
            };
            let base_name = format!("{}{KEY_DELIMITER}{field}", measurement.name);

            for policy in &self.policies {
                let assignment = BucketKeyBuilder::build(&base_name, &selection, policy);
                let cell = self.cell(window, assignment, &selection, &base_name);
                let mut cell = cell.lock().unwrap();
                if let Err(err) = cell.add_value(value) {
                    error!(%err, %base_name, "dropping value rejected by digest");
                }
            }
        }
    }

    fn cell(
        &self,
        window: SystemTime,
        assignment: BucketAssignment,
        selection: &RollupSelection,
        base_name: &str,
    ) -> SharedCell {
        let key = CacheKey {
            window,
            bucket_key: assignment.bucket_key.clone(),
        };
        let mut cache = self.cache.lock().unwrap();
        cache
            .entry(key)
            .or_insert_with(|| {
                let variant = AggregationVariant::select(assignment.family, &selection.tags);
                let created_at = self.time_source.system_time().into();
                Arc::new(Mutex::new(AggregationCell::new(
                    assignment,
                    variant,
                    base_name,
                    self.compression,
                    window,
                    created_at,
                )))
            })
            .clone()
    }

    /// Emit every non-empty cell, in `(window, bucket_key)` order.
    ///
    /// Records each cell's flush delay with the configured [`SelfMetrics`].
    pub fn push<A: Accumulator + ?Sized>(&self, accumulator: &mut A) {
        let now: SystemTime = self.time_source.system_time().into();
        let mut cells: Vec<(CacheKey, SharedCell)> = self
            .cache
            .lock()
            .unwrap()
            .iter()
            .map(|(key, cell)| (key.clone(), cell.clone()))
            .collect();
        cells.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        debug!(cells = cells.len(), "pushing rollup cells");

        for (key, cell) in cells {
            let mut cell = cell.lock().unwrap();
            if cell.is_empty() {
                continue;
            }
            self.self_metrics
                .record_flush_delay(flush_delay_minutes(now, cell.created_at()));
            if let Err(err) = cell.emit(accumulator) {
                error!(%err, bucket_key = %key.bucket_key, "failed to emit rollup cell");
            }
        }
    }

    /// Forget every cell, including values added since the last
    /// [`push`](Self::push).
    pub fn reset(&self) {
        let mut cache = self.cache.lock().unwrap();
        debug!(cells = cache.len(), "resetting rollup cells");
        cache.clear();
    }

    /// Look up a cell, e.g. to read a [`crate::NamedAggregate`] from it.
    pub fn cell_for(&self, key: &CacheKey) -> Option<SharedCell> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Whether there are no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured compression.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// The configured policies.
    pub fn policies(&self) -> &[BucketingPolicy] {
        &self.policies
    }
}

/// Start of the window containing `timestamp`. Times before the epoch fall in
/// the first window.
pub fn window_start(timestamp: SystemTime) -> SystemTime {
    let width = WINDOW.as_secs();
    let since_epoch = timestamp
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() / width * width)
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(since_epoch)
}

/// Whole minutes between `created_at` and `now`, minus one.
pub fn flush_delay_minutes(now: SystemTime, created_at: SystemTime) -> i64 {
    let width = WINDOW.as_secs();
    let minutes = match now.duration_since(created_at) {
        Ok(elapsed) => (elapsed.as_secs() / width) as i64,
        Err(early) => -(early.duration().as_secs().div_ceil(width) as i64),
    };
    minutes - 1
}
