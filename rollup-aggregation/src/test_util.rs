//! Capture emitted points in tests.
//!
//! This requires that the `test-util` feature be enabled.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{Accumulator, FieldValue, Point};

/// An [`Accumulator`] paired with an [`Inspector`] reading what it received.
///
/// This requires that the `test-util` feature be enabled.
pub struct TestAccumulator {
    /// Reads the captured points.
    pub inspector: Inspector,
    /// Hand this to the code under test.
    pub accumulator: Inspector,
}

/// Create a [`TestAccumulator`].
///
/// # Examples
/// ```
/// use rollup_aggregation::test_util::{TestAccumulator, tag_map, test_accumulator};
/// use rollup_aggregation::{AggregationEngine, BucketingPolicy, Measurement};
/// use std::time::UNIX_EPOCH;
///
/// let TestAccumulator { inspector, mut accumulator } = test_accumulator();
/// let engine = AggregationEngine::new(0.0, vec![BucketingPolicy::new("service")]);
/// engine.add(
///     &Measurement::new("m1", UNIX_EPOCH)
///         .with_tag("rollup", "local:*")
///         .with_tag("service", "telegraf")
///         .with_tag("host", "ubuntu")
///         .with_field("a", 9.0),
/// );
/// engine.push(&mut accumulator);
///
/// assert!(inspector.contains_tagged_fields(
///     "m1_a",
///     &[("max", 9.0.into()), ("count", 1.0.into())],
///     &tag_map(&[
///         ("host", "ubuntu"),
///         ("service", "telegraf"),
///         ("source", "ubuntu"),
///         ("atom", "MISSING_atom"),
///         ("sla.violation.atom_tag", "MISSING"),
///     ]),
/// ));
/// ```
pub fn test_accumulator() -> TestAccumulator {
    let inspector = Inspector::default();
    TestAccumulator {
        accumulator: inspector.clone(),
        inspector,
    }
}

/// Records points; clones share the same storage.
#[derive(Default, Clone, Debug)]
pub struct Inspector {
    points: Arc<Mutex<Vec<Point>>>,
}

impl Inspector {
    /// Return all the points received so far.
    ///
    /// Note: this does not drain or otherwise modify the captured points
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    /// Returns the point at a specific index
    pub fn get(&self, index: usize) -> Point {
        self.points()[index].clone()
    }

    /// Points with the given name.
    pub fn named(&self, name: &str) -> Vec<Point> {
        self.points()
            .into_iter()
            .filter(|point| point.name == name)
            .collect()
    }

    /// Whether some point named `name` has exactly `tags` and carries every
    /// field in `fields`.
    pub fn contains_tagged_fields(
        &self,
        name: &str,
        fields: &[(&str, FieldValue)],
        tags: &BTreeMap<String, String>,
    ) -> bool {
        self.named(name).iter().any(|point| {
            point.tags == *tags
                && fields
                    .iter()
                    .all(|(key, value)| point.fields.get(*key) == Some(value))
        })
    }

    /// Forget every captured point.
    pub fn clear(&self) {
        self.points.lock().unwrap().clear();
    }
}

impl Accumulator for Inspector {
    fn emit(&mut self, point: Point) {
        self.points.lock().unwrap().push(point);
    }
}

/// Build a tag map from string pairs.
pub fn tag_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
