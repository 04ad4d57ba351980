//! Destination for emitted points.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::FieldValue;

/// A point emitted by [`crate::AggregationEngine::push`].
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name joined with the field name.
    pub name: String,
    /// Emitted fields; which ones depends on the aggregation variant.
    pub fields: BTreeMap<String, FieldValue>,
    /// Resolved output tags.
    pub tags: BTreeMap<String, String>,
    /// Window start for windowed aggregations. `None` means "now".
    pub timestamp: Option<SystemTime>,
}

/// Receives the points produced when the engine is pushed.
pub trait Accumulator {
    /// Accept one point.
    fn emit(&mut self, point: Point);
}

impl Accumulator for Vec<Point> {
    fn emit(&mut self, point: Point) {
        self.push(point);
    }
}

impl<A: Accumulator + ?Sized> Accumulator for &mut A {
    fn emit(&mut self, point: Point) {
        (**self).emit(point);
    }
}

impl<A: Accumulator + ?Sized> Accumulator for Box<A> {
    fn emit(&mut self, point: Point) {
        (**self).emit(point);
    }
}
