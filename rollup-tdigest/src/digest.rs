//! The merging t-digest.
//!
//! Values are appended to an unsorted temp buffer. When the buffer fills up, or
//! whenever a query needs an up-to-date view, the buffer is sorted and merged
//! into the main centroid list in a single ascending pass. During that pass each
//! incoming centroid is either folded into the last output centroid or starts a
//! new one, depending on how far the arcsine scale function says its quantile
//! position is from the start of the current centroid.
//!
//! Based on <https://github.com/tdunning/t-digest/blob/main/docs/t-digest-paper/histo.pdf>.

use std::f64::consts::PI;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{Centroid, DigestError, DigestSnapshot};

/// Compression used by [`TDigest::default`].
pub const DEFAULT_COMPRESSION: f64 = 100.0;

/// Upper bound on the number of merged centroids for a given compression.
pub fn size_bound(compression: f64) -> usize {
    (PI * compression / 2.0 + 0.5) as usize
}

/// Capacity of the unmerged buffer for a given compression.
///
/// This heuristic comes from Dunning's paper; 925 is the maximum of the quadratic.
pub fn temp_capacity(compression: f64) -> usize {
    let c = compression.clamp(20.0, 925.0);
    (7.5 + 0.37 * c - 2e-4 * c * c) as usize
}

fn index_estimate(compression: f64, quantile: f64) -> f64 {
    compression * ((2.0 * quantile - 1.0).asin() / PI + 0.5)
}

/// A t-digest using the merging implementation.
///
/// Not safe for concurrent use. Queries take `&mut self` because they merge
/// pending values first.
///
/// Serializes as a [`DigestSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DigestSnapshot", into = "DigestSnapshot")]
pub struct TDigest {
    compression: f64,

    // sorted by mean
    main_centroids: Vec<Centroid>,
    main_weight: f64,

    // added but not yet merged into the main list
    temp_centroids: Vec<Centroid>,
    temp_weight: f64,
    temp_capacity: usize,

    min: f64,
    max: f64,
}

impl Default for TDigest {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION)
    }
}

impl TDigest {
    /// Create an empty digest with the given compression.
    ///
    /// Lower compression uses less memory and loses precision, especially
    /// around the median. Values from 20 to 1000 are recommended.
    pub fn new(compression: f64) -> Self {
        let temp_capacity = temp_capacity(compression);
        Self {
            compression,
            main_centroids: Vec::with_capacity(size_bound(compression)),
            main_weight: 0.0,
            temp_centroids: Vec::with_capacity(temp_capacity),
            temp_weight: 0.0,
            temp_capacity,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn from_parts(
        compression: f64,
        main_centroids: Vec<Centroid>,
        min: f64,
        max: f64,
    ) -> Self {
        let mut digest = Self::new(compression);
        digest.main_weight = main_centroids.iter().map(|c| c.weight).sum();
        digest.main_centroids = main_centroids;
        digest.min = min;
        digest.max = max;
        digest
    }

    /// Add a value with the given weight.
    ///
    /// Fails without modifying the digest if the value is NaN or infinite, or if
    /// the weight isn't strictly positive and finite.
    pub fn add(&mut self, value: f64, weight: f64) -> Result<(), DigestError> {
        if !value.is_finite() {
            return Err(DigestError::InvalidValue(value));
        }
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(DigestError::InvalidWeight(weight));
        }

        if self.temp_centroids.len() >= self.temp_capacity {
            self.merge_temps();
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.temp_centroids.push(Centroid::new(value, weight));
        self.temp_weight += weight;
        Ok(())
    }

    /// Merge all pending values into the main centroid list.
    pub fn compress(&mut self) {
        self.merge_temps();
    }

    fn merge_temps(&mut self) {
        // without this the main list would be merged into itself on every query
        if self.temp_centroids.is_empty() {
            return;
        }

        self.temp_centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let total_weight = self.main_weight + self.temp_weight;
        let mut merged_weight = 0.0;
        // quantile index at which the current output centroid starts
        let mut last_merged_index = 0.0;

        let main = std::mem::replace(
            &mut self.main_centroids,
            Vec::with_capacity(size_bound(self.compression)),
        );
        let mut temps = std::mem::take(&mut self.temp_centroids);
        {
            let mut main = main.iter().copied().peekable();
            let mut temp = temps.iter().copied().peekable();
            loop {
                let next = match (main.peek(), temp.peek()) {
                    (Some(m), Some(t)) if m.mean < t.mean => main.next(),
                    (_, Some(_)) => temp.next(),
                    (Some(_), None) => main.next(),
                    (None, None) => None,
                };
                let Some(next) = next else { break };

                last_merged_index =
                    self.merge_one(merged_weight, total_weight, last_merged_index, next);
                merged_weight += next.weight;
            }
        }

        temps.clear();
        self.temp_centroids = temps;
        self.temp_weight = 0.0;
        self.main_weight = total_weight;
    }

    // Folds `next` into the last output centroid, or appends it when the index
    // estimate says the current centroid would become too wide. Returns the
    // index at which the (possibly new) last centroid starts.
    fn merge_one(
        &mut self,
        before_weight: f64,
        total_weight: f64,
        before_index: f64,
        next: Centroid,
    ) -> f64 {
        let next_index =
            index_estimate(self.compression, (before_weight + next.weight) / total_weight);

        // NaN distances merge too
        let too_far = next_index - before_index > 1.0;
        if !too_far && let Some(last) = self.main_centroids.last_mut() {
            last.absorb(next);
            return before_index;
        }

        self.main_centroids.push(next);
        index_estimate(self.compression, before_weight / total_weight)
    }

    // Each centroid is assumed to cover a uniform distribution whose upper bound
    // is the midpoint to the next centroid, or the maximum for the last one.
    // The lower bound is the previous centroid's upper bound, or the minimum.
    fn centroid_upper_bound(&self, i: usize) -> f64 {
        match self.main_centroids.get(i + 1) {
            Some(next) => (next.mean + self.main_centroids[i].mean) / 2.0,
            None => self.max,
        }
    }

    /// Returns the approximate fraction of added weight below `value`.
    ///
    /// Returns NaN if the digest is empty.
    pub fn cdf(&mut self, value: f64) -> f64 {
        self.merge_temps();

        if self.main_centroids.is_empty() {
            return f64::NAN;
        }
        if value <= self.min {
            return 0.0;
        }
        if value >= self.max {
            return 1.0;
        }

        let mut weight_so_far = 0.0;
        let mut lower_bound = self.min;
        for (i, c) in self.main_centroids.iter().enumerate() {
            let upper_bound = self.centroid_upper_bound(i);
            if value < upper_bound {
                weight_so_far += c.weight * (value - lower_bound) / (upper_bound - lower_bound);
                return weight_so_far / self.main_weight;
            }
            weight_so_far += c.weight;
            lower_bound = upper_bound;
        }

        // unreachable since value < max and the last upper bound is max
        f64::NAN
    }

    /// Returns a value such that approximately `quantile` of the added weight is
    /// below it.
    ///
    /// Fails if `quantile` is outside of `[0, 1]`. Returns NaN if the digest is
    /// empty. `quantile(0.0)` is the minimum and `quantile(1.0)` the maximum.
    pub fn quantile(&mut self, quantile: f64) -> Result<f64, DigestError> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(DigestError::QuantileOutOfRange(quantile));
        }
        self.merge_temps();
        if self.main_centroids.is_empty() {
            return Ok(f64::NAN);
        }
        if quantile == 1.0 {
            return Ok(self.max);
        }

        let q = quantile * self.main_weight;
        let mut weight_so_far = 0.0;
        let mut lower_bound = self.min;
        for (i, c) in self.main_centroids.iter().enumerate() {
            let upper_bound = self.centroid_upper_bound(i);
            if q <= weight_so_far + c.weight {
                let proportion = (q - weight_so_far) / c.weight;
                return Ok(lower_bound + proportion * (upper_bound - lower_bound));
            }
            weight_so_far += c.weight;
            lower_bound = upper_bound;
        }

        // the running sum can drift below main_weight with fractional weights
        Ok(self.max)
    }

    /// Merge another digest into this one.
    ///
    /// The other digest's merged centroids are visited in random order so that
    /// ingestion order doesn't bias the result.
    pub fn merge(&mut self, other: &TDigest) -> Result<(), DigestError> {
        self.merge_with_rng(other, &mut rand::rng())
    }

    /// Like [`TDigest::merge`], shuffling with the provided random number generator.
    pub fn merge_with_rng<R: Rng + ?Sized>(
        &mut self,
        other: &TDigest,
        rng: &mut R,
    ) -> Result<(), DigestError> {
        let mut shuffled: Vec<usize> = (0..other.main_centroids.len()).collect();
        shuffled.shuffle(rng);

        for i in shuffled {
            let c = other.main_centroids[i];
            self.add(c.mean, c.weight)?;
        }
        // unsorted already, no need to shuffle
        for c in &other.temp_centroids {
            self.add(c.mean, c.weight)?;
        }

        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        Ok(())
    }

    /// Smallest value ever added, or +∞ if empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value ever added, or -∞ if empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Total weight added, merged or not.
    pub fn count(&self) -> f64 {
        self.main_weight + self.temp_weight
    }

    /// Whether nothing has been added yet.
    pub fn is_empty(&self) -> bool {
        self.main_centroids.is_empty() && self.temp_centroids.is_empty()
    }

    /// The compression this digest was created with.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// The merged centroid list, sorted by mean. Merges pending values first.
    pub fn centroids(&mut self) -> &[Centroid] {
        self.merge_temps();
        &self.main_centroids
    }
}
