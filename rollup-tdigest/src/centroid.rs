use serde::{Deserialize, Serialize};

/// A weighted point approximating a cluster of nearby values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// Mean of the values folded into this centroid.
    pub mean: f64,
    /// Total weight of the values folded into this centroid.
    pub weight: f64,
}

impl Centroid {
    /// Create a centroid from a mean and a weight.
    pub const fn new(mean: f64, weight: f64) -> Self {
        Self { mean, weight }
    }

    // Welford-style update: weight first, then mean. The new mean stays
    // between the two inputs even when the update rounds past them.
    pub(crate) fn absorb(&mut self, other: Centroid) {
        let (low, high) = (self.mean.min(other.mean), self.mean.max(other.mean));
        self.weight += other.weight;
        self.mean += (other.mean - self.mean) * other.weight / self.weight;
        self.mean = self.mean.max(low).min(high);
    }
}
