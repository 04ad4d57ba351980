use serde::{Deserialize, Serialize};

use crate::{Centroid, DigestError, TDigest};

/// The serialized form of a [`TDigest`].
///
/// Field order is part of the wire format: the merged centroid list, then the
/// compression, the minimum and the maximum. Pending values are merged before a
/// snapshot is taken, so it never carries an unmerged buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSnapshot {
    /// Merged centroids, sorted by mean.
    pub centroids: Vec<Centroid>,
    /// Compression of the digest.
    pub compression: f64,
    /// Smallest value added, +∞ for an empty digest.
    pub min: f64,
    /// Largest value added, -∞ for an empty digest.
    pub max: f64,
}

impl TDigest {
    /// Merge pending values and capture the digest's state.
    pub fn snapshot(&mut self) -> DigestSnapshot {
        let centroids = self.centroids().to_vec();
        DigestSnapshot {
            centroids,
            compression: self.compression(),
            min: self.min(),
            max: self.max(),
        }
    }

    /// Rebuild a digest from a snapshot.
    ///
    /// The total weight is recomputed from the centroids, and centroids are
    /// re-sorted in case the producer didn't sort them.
    pub fn from_snapshot(snapshot: DigestSnapshot) -> Result<Self, DigestError> {
        let DigestSnapshot {
            mut centroids,
            compression,
            min,
            max,
        } = snapshot;

        if !compression.is_finite() || compression < 0.0 {
            return Err(DigestError::CorruptSnapshot("compression must be finite and non-negative"));
        }
        if centroids
            .iter()
            .any(|c| !c.mean.is_finite() || !(c.weight > 0.0 && c.weight.is_finite()))
        {
            return Err(DigestError::CorruptSnapshot("centroid mean or weight is invalid"));
        }

        if centroids.is_empty() {
            return Ok(Self::new(compression));
        }
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(DigestError::CorruptSnapshot("min and max must be finite and ordered"));
        }

        centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        let bounded = match (centroids.first(), centroids.last()) {
            (Some(first), Some(last)) => first.mean >= min && last.mean <= max,
            _ => true,
        };
        if !bounded {
            return Err(DigestError::CorruptSnapshot("min and max must bound the centroids"));
        }
        Ok(Self::from_parts(compression, centroids, min, max))
    }

    /// Encode the digest into its binary snapshot form.
    pub fn encode(&mut self) -> Result<Vec<u8>, DigestError> {
        Ok(bincode::serialize(&self.snapshot())?)
    }

    /// Decode a digest produced by [`TDigest::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DigestError> {
        let snapshot: DigestSnapshot = bincode::deserialize(bytes)?;
        Self::from_snapshot(snapshot)
    }
}

impl TryFrom<DigestSnapshot> for TDigest {
    type Error = DigestError;

    fn try_from(value: DigestSnapshot) -> Result<Self, Self::Error> {
        Self::from_snapshot(value)
    }
}

impl From<TDigest> for DigestSnapshot {
    fn from(mut value: TDigest) -> Self {
        value.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        check!(let Err(DigestError::Codec(_)) = TDigest::decode(&[1, 2, 3]));
    }

    #[test]
    fn decode_sorts_and_recomputes_weight() {
        let snapshot = DigestSnapshot {
            centroids: vec![Centroid::new(3.0, 2.0), Centroid::new(1.0, 1.0)],
            compression: 100.0,
            min: 1.0,
            max: 3.0,
        };
        let bytes = bincode::serialize(&snapshot).unwrap();
        let mut digest = TDigest::decode(&bytes).unwrap();
        check!(digest.count() == 3.0);
        check!(digest.centroids() == [Centroid::new(1.0, 1.0), Centroid::new(3.0, 2.0)]);
    }

    #[test]
    fn decode_rejects_invalid_centroids() {
        let snapshot = DigestSnapshot {
            centroids: vec![Centroid::new(f64::NAN, 1.0)],
            compression: 100.0,
            min: 1.0,
            max: 3.0,
        };
        check!(let Err(DigestError::CorruptSnapshot(_)) = TDigest::from_snapshot(snapshot.clone()));

        let snapshot = DigestSnapshot {
            centroids: vec![Centroid::new(1.0, 0.0)],
            ..snapshot
        };
        check!(let Err(DigestError::CorruptSnapshot(_)) = TDigest::from_snapshot(snapshot));
    }

    #[test]
    fn decode_rejects_centroids_outside_min_max() {
        let snapshot = DigestSnapshot {
            centroids: vec![Centroid::new(100.0, 1.0)],
            compression: 100.0,
            min: 1.0,
            max: 1.0,
        };
        let bytes = bincode::serialize(&snapshot).unwrap();
        check!(let Err(DigestError::CorruptSnapshot(_)) = TDigest::decode(&bytes));

        let snapshot = DigestSnapshot {
            centroids: vec![Centroid::new(5.0, 1.0), Centroid::new(-3.0, 2.0)],
            compression: 100.0,
            min: 0.0,
            max: 10.0,
        };
        check!(let Err(DigestError::CorruptSnapshot(_)) = TDigest::from_snapshot(snapshot.clone()));

        let snapshot = DigestSnapshot {
            min: -3.0,
            max: 5.0,
            ..snapshot
        };
        let mut digest = TDigest::from_snapshot(snapshot).unwrap();
        check!(digest.quantile(1.0).unwrap() == 5.0);
    }

    #[test]
    fn empty_digest_round_trips() {
        let mut digest = TDigest::new(42.0);
        let mut restored = TDigest::decode(&digest.encode().unwrap()).unwrap();
        check!(restored.is_empty());
        check!(restored.compression() == 42.0);
        check!(restored.min() == f64::INFINITY);
        check!(restored.max() == f64::NEG_INFINITY);
        check!(restored.quantile(0.5).unwrap().is_nan());
    }

    #[test]
    fn wire_layout_is_centroids_then_scalars() {
        let mut digest = TDigest::new(50.0);
        digest.add(2.0, 1.0).unwrap();
        let bytes = digest.encode().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        expected.extend_from_slice(&50.0f64.to_le_bytes());
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        check!(bytes == expected);
    }

    #[test]
    fn serde_goes_through_snapshot() {
        let mut digest = TDigest::new(100.0);
        for v in [5.0, 1.0, 9.0] {
            digest.add(v, 1.0).unwrap();
        }
        let bytes = bincode::serialize(&digest).unwrap();
        check!(bytes == digest.encode().unwrap());
        let restored: TDigest = bincode::deserialize(&bytes).unwrap();
        check!(restored.count() == 3.0);
    }
}
