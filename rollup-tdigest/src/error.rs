use std::fmt;

/// The error cases for operations on a [`crate::TDigest`].
#[derive(Debug)]
pub enum DigestError {
    /// A NaN or infinite value was added.
    InvalidValue(f64),
    /// A weight that is not strictly positive and finite was added.
    InvalidWeight(f64),
    /// A quantile outside of `[0, 1]` was requested.
    QuantileOutOfRange(f64),
    /// A snapshot couldn't be encoded or decoded.
    Codec(bincode::Error),
    /// A decoded snapshot doesn't describe a valid digest.
    CorruptSnapshot(&'static str),
}

impl fmt::Display for DigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(value) => write!(f, "invalid value added to digest: {value}"),
            Self::InvalidWeight(weight) => write!(f, "invalid weight added to digest: {weight}"),
            Self::QuantileOutOfRange(q) => write!(f, "quantile {q} is outside of [0, 1]"),
            Self::Codec(err) => write!(f, "digest snapshot codec failed: {err}"),
            Self::CorruptSnapshot(reason) => write!(f, "corrupt digest snapshot: {reason}"),
        }
    }
}

impl std::error::Error for DigestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<bincode::Error> for DigestError {
    fn from(value: bincode::Error) -> Self {
        Self::Codec(value)
    }
}
