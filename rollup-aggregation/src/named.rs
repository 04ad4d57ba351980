//! Single statistics addressed by label.

use std::fmt;
use std::str::FromStr;

/// A statistic that can be read from an [`crate::AggregationCell`].
///
/// ```
/// use rollup_aggregation::NamedAggregate;
///
/// let p99: NamedAggregate = "p99".parse().unwrap();
/// assert_eq!(p99, NamedAggregate::P99);
/// assert_eq!(p99.quantile(), Some(0.99));
/// assert_eq!(p99.to_string(), "p99");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamedAggregate {
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Running sum of the values.
    Sum,
    /// Number of values.
    Count,
    /// 50th percentile.
    Median,
    /// 90th percentile.
    P90,
    /// 95th percentile.
    P95,
    /// 99th percentile.
    P99,
}

impl NamedAggregate {
    /// Every aggregate.
    pub const ALL: [NamedAggregate; 8] = [
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Count,
        Self::Median,
        Self::P90,
        Self::P95,
        Self::P99,
    ];

    /// The label this aggregate is parsed from and emitted as.
    pub fn label(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Median => "median",
            Self::P90 => "p90",
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }

    /// The quantile this aggregate reads from the digest, if it is one.
    pub fn quantile(self) -> Option<f64> {
        match self {
            Self::Median => Some(0.5),
            Self::P90 => Some(0.9),
            Self::P95 => Some(0.95),
            Self::P99 => Some(0.99),
            Self::Min | Self::Max | Self::Sum | Self::Count => None,
        }
    }
}

impl fmt::Display for NamedAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when parsing a label that names no aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAggregate(pub String);

impl fmt::Display for UnknownAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown aggregate `{}`", self.0)
    }
}

impl std::error::Error for UnknownAggregate {}

impl FromStr for NamedAggregate {
    type Err = UnknownAggregate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|aggregate| aggregate.label() == s)
            .ok_or_else(|| UnknownAggregate(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn labels_parse_back() {
        for aggregate in NamedAggregate::ALL {
            check!(aggregate.label().parse::<NamedAggregate>() == Ok(aggregate));
        }
        check!(let Err(UnknownAggregate(_)) = "p50".parse::<NamedAggregate>());
        check!(let Err(UnknownAggregate(_)) = "MIN".parse::<NamedAggregate>());
    }
}
