//! Engine configuration.
//!
//! ```
//! use rollup_aggregation::RollupConfig;
//!
//! let config = RollupConfig::from_toml_str(r#"
//!     compression = 50.0
//!
//!     [[bucketing]]
//!     source_tag_key = "service"
//!     atom_replacement_tag_key = "host"
//!
//!     [[bucketing]]
//!     source_tag_key = "service"
//!     exclude_tags = ["host"]
//! "#).unwrap();
//!
//! assert_eq!(config.compression, 50.0);
//! assert_eq!(config.bucketing.len(), 2);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BucketingPolicy;

fn default_compression() -> f64 {
    rollup_tdigest::DEFAULT_COMPRESSION
}

/// Configuration of an [`crate::AggregationEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollupConfig {
    /// Digest compression of every cell.
    #[serde(default = "default_compression")]
    pub compression: f64,
    /// Policies applied to every value, independently of each other.
    #[serde(default)]
    pub bucketing: Vec<BucketingPolicy>,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            compression: default_compression(),
            bucketing: Vec::new(),
        }
    }
}

impl RollupConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a usable engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.compression.is_finite() || self.compression < 0.0 {
            return Err(ConfigError::InvalidCompression(self.compression));
        }
        if self.bucketing.is_empty() {
            return Err(ConfigError::NoBucketingPolicy);
        }
        if let Some(index) = self
            .bucketing
            .iter()
            .position(|policy| policy.source_tag_key.is_empty())
        {
            return Err(ConfigError::EmptySourceTagKey { index });
        }
        Ok(())
    }
}

/// Error returned when a [`RollupConfig`] can't be used.
#[derive(Debug)]
pub enum ConfigError {
    /// The document isn't valid TOML, or doesn't match the expected shape.
    Parse(toml::de::Error),
    /// Compression is negative, NaN or infinite.
    InvalidCompression(f64),
    /// No bucketing policy was configured.
    NoBucketingPolicy,
    /// A bucketing policy has an empty `source_tag_key`.
    EmptySourceTagKey {
        /// Position of the policy in `bucketing`.
        index: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid rollup configuration: {err}"),
            Self::InvalidCompression(c) => {
                write!(f, "compression must be finite and non-negative, got {c}")
            }
            Self::NoBucketingPolicy => write!(f, "at least one bucketing policy is required"),
            Self::EmptySourceTagKey { index } => {
                write!(f, "bucketing policy {index} has an empty source_tag_key")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let config = RollupConfig::from_toml_str(
            r#"
            [[bucketing]]
            source_tag_key = "service"
            "#,
        )
        .unwrap();
        check!(config.compression == 100.0);
        check!(config.bucketing == [BucketingPolicy::new("service")]);
    }

    #[test]
    fn full_policy() {
        let config = RollupConfig::from_toml_str(
            r#"
            compression = 0.0
            [[bucketing]]
            source_tag_key = "namespace"
            atom_replacement_tag_key = "replicaHash"
            exclude_tags = ["az", "env"]
            "#,
        )
        .unwrap();
        check!(config.compression == 0.0);
        check!(
            config.bucketing
                == [BucketingPolicy::new("namespace")
                    .with_atom_replacement("replicaHash")
                    .excluding("az")
                    .excluding("env")]
        );
    }

    #[rstest]
    #[case("compression = -1.0\n[[bucketing]]\nsource_tag_key = \"s\"")]
    #[case("compression = nan\n[[bucketing]]\nsource_tag_key = \"s\"")]
    #[case("compression = inf\n[[bucketing]]\nsource_tag_key = \"s\"")]
    fn rejects_bad_compression(#[case] document: &str) {
        check!(let Err(ConfigError::InvalidCompression(_)) = RollupConfig::from_toml_str(document));
    }

    #[test]
    fn rejects_missing_policies() {
        check!(let Err(ConfigError::NoBucketingPolicy) = RollupConfig::from_toml_str(""));
        check!(let Err(ConfigError::EmptySourceTagKey { index: 1 }) = RollupConfig::from_toml_str(
            "[[bucketing]]\nsource_tag_key = \"a\"\n[[bucketing]]\nsource_tag_key = \"\"",
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        check!(let Err(ConfigError::Parse(_)) = RollupConfig::from_toml_str(
            "[[bucketing]]\nsource_tag_key = \"a\"\nexclude = [\"b\"]",
        ));
        check!(let Err(ConfigError::Parse(_)) = RollupConfig::from_toml_str("compresion = 1.0"));
    }
}
