#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod centroid;
mod digest;
mod error;
mod snapshot;

pub use centroid::Centroid;
pub use digest::{DEFAULT_COMPRESSION, TDigest, size_bound, temp_capacity};
pub use error::DigestError;
pub use snapshot::DigestSnapshot;
