//! Exact nearest-neighbor search over dense float32 vectors.
//!
//! The index is a plain value: callers build a fresh [`FlatIndex`] from the
//! current reference set, query it, and drop it. There is no incremental
//! maintenance and no shared state between builds.

pub mod error;
pub mod flat;
pub mod l2;
pub mod vecstore;

pub use error::VecError;
pub use flat::FlatIndex;
pub use l2::{l2_normalize, similarity, squared_l2};
pub use vecstore::{Match, VecIndex};
