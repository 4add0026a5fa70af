use crate::error::VecError;

/// Match is a single result from a nearest-neighbor search.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Identifier of the matched vector.
    pub id: String,

    /// Squared Euclidean distance between the query and the matched vector.
    /// Lower values indicate higher similarity.
    pub distance: f32,
}

/// VecIndex is the interface for nearest-neighbor search over dense float32
/// vectors under squared Euclidean distance.
///
/// Implementations are owned values built per query cycle. An approximate or
/// incremental index can implement the same trait.
pub trait VecIndex {
    /// Add or replace a vector with the given ID.
    fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), VecError>;

    /// Return the top-k nearest vectors to the query, ordered by ascending
    /// distance (closest first). Ties keep insertion order.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Match>, VecError>;

    /// Return the single nearest vector, or `None` if the index is empty.
    fn nearest(&self, query: &[f32]) -> Result<Option<Match>, VecError> {
        Ok(self.search(query, 1)?.into_iter().next())
    }

    /// Return the dimension every vector in the index must have.
    fn dim(&self) -> usize;

    /// Return the number of vectors in the index.
    fn len(&self) -> usize;

    /// Return true if the index contains no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
