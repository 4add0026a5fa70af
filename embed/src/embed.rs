use crate::error::EmbedError;

/// Extractor converts a face image into a dense float32 vector.
///
/// Implementations must be safe for concurrent use (Send + Sync).
/// Callers that score with `1 − d²/4` expect unit-normalized output.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Return the embedding of the first face found in the image.
    async fn extract(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    /// Return the dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
