use serde::Deserialize;

use crate::FACE_DIM;
use crate::embed::Extractor;
use crate::error::EmbedError;
use crate::http::into_vector;

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorDoc {
    Bare(Vec<f64>),
    Wrapped { vector: Vec<f64> },
}

/// Extractor for inputs that already are embeddings: a JSON array of floats
/// or an object with a `vector` field. Used when vectors come from an
/// offline extraction run.
pub struct JsonVectorExtractor {
    dim: usize,
}

impl JsonVectorExtractor {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: if dim == 0 { FACE_DIM } else { dim },
        }
    }
}

impl Default for JsonVectorExtractor {
    fn default() -> Self {
        Self::new(FACE_DIM)
    }
}

#[async_trait::async_trait]
impl Extractor for JsonVectorExtractor {
    async fn extract(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        if image.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let doc: VectorDoc =
            serde_json::from_slice(image).map_err(|e| EmbedError::Decode(e.to_string()))?;
        let values = match doc {
            VectorDoc::Bare(v) => v,
            VectorDoc::Wrapped { vector } => vector,
        };
        into_vector(values, self.dim)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bare_and_wrapped() {
        let ex = JsonVectorExtractor::new(3);
        assert_eq!(ex.extract(b"[1, 0, 0]").await.unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(
            ex.extract(br#"{"vector": [0, 1, 0], "label": 7}"#).await.unwrap(),
            vec![0.0, 1.0, 0.0]
        );
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let ex = JsonVectorExtractor::new(3);
        assert!(matches!(ex.extract(b"").await, Err(EmbedError::EmptyInput)));
        assert!(matches!(ex.extract(b"nope").await, Err(EmbedError::Decode(_))));
        assert!(matches!(
            ex.extract(b"[1, 2]").await,
            Err(EmbedError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }
}
