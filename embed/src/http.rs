use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::FACE_DIM;
use crate::config::ExtractorConfig;
use crate::embed::Extractor;
use crate::error::EmbedError;

const DEFAULT_URL: &str = "http://127.0.0.1:8500/v1/extract";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Model service response.
#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    vector: Option<Vec<f64>>,
}

/// HTTP extractor posting raw image bytes to a model service.
///
/// The service answers `{"vector": [...]}`, or `{"vector": null}` /
/// HTTP 422 when no face was detected.
pub struct HttpExtractor {
    client: Client,
    url: String,
    dim: usize,
}

impl HttpExtractor {
    pub fn new() -> Result<Self, EmbedError> {
        Self::with_config(ExtractorConfig::default())
    }

    pub fn with_config(cfg: ExtractorConfig) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(cfg.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| EmbedError::Api(e.to_string()))?;
        Ok(Self {
            client,
            url: if cfg.url.is_empty() {
                DEFAULT_URL.to_string()
            } else {
                cfg.url
            },
            dim: if cfg.dimension == 0 {
                FACE_DIM
            } else {
                cfg.dimension
            },
        })
    }
}

/// Convert the service's float64 output and check its length.
pub(crate) fn into_vector(values: Vec<f64>, dim: usize) -> Result<Vec<f32>, EmbedError> {
    if values.len() != dim {
        return Err(EmbedError::DimensionMismatch {
            expected: dim,
            got: values.len(),
        });
    }
    Ok(values.into_iter().map(|v| v as f32).collect())
}

#[async_trait::async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        if image.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| EmbedError::Api(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(EmbedError::NoFace);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("HTTP {status}: {body}")));
        }

        let data: ExtractResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Decode(e.to_string()))?;
        match data.vector {
            Some(v) => into_vector(v, self.dim),
            None => Err(EmbedError::NoFace),
        }
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let ex = HttpExtractor::new().unwrap();
        assert_eq!(ex.dimension(), FACE_DIM);
        assert_eq!(ex.url, DEFAULT_URL);
    }

    #[test]
    fn vector_length_is_checked() {
        assert!(matches!(
            into_vector(vec![0.0; 3], 4),
            Err(EmbedError::DimensionMismatch { expected: 4, got: 3 })
        ));
        assert_eq!(into_vector(vec![0.5, 0.25], 2).unwrap(), vec![0.5f32, 0.25]);
    }

    #[tokio::test]
    async fn empty_image_rejected() {
        let ex = HttpExtractor::new().unwrap();
        assert!(matches!(ex.extract(&[]).await, Err(EmbedError::EmptyInput)));
    }
}
