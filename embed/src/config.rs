use std::time::Duration;

/// Builder-style configuration for extractor clients.
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    pub url: String,
    pub dimension: usize,
    pub timeout: Option<Duration>,
}

impl ExtractorConfig {
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
