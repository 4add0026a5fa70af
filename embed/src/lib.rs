pub mod config;
pub mod embed;
pub mod error;
pub mod http;
pub mod json;

pub use config::ExtractorConfig;
pub use embed::Extractor;
pub use error::EmbedError;
pub use http::HttpExtractor;
pub use json::JsonVectorExtractor;

/// Output dimension of the face recognition model.
pub const FACE_DIM: usize = 128;
