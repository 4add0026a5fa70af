use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: no face detected")]
    NoFace,

    #[error("embed: API error: {0}")]
    Api(String),

    #[error("embed: decode error: {0}")]
    Decode(String),

    #[error("embed: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
