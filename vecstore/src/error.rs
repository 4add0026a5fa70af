use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: dimension must be positive")]
    ZeroDimension,

    #[error("vecstore: non-finite component at index {0}")]
    NonFinite(usize),
}
