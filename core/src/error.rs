/// Errors shared by every crate of the disparity workspace.
///
/// Per-pixel failures (a disparity that does not pass validation) are not errors; they are
/// reported through the disparity image sentinel or `SparseMatch::valid`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
