use thiserror::Error;

/// Crate-wide error type.
///
/// The two `InvalidArgument*` variants are deliberately distinct so callers
/// can tell "wrong kind of value" (non-finite numerics) apart from "value
/// out of range" (non-positive parameters). Both surface at the request
/// boundary as client errors. An unreadable document is not an error at
/// all; the pipeline reports it as a `None` record.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid argument type: {0}")]
    InvalidArgumentType(String),

    #[error("invalid argument value: {0}")]
    InvalidArgumentValue(String),

    #[error("image processing error: {0}")]
    ImageProcessing(String),

    #[error("text recognition error: {0}")]
    Recognition(String),

    #[error("unknown document service: {0}")]
    UnknownService(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
