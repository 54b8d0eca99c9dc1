/// Errors surfaced by the index.
///
/// "Not found" is deliberately not a variant: lookups for unknown IDs, URLs
/// or terms return `Option`/empty collections instead. `Inconsistent` marks
/// cross-structure corruption (a forward entry without its posting and the
/// like) and is never expected during correct operation.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("inconsistent index: {0}")]
    Inconsistent(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
