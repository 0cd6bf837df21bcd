use thiserror::Error;

/// Errors surfaced at the engine boundary.
///
/// Every variant is deterministic given its inputs; an unrecognized query is
/// not an error but a successful result with `matched = false`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),
}
