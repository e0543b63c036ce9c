/// Error types for shared infrastructure (key-value slots, Redis).
///
/// Callers that are required to degrade gracefully log these and carry on.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("slot i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
