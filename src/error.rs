// for error definitions
use redis;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Invalid parameters at limiter construction (non-positive capacity,
    /// rate, window or limit). Never raised at decision time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A call was made with a cost it can never accept: zero for any
    /// decision, or above the concurrency bound for a blocking acquire
    #[error("Invalid cost: {0}")]
    InvalidCost(u64),

    /// Errors related to the shared store backing distributed limiters
    #[error("Store error: {0}")]
    Store(StoreError),

    /// A tier used in composition does not support giving units back
    #[error("Rollback not supported by this limiter")]
    RollbackUnsupported,

    /// A tier rollback itself failed; decision atomicity of the composed
    /// call can no longer be guaranteed
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Store-specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command or script errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// An atomic procedure returned a reply the caller could not decode
    #[error("Unexpected procedure reply: {0}")]
    UnexpectedReply(String),
}

// Implement conversions from redis::RedisError to StoreError
impl From<redis::RedisError> for ThrottleError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                // authentication errors
                ThrottleError::Store(StoreError::RedisAuth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                // Connection-related errors
                ThrottleError::Store(StoreError::RedisConnection(err.to_string()))
            }
            _ => {
                // Command/operation related errors
                ThrottleError::Store(StoreError::RedisCommand(err.to_string()))
            }
        }
    }
}

// implement conversions from serde_json::Error to ThrottleError
impl From<serde_json::Error> for ThrottleError {
    fn from(err: serde_json::Error) -> Self {
        ThrottleError::Store(StoreError::Serialization(err.to_string()))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, ThrottleError>;
