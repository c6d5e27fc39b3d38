/// Shared error type used across all sage crates.
///
/// Every variant carries a human-readable `message`; most also carry a
/// `details` bag for structured context that a JSON-RPC response can surface
/// as `error.data`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration: {message}")]
    Configuration {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("validation: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("database connection: {message}")]
    DatabaseConnection {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("embedding service: {message}")]
    EmbeddingService {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("circuit breaker '{name}' is open")]
    BreakerOpen {
        name: String,
        details: Option<serde_json::Value>,
    },

    #[error("memory limit exceeded: {message}")]
    MemoryLimitExceeded {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("async runtime: {message}")]
    AsyncRuntime {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("timeout: {message}")]
    Timeout {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("platform compatibility: {message}")]
    PlatformCompatibility {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn database_connection(message: impl Into<String>) -> Self {
        Error::DatabaseConnection {
            message: message.into(),
            details: None,
        }
    }

    pub fn embedding_service(message: impl Into<String>) -> Self {
        Error::EmbeddingService {
            message: message.into(),
            details: None,
        }
    }

    pub fn breaker_open(name: impl Into<String>) -> Self {
        Error::BreakerOpen {
            name: name.into(),
            details: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
            details: None,
        }
    }

    /// The JSON-RPC error code this error kind maps to, per §6.1.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            Error::Validation { .. } => -32602,
            Error::BreakerOpen { .. } => -32603,
            _ => -32603,
        }
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Configuration { details, .. }
            | Error::Validation { details, .. }
            | Error::DatabaseConnection { details, .. }
            | Error::EmbeddingService { details, .. }
            | Error::BreakerOpen { details, .. }
            | Error::MemoryLimitExceeded { details, .. }
            | Error::AsyncRuntime { details, .. }
            | Error::Timeout { details, .. }
            | Error::PlatformCompatibility { details, .. } => details.as_ref(),
            Error::Io(_) | Error::Json(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_invalid_params() {
        let e = Error::validation("bad input");
        assert_eq!(e.json_rpc_code(), -32602);
    }

    #[test]
    fn other_kinds_map_to_internal_error() {
        let e = Error::database_connection("pool exhausted");
        assert_eq!(e.json_rpc_code(), -32603);
    }
}
