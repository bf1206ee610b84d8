/// Shared error type used across all Atrium crates.
///
/// Variants map one-to-one onto the caller-visible error taxonomy: callers
/// inspect the variant, never the message, to decide on an HTTP status.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::StorageUnavailable(_)
                | Error::CacheUnavailable(_)
                | Error::BusUnavailable(_)
                | Error::LlmUnavailable(_)
        )
    }

    /// Generic message safe to show to end users. Dependency failures and
    /// internal errors must not leak endpoint URLs, keys, or stack detail.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { field, message } => format!("invalid {field}: {message}"),
            Error::TenantNotFound(_) => "tenant not found".into(),
            Error::Unauthorized(_) => "unauthorized".into(),
            Error::Forbidden(_) => "this operation is not allowed here".into(),
            Error::NotFound(_) => "not found".into(),
            Error::Conflict(m) => format!("conflict: {m}"),
            Error::Timeout(_) => "the operation timed out".into(),
            Error::StorageUnavailable(_)
            | Error::CacheUnavailable(_)
            | Error::BusUnavailable(_)
            | Error::LlmUnavailable(_) => "a backing service is temporarily unavailable".into(),
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                "an internal error occurred".into()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_dependency_failures() {
        assert!(Error::Timeout("t".into()).is_retryable());
        assert!(Error::LlmUnavailable("down".into()).is_retryable());
        assert!(!Error::Forbidden("nope".into()).is_retryable());
        assert!(!Error::validation("x", "bad").is_retryable());
    }

    #[test]
    fn user_message_does_not_leak_internals() {
        let err = Error::LlmUnavailable("http://10.0.0.5:11434 refused".into());
        assert!(!err.user_message().contains("10.0.0.5"));

        let err = Error::Internal("panic at executor.rs:42".into());
        assert!(!err.user_message().contains("executor.rs"));
    }
}
