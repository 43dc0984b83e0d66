use thiserror::Error;

/// Errors returned synchronously when an element is configured.
///
/// Nothing is applied when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An element with the same key is already active
    #[error("An element with key '{key}' already exists")]
    DuplicateKey { key: String },

    /// Line based elements need at least one line
    #[error("Element '{key}' has no lines")]
    EmptyLines { key: String },

    /// Automatic updates must run at least once per tick
    #[error("Element '{key}' has invalid update interval {interval}, must be at least 1 tick")]
    InvalidInterval { key: String, interval: u32 },

    /// Visibility thresholds must be finite and the distance positive
    #[error("Actor '{key}' has invalid visibility thresholds: {reason}")]
    InvalidThreshold { key: String, reason: &'static str },

    /// The roster is full
    #[error("Server is full ({max_clients} clients)")]
    ServerFull { max_clients: usize },
}

/// Violations of the engine's own invariants caused by caller supplied data.
///
/// These fail one element's cycle and leave its retained state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A tablist provider returned two groups with the same identifier
    #[error("Group identifier '{identifier}' is used more than once")]
    DuplicateGroupIdentifier { identifier: String },

    /// A content provider changed the number of lines
    #[error("Element '{key}' expected {expected} lines but the provider returned {actual}")]
    LineCountMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// The requested element does not exist
    #[error("No element with key '{key}'")]
    UnknownElement { key: String },
}

/// Crate level error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A caller supplied content provider failed; the cycle was skipped
    #[error("Content provider for '{key}' failed: {message}")]
    Provider { key: String, message: String },

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl DisplayError {
    pub fn provider(key: impl Into<String>, source: &dyn std::error::Error) -> Self {
        DisplayError::Provider {
            key: key.into(),
            message: source.to_string(),
        }
    }
}

/// Error type content providers may return.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Result type content providers return.
pub type ProviderResult<T> = Result<T, ProviderError>;
