//! Error types for the quick timer engine.

/// Top-level error type for scheduling, caching and host binding.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// Nothing usable to schedule (no targets, no commands, no identity).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A request failed client-side validation before submission.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend rejected a schedule/cancel/preferences request.
    #[error("submission error: {0}")]
    Submission(String),

    /// Channel send/receive error between client and backend.
    #[error("channel error: {0}")]
    Channel(String),

    /// Config file parse or serialization error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimerError {
    /// Whether this error came from talking to the backend, as opposed to
    /// being caught locally before any request left the client.
    #[must_use]
    pub fn is_submission_failure(&self) -> bool {
        matches!(self, Self::Submission(_) | Self::Channel(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TimerError>;
