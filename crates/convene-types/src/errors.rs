//! Error types for the Convene core

/// Errors surfaced by the Convene core.
///
/// Transient store contention is retried inside the store layer and never
/// reaches callers; everything here is a terminal answer to the request.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("validation failed at `{path}`: {reason}")]
    Validation { path: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rankings already submitted for this election")]
    DuplicateVote,

    #[error("participant has already completed the experiment")]
    ParticipantCompleted,

    #[error("incomplete dependency: {0}")]
    IncompleteDependency(String),

    #[error("structural error: {0}")]
    Structural(String),

    #[error("caller is not an experimenter")]
    NotExperimenter,

    #[error("store error: {0}")]
    Store(String),
}

impl StudyError {
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Result type alias for core operations.
pub type StudyResult<T> = Result<T, StudyError>;
