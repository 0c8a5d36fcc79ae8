/// Convenience result type used across cinepipe.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Invalid user-provided sequence, job or settings data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A job could not be initialized (missing job data or configuration).
    #[error("initialization error: {0}")]
    Initialization(String),

    /// The job references a sequence that is not present in the library.
    #[error("missing sequence: '{0}'")]
    MissingSequence(String),

    /// `initialize` was called on a pipeline instance that already ran.
    #[error("pipeline instance has already been initialized")]
    AlreadyInitialized,

    /// A collaborator broke the output-frame contract (e.g. reported an unqueued frame).
    #[error("contract violation: {0}")]
    Contract(String),

    /// The render sink or an output container failed.
    #[error("sink error: {0}")]
    Sink(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Build a [`PipelineError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PipelineError::Initialization`] value.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Build a [`PipelineError::Contract`] value.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Build a [`PipelineError::Sink`] value.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Build a [`PipelineError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for errors that must abort a run before any frame is produced.
    pub fn is_fatal_at_initialization(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_) | Self::MissingSequence(_) | Self::AlreadyInitialized
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
