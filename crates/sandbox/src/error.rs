use quayside_core::EngineError;
use quayside_storage::StorageError;

/// Errors of the sandbox entry points.
///
/// Storage and transport failures are infrastructure errors. They are
/// returned to the caller and logged, and never appear in a conformance
/// report.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("unknown sandbox '{0}'")]
    UnknownSandbox(String),

    #[error("sandbox '{sandbox_id}' has no party named '{party}'")]
    UnknownParty { sandbox_id: String, party: String },

    #[error("sandbox '{0}' has no running session")]
    NotRunning(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// HTTP status to answer with when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self {
            SandboxError::Storage(StorageError::ItemIsLocked { .. })
            | SandboxError::Storage(StorageError::RetriesExhausted { .. }) => 503,
            SandboxError::Storage(_) => 500,
            SandboxError::Engine(e) => match e {
                EngineError::UnknownAction(_) => 404,
                EngineError::UnexpectedInput { .. } | EngineError::Configuration(_) => 400,
                EngineError::BusinessKeyMismatch { .. }
                | EngineError::NotAwaitingExchange { .. }
                | EngineError::NotAwaitingInput { .. } => 409,
                EngineError::StateImport(_)
                | EngineError::Party { .. }
                | EngineError::Outbound(_) => 500,
            },
            SandboxError::UnknownSandbox(_) | SandboxError::UnknownParty { .. } => 404,
            SandboxError::NotRunning(_) => 409,
            SandboxError::InvalidRequest(_) => 400,
            SandboxError::Transport { .. } | SandboxError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for SandboxError {
    fn from(e: serde_json::Error) -> Self {
        SandboxError::Storage(StorageError::from(e))
    }
}
