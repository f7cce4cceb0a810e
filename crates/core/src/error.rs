use uuid::Uuid;

use crate::scenario::ActionState;

/// Errors raised by the scenario engine and by parties.
///
/// Protocol and state violations (`BusinessKeyMismatch`,
/// `NotAwaitingExchange`, `NotAwaitingInput`) are fatal to the scenario run
/// that raised them and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An exchange carried a business key different from the one an earlier
    /// action in the scenario established.
    #[error(
        "action '{action_path}': exchange has {key} '{actual}' \
         but the scenario expects '{expected}'"
    )]
    BusinessKeyMismatch {
        action_path: String,
        key: String,
        expected: String,
        actual: String,
    },

    /// An exchange was delivered to an action that is not waiting for one.
    #[error("action '{action_path}' received an exchange while {state}")]
    NotAwaitingExchange {
        action_path: String,
        state: ActionState,
    },

    /// Party input was delivered to an action that is not waiting for it.
    #[error("action '{action_path}' received input while {state}")]
    NotAwaitingInput {
        action_path: String,
        state: ActionState,
    },

    /// The input did not have the shape the action needs.
    #[error("action '{action_path}' rejected input: {message}")]
    UnexpectedInput {
        action_path: String,
        message: String,
    },

    /// No pending action has this id.
    #[error("Input for already handled(?) actionId {0}")]
    UnknownAction(Uuid),

    /// Persisted state could not be restored.
    #[error("cannot import state: {0}")]
    StateImport(String),

    /// A party could not carry out a prompt or answer a request.
    #[error("party '{party}': {message}")]
    Party { party: String, message: String },

    /// An outbound call made on behalf of a party failed.
    #[error("outbound call failed: {0}")]
    Outbound(String),

    /// Configuration does not fit the standard.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether the error aborts the scenario run it happened in.
    pub fn is_fatal_to_scenario(&self) -> bool {
        matches!(
            self,
            EngineError::BusinessKeyMismatch { .. }
                | EngineError::NotAwaitingExchange { .. }
                | EngineError::NotAwaitingInput { .. }
        )
    }

    pub fn party(party: &str, message: impl Into<String>) -> Self {
        EngineError::Party {
            party: party.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::StateImport(e.to_string())
    }
}
