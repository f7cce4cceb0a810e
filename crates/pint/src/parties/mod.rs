//! The simulated sending and receiving platforms.

mod receiving;
mod sending;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use quayside_core::{ConformanceRequest, ConformanceResponse, EngineError, API_VERSION_HEADER};

use crate::actions::PintActionType;
use crate::model::STANDARD_VERSION;

pub use receiving::{
    PintReceivingPlatform, RECEIVER_PARTY_CODE, RECEIVER_PARTY_NAME, RECEIVER_PLATFORM,
};
pub use sending::{PintSendingPlatform, SENDER_PLATFORM};

/// The fields of a prompt every handler needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptHeader {
    pub action_id: Uuid,
    pub action_type: PintActionType,
    pub target_party_name: String,
}

pub(crate) fn decode_prompt(party: &str, prompt: &Value) -> Result<PromptHeader, EngineError> {
    serde_json::from_value(prompt.clone())
        .map_err(|e| EngineError::party(party, format!("cannot decode prompt: {e}")))
}

pub(crate) fn prompt_field<T: DeserializeOwned>(
    party: &str,
    prompt: &Value,
    field: &str,
) -> Result<T, EngineError> {
    serde_json::from_value(prompt.get(field).cloned().unwrap_or(Value::Null))
        .map_err(|e| EngineError::party(party, format!("prompt field '{field}': {e}")))
}

/// A response carrying the standard's Api-Version header.
pub(crate) fn respond(
    request: &ConformanceRequest,
    status: u16,
    body: Value,
) -> ConformanceResponse {
    request
        .create_response(status)
        .with_header(API_VERSION_HEADER, STANDARD_VERSION)
        .with_body(body)
}

pub(crate) fn error_response(
    request: &ConformanceRequest,
    status: u16,
    message: &str,
) -> ConformanceResponse {
    respond(request, status, json!({ "message": message }))
}

pub(crate) fn now_rfc3339(party: &str) -> Result<String, EngineError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| EngineError::party(party, format!("cannot format timestamp: {e}")))
}
