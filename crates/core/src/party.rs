//! Simulated protocol participants.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::EngineError;
use crate::traffic::{ConformanceRequest, ConformanceResponse};

/// Maximum number of operator log entries kept per party.
pub const MAX_OPERATOR_LOG_ENTRIES: usize = 100;

const TRUNCATION_MARKER: &str = "...";

fn in_sandbox_default() -> bool {
    true
}

/// A party taking part in a sandbox. Parties with `inSandbox` are simulated
/// here; the others are the system under test, reached through a
/// counterpart configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyConfiguration {
    pub name: String,
    pub role: String,
    #[serde(default = "in_sandbox_default")]
    pub in_sandbox: bool,
}

/// How to reach a party that runs outside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartConfiguration {
    pub name: String,
    pub role: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header_value: Option<String>,
}

/// Outbound calls a party can make while handling a prompt.
#[async_trait]
pub trait PartyOutbound: Send + Sync {
    /// Deliver a request to its target party and return the response.
    async fn send_request(
        &self,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError>;

    /// Feed input to the action with this id.
    async fn post_input(&self, action_id: Uuid, input: Value) -> Result<(), EngineError>;
}

#[async_trait]
pub trait ConformanceParty: Send + Sync {
    fn configuration(&self) -> &PartyConfiguration;

    fn name(&self) -> &str {
        &self.configuration().name
    }

    fn role(&self) -> &str {
        &self.configuration().role
    }

    fn operator_log(&self) -> Vec<String>;

    /// Forget all runtime state.
    fn reset(&mut self);

    fn export_state(&self) -> Result<Value, EngineError>;

    fn import_state(&mut self, state: &Value) -> Result<(), EngineError>;

    /// Act on one prompt of the orchestrator.
    async fn handle_prompt(
        &mut self,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError>;

    /// Answer an inbound request addressed to this party.
    async fn handle_request(
        &mut self,
        request: &ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError>;
}

/// State every party keeps regardless of standard.
#[derive(Debug, Clone)]
pub struct PartyCore {
    configuration: PartyConfiguration,
    counterpart: Option<CounterpartConfiguration>,
    operator_log: VecDeque<String>,
    handled_action_ids: BTreeSet<Uuid>,
}

impl PartyCore {
    pub fn new(
        configuration: PartyConfiguration,
        counterpart: Option<CounterpartConfiguration>,
    ) -> Self {
        Self {
            configuration,
            counterpart,
            operator_log: VecDeque::new(),
            handled_action_ids: BTreeSet::new(),
        }
    }

    pub fn configuration(&self) -> &PartyConfiguration {
        &self.configuration
    }

    pub fn counterpart(&self) -> Option<&CounterpartConfiguration> {
        self.counterpart.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.configuration.name
    }

    /// Append a line to the operator log. Once full, the oldest entries are
    /// dropped and the log starts with `...`.
    pub fn add_operator_log_entry(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::info!(party = %self.configuration.name, "{entry}");
        self.operator_log.push_back(entry);
        if self.operator_log.len() > MAX_OPERATOR_LOG_ENTRIES {
            if self.operator_log.front().map(String::as_str) == Some(TRUNCATION_MARKER) {
                self.operator_log.remove(1);
            } else {
                self.operator_log.pop_front();
                self.operator_log.pop_front();
                self.operator_log.push_front(TRUNCATION_MARKER.to_string());
            }
        }
    }

    pub fn operator_log(&self) -> Vec<String> {
        self.operator_log.iter().cloned().collect()
    }

    pub fn is_handled(&self, action_id: Uuid) -> bool {
        self.handled_action_ids.contains(&action_id)
    }

    /// Record that the prompt for `action_id` has been acted on. Returns
    /// false if it already was.
    pub fn mark_handled(&mut self, action_id: Uuid) -> bool {
        self.handled_action_ids.insert(action_id)
    }

    /// Mark the prompt handled if acting on it succeeded. A failed prompt
    /// stays unhandled, so the next notification retries it, and the
    /// failure is written to the operator log.
    pub fn record_prompt_outcome<T>(
        &mut self,
        action_id: Uuid,
        action: impl fmt::Display,
        result: &Result<T, EngineError>,
    ) {
        match result {
            Ok(_) => {
                self.mark_handled(action_id);
            }
            Err(e) => self.add_operator_log_entry(format!("Failed to handle {action}: {e}")),
        }
    }

    pub fn reset(&mut self) {
        self.operator_log.clear();
        self.handled_action_ids.clear();
    }

    /// Wrap the standard-specific `state` with the common fields.
    pub fn export(&self, state: Value) -> Value {
        json!({
            "operatorLog": self.operator_log,
            "handledActionIds": self.handled_action_ids,
            "state": state,
        })
    }

    /// Restore the common fields and return the standard-specific state.
    pub fn import(&mut self, exported: &Value) -> Result<Value, EngineError> {
        self.operator_log = serde_json::from_value(exported["operatorLog"].clone())?;
        self.handled_action_ids = serde_json::from_value(exported["handledActionIds"].clone())?;
        Ok(exported["state"].clone())
    }
}
