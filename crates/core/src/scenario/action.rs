//! The action state machine.
//!
//! An action is one step of a scenario: a party sends a request, or an
//! operator supplies out-of-band parameters. Every action owns an
//! [`ActionCore`] with its identity, lifecycle state and context layer; the
//! [`ConformanceAction`] trait adds the per-standard behavior on top.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::context::ContextLayer;
use crate::check::ConformanceCheck;
use crate::error::EngineError;
use crate::traffic::ConformanceExchange;

// ── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Pending,
    AwaitingInput,
    AwaitingExchange,
    Satisfied,
    Checked,
}

impl ActionState {
    pub fn is_done(self) -> bool {
        matches!(self, ActionState::Satisfied | ActionState::Checked)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionState::Pending => "PENDING",
            ActionState::AwaitingInput => "AWAITING_INPUT",
            ActionState::AwaitingExchange => "AWAITING_EXCHANGE",
            ActionState::Satisfied => "SATISFIED",
            ActionState::Checked => "CHECKED",
        };
        f.write_str(name)
    }
}

/// What an action needs before it is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub requires_input: bool,
    pub awaits_exchange: bool,
    pub expects_notification: bool,
}

impl Capabilities {
    pub const INPUT: Capabilities = Capabilities {
        requires_input: true,
        awaits_exchange: false,
        expects_notification: false,
    };

    pub const EXCHANGE: Capabilities = Capabilities {
        requires_input: false,
        awaits_exchange: true,
        expects_notification: false,
    };

    pub const EXCHANGE_WITH_NOTIFICATION: Capabilities = Capabilities {
        requires_input: false,
        awaits_exchange: true,
        expects_notification: true,
    };

    /// An action that only nudges a party and is done as soon as it is
    /// reached.
    pub const NONE: Capabilities = Capabilities {
        requires_input: false,
        awaits_exchange: false,
        expects_notification: false,
    };

    fn awaiting_state(self) -> ActionState {
        if self.requires_input {
            ActionState::AwaitingInput
        } else if self.awaits_exchange {
            ActionState::AwaitingExchange
        } else {
            ActionState::Satisfied
        }
    }
}

/// A named business identifier carried by an exchange, such as a document
/// reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessKey {
    pub name: &'static str,
    pub value: String,
}

// ── Shared action data ──────────────────────────────────────────────────────

pub struct ActionCore<C> {
    id: Uuid,
    source_party_name: String,
    target_party_name: String,
    title: String,
    action_path: String,
    capabilities: Capabilities,
    state: ActionState,
    matched_exchange_uuid: Option<Uuid>,
    matched_notification_exchange_uuid: Option<Uuid>,
    layer: C,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedAction<C> {
    id: Uuid,
    state: ActionState,
    matched_exchange_uuid: Option<Uuid>,
    matched_notification_exchange_uuid: Option<Uuid>,
    context: C,
    #[serde(default)]
    extra: Value,
}

impl<C: ContextLayer> ActionCore<C> {
    pub fn new(
        previous: Option<&ActionCore<C>>,
        title: impl Into<String>,
        source_party_name: &str,
        target_party_name: &str,
        capabilities: Capabilities,
    ) -> Self {
        let title = title.into();
        let action_path = match previous {
            Some(prev) => format!("{} - {}", prev.action_path, title),
            None => title.clone(),
        };
        Self {
            id: Uuid::new_v4(),
            source_party_name: source_party_name.to_string(),
            target_party_name: target_party_name.to_string(),
            title,
            action_path,
            capabilities,
            state: ActionState::Pending,
            matched_exchange_uuid: None,
            matched_notification_exchange_uuid: None,
            layer: C::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn action_path(&self) -> &str {
        &self.action_path
    }

    pub fn source_party_name(&self) -> &str {
        &self.source_party_name
    }

    pub fn target_party_name(&self) -> &str {
        &self.target_party_name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn matched_exchange_uuid(&self) -> Option<Uuid> {
        self.matched_exchange_uuid
    }

    pub fn matched_notification_exchange_uuid(&self) -> Option<Uuid> {
        self.matched_notification_exchange_uuid
    }

    pub fn layer(&self) -> &C {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut C {
        &mut self.layer
    }

    /// Called when the action becomes the head of its scenario.
    pub fn activate(&mut self) {
        if self.state == ActionState::Pending {
            self.state = self.capabilities.awaiting_state();
        }
    }

    pub(crate) fn mark_checked(&mut self) {
        if self.state == ActionState::Satisfied {
            self.state = ActionState::Checked;
        }
    }

    fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.state = ActionState::Pending;
        self.matched_exchange_uuid = None;
        self.matched_notification_exchange_uuid = None;
        self.layer = C::default();
    }

    fn export(&self, extra: Value) -> Result<Value, EngineError> {
        let exported = ExportedAction {
            id: self.id,
            state: self.state,
            matched_exchange_uuid: self.matched_exchange_uuid,
            matched_notification_exchange_uuid: self.matched_notification_exchange_uuid,
            context: self.layer.clone(),
            extra,
        };
        Ok(serde_json::to_value(exported)?)
    }

    fn import(&mut self, state: &Value) -> Result<Value, EngineError> {
        let imported: ExportedAction<C> = serde_json::from_value(state.clone())?;
        self.id = imported.id;
        self.state = imported.state;
        self.matched_exchange_uuid = imported.matched_exchange_uuid;
        self.matched_notification_exchange_uuid = imported.matched_notification_exchange_uuid;
        self.layer = imported.context;
        Ok(imported.extra)
    }
}

// ── Per-standard behavior ───────────────────────────────────────────────────

/// One step of a scenario.
///
/// Implementors provide the standard-specific parts: prompts, how input and
/// exchanges update the context layer, and the check tree. The provided
/// methods enforce the lifecycle and must not be overridden.
pub trait ConformanceAction<C: ContextLayer>: Send + Sync {
    fn core(&self) -> &ActionCore<C>;

    fn core_mut(&mut self) -> &mut ActionCore<C>;

    /// Prompt kind understood by the parties of the standard.
    fn action_type(&self) -> &'static str;

    fn human_readable_prompt(&self, ctx: &C) -> String;

    /// Extra prompt fields merged into the prompt JSON.
    fn prompt_details(&self, _ctx: &C) -> Map<String, Value> {
        Map::new()
    }

    fn apply_party_input(&mut self, _input: &Value, _ctx: &C) -> Result<(), EngineError> {
        Err(EngineError::UnexpectedInput {
            action_path: self.core().action_path().to_string(),
            message: "this action does not take input".into(),
        })
    }

    fn apply_exchange(
        &mut self,
        _exchange: &ConformanceExchange,
        _ctx: &C,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// The business key this exchange claims, checked against the scenario
    /// context before the exchange is applied.
    fn exchange_business_key(&self, _exchange: &ConformanceExchange) -> Option<BusinessKey> {
        None
    }

    /// Whether the exchange belongs to this action. By default the request
    /// must go from the action's source party to its target party.
    fn matches_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let message = &exchange.request.message;
        message.source_party_name == self.core().source_party_name()
            && message.target_party_name == self.core().target_party_name()
    }

    fn create_check(&self, _expected_api_version: &str, _ctx: &C) -> Option<ConformanceCheck> {
        None
    }

    fn export_extra(&self) -> Value {
        Value::Null
    }

    fn import_extra(&mut self, _extra: &Value) -> Result<(), EngineError> {
        Ok(())
    }

    fn reset_extra(&mut self) {}

    // ── Provided ────────────────────────────────────────────────────────────

    fn prompt(&self, ctx: &C) -> Value {
        let core = self.core();
        let mut prompt = Map::new();
        prompt.insert("actionId".into(), json!(core.id()));
        prompt.insert("actionType".into(), json!(self.action_type()));
        prompt.insert("actionPath".into(), json!(core.action_path()));
        prompt.insert("actionTitle".into(), json!(core.title()));
        prompt.insert("sourcePartyName".into(), json!(core.source_party_name()));
        prompt.insert("targetPartyName".into(), json!(core.target_party_name()));
        prompt.insert(
            "humanReadablePrompt".into(),
            json!(self.human_readable_prompt(ctx)),
        );
        for (key, value) in self.prompt_details(ctx) {
            prompt.insert(key, value);
        }
        Value::Object(prompt)
    }

    fn handle_party_input(&mut self, input: &Value, ctx: &C) -> Result<(), EngineError> {
        let state = self.core().state();
        if state != ActionState::AwaitingInput {
            return Err(EngineError::NotAwaitingInput {
                action_path: self.core().action_path().to_string(),
                state,
            });
        }
        self.apply_party_input(input, ctx)?;
        self.core_mut().state = ActionState::Satisfied;
        Ok(())
    }

    fn handle_exchange(
        &mut self,
        exchange: &ConformanceExchange,
        ctx: &C,
    ) -> Result<(), EngineError> {
        let state = self.core().state();
        if state != ActionState::AwaitingExchange {
            return Err(EngineError::NotAwaitingExchange {
                action_path: self.core().action_path().to_string(),
                state,
            });
        }

        let is_notification = self.core().capabilities().expects_notification
            && self.core().matched_exchange_uuid().is_some();
        if is_notification {
            let core = self.core_mut();
            core.matched_notification_exchange_uuid = Some(exchange.uuid);
            core.state = ActionState::Satisfied;
            return Ok(());
        }

        if let Some(key) = self.exchange_business_key(exchange) {
            if let Some(expected) = ctx.business_key(key.name) {
                if expected != key.value {
                    return Err(EngineError::BusinessKeyMismatch {
                        action_path: self.core().action_path().to_string(),
                        key: key.name.to_string(),
                        expected,
                        actual: key.value,
                    });
                }
            }
        }

        self.apply_exchange(exchange, ctx)?;
        let core = self.core_mut();
        core.matched_exchange_uuid = Some(exchange.uuid);
        if !core.capabilities.expects_notification {
            core.state = ActionState::Satisfied;
        }
        Ok(())
    }

    fn export_state(&self) -> Result<Value, EngineError> {
        self.core().export(self.export_extra())
    }

    fn import_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let extra = self.core_mut().import(state)?;
        self.import_extra(&extra)
    }

    fn reset(&mut self) {
        self.core_mut().reset();
        self.reset_extra();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::traffic::ConformanceRequest;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct DocContext {
        pub reference: Option<String>,
    }

    impl ContextLayer for DocContext {
        fn overlay(&mut self, newer: &Self) {
            crate::scenario::overlay_field(&mut self.reference, &newer.reference);
        }

        fn business_key(&self, name: &str) -> Option<String> {
            (name == "reference").then(|| self.reference.clone()).flatten()
        }
    }

    /// Input action establishing the reference.
    pub(crate) struct SupplyReference {
        pub core: ActionCore<DocContext>,
    }

    impl ConformanceAction<DocContext> for SupplyReference {
        fn core(&self) -> &ActionCore<DocContext> {
            &self.core
        }
        fn core_mut(&mut self) -> &mut ActionCore<DocContext> {
            &mut self.core
        }
        fn action_type(&self) -> &'static str {
            "SupplyReference"
        }
        fn human_readable_prompt(&self, _ctx: &DocContext) -> String {
            "Supply a document reference".into()
        }
        fn apply_party_input(
            &mut self,
            input: &Value,
            _ctx: &DocContext,
        ) -> Result<(), EngineError> {
            self.core.layer_mut().reference = input["reference"].as_str().map(str::to_string);
            Ok(())
        }
    }

    /// Exchange action whose request body carries the reference.
    pub(crate) struct SendDocument {
        pub core: ActionCore<DocContext>,
        pub notification: bool,
    }

    impl ConformanceAction<DocContext> for SendDocument {
        fn core(&self) -> &ActionCore<DocContext> {
            &self.core
        }
        fn core_mut(&mut self) -> &mut ActionCore<DocContext> {
            &mut self.core
        }
        fn action_type(&self) -> &'static str {
            "SendDocument"
        }
        fn human_readable_prompt(&self, ctx: &DocContext) -> String {
            format!("Send document {:?}", ctx.reference)
        }
        fn exchange_business_key(&self, exchange: &ConformanceExchange) -> Option<BusinessKey> {
            exchange.request.message.body["reference"]
                .as_str()
                .map(|value| BusinessKey {
                    name: "reference",
                    value: value.to_string(),
                })
        }
        fn export_extra(&self) -> Value {
            json!({"notification": self.notification})
        }
    }

    pub(crate) fn exchange(from: &str, to: &str, reference: &str) -> ConformanceExchange {
        let request = ConformanceRequest::new("POST", "/documents")
            .from_party(from, "Sender")
            .to_party(to, "Receiver")
            .with_body(json!({"reference": reference}));
        let response = request.create_response(201);
        ConformanceExchange::new(request, response)
    }

    fn send_action(capabilities: Capabilities) -> SendDocument {
        SendDocument {
            core: ActionCore::new(None, "Send", "S1", "R1", capabilities),
            notification: capabilities.expects_notification,
        }
    }

    #[test]
    fn action_path_joins_titles() {
        let first: ActionCore<DocContext> =
            ActionCore::new(None, "A", "S1", "R1", Capabilities::INPUT);
        let second = ActionCore::new(Some(&first), "B", "S1", "R1", Capabilities::EXCHANGE);
        assert_eq!(first.action_path(), "A");
        assert_eq!(second.action_path(), "A - B");
    }

    #[test]
    fn input_only_accepted_while_awaiting_input() {
        let mut action = SupplyReference {
            core: ActionCore::new(None, "Supply", "S1", "R1", Capabilities::INPUT),
        };
        let ctx = DocContext::default();
        let err = action
            .handle_party_input(&json!({"reference": "X"}), &ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAwaitingInput { state: ActionState::Pending, .. }));

        action.core_mut().activate();
        assert_eq!(action.core().state(), ActionState::AwaitingInput);
        action
            .handle_party_input(&json!({"reference": "X"}), &ctx)
            .unwrap();
        assert_eq!(action.core().state(), ActionState::Satisfied);
        assert_eq!(action.core().layer().reference.as_deref(), Some("X"));
    }

    #[test]
    fn business_key_mismatch_is_fatal() {
        let mut action = send_action(Capabilities::EXCHANGE);
        action.core_mut().activate();
        let ctx = DocContext {
            reference: Some("DOC-1".into()),
        };
        let err = action
            .handle_exchange(&exchange("S1", "R1", "DOC-2"), &ctx)
            .unwrap_err();
        assert!(err.is_fatal_to_scenario());
        assert!(matches!(
            err,
            EngineError::BusinessKeyMismatch { ref expected, .. } if expected == "DOC-1"
        ));
        assert_eq!(action.core().state(), ActionState::AwaitingExchange);
    }

    #[test]
    fn exchange_rejected_unless_awaiting_exchange() {
        let mut action = send_action(Capabilities::EXCHANGE);
        let err = action
            .handle_exchange(&exchange("S1", "R1", "DOC-1"), &DocContext::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAwaitingExchange { .. }));
    }

    #[test]
    fn notification_needs_a_second_exchange() {
        let mut action = send_action(Capabilities::EXCHANGE_WITH_NOTIFICATION);
        action.core_mut().activate();
        let ctx = DocContext::default();
        let first = exchange("S1", "R1", "DOC-1");
        action.handle_exchange(&first, &ctx).unwrap();
        assert_eq!(action.core().state(), ActionState::AwaitingExchange);
        assert_eq!(action.core().matched_exchange_uuid(), Some(first.uuid));

        let second = exchange("R1", "S1", "DOC-1");
        action.handle_exchange(&second, &ctx).unwrap();
        assert_eq!(action.core().state(), ActionState::Satisfied);
        assert_eq!(action.core().matched_notification_exchange_uuid(), Some(second.uuid));
    }

    #[test]
    fn export_then_import_is_a_fixed_point() {
        let mut action = send_action(Capabilities::EXCHANGE);
        action.core_mut().activate();
        action
            .handle_exchange(&exchange("S1", "R1", "DOC-1"), &DocContext::default())
            .unwrap();
        let exported = action.export_state().unwrap();

        let mut fresh = send_action(Capabilities::EXCHANGE);
        fresh.import_state(&exported).unwrap();
        assert_eq!(fresh.export_state().unwrap(), exported);
        assert_eq!(fresh.core().id(), action.core().id());
    }

    #[test]
    fn reset_clears_state_and_assigns_new_id() {
        let mut action = send_action(Capabilities::EXCHANGE);
        let old_id = action.core().id();
        action.core_mut().activate();
        action
            .handle_exchange(&exchange("S1", "R1", "DOC-1"), &DocContext::default())
            .unwrap();
        action.reset();
        assert_ne!(action.core().id(), old_id);
        assert_eq!(action.core().state(), ActionState::Pending);
        assert_eq!(action.core().matched_exchange_uuid(), None);
    }

    #[test]
    fn prompt_carries_identity_and_details() {
        let action = send_action(Capabilities::EXCHANGE);
        let prompt = action.prompt(&DocContext::default());
        assert_eq!(prompt["actionType"], "SendDocument");
        assert_eq!(prompt["sourcePartyName"], "S1");
        assert_eq!(prompt["actionId"], json!(action.core().id()));
    }
}
