//! Actions where a platform supplies scenario parameters out of band.

use serde_json::{json, Map, Value};

use quayside_core::{ActionCore, Capabilities, ConformanceAction, EngineError};

use super::{parse_input, PintActionType};
use crate::model::{
    PintContext, ReceiverScenarioParameters, ScenarioClass, SenderScenarioParameters,
    ValidationParameters,
};

// ── Sending platform ────────────────────────────────────────────────────────

pub struct SupplySenderParameters {
    core: ActionCore<PintContext>,
    document_count: usize,
}

impl SupplySenderParameters {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        document_count: usize,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                format!("SupplySenderParameters({document_count})"),
                sender,
                receiver,
                Capabilities::INPUT,
            ),
            document_count,
        }
    }
}

impl ConformanceAction<PintContext> for SupplySenderParameters {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::SupplySenderParameters.name()
    }

    fn human_readable_prompt(&self, _ctx: &PintContext) -> String {
        format!(
            "Prepare a transport document with {} additional documents for transfer and supply \
             its parameters",
            self.document_count
        )
    }

    fn prompt_details(&self, _ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("documentCount".into(), json!(self.document_count));
        details
    }

    fn apply_party_input(&mut self, input: &Value, _ctx: &PintContext) -> Result<(), EngineError> {
        let parameters: SenderScenarioParameters = parse_input(self.core.action_path(), input)?;
        if parameters.document_count != self.document_count {
            return Err(EngineError::UnexpectedInput {
                action_path: self.core.action_path().to_string(),
                message: format!(
                    "documentCount was {} but it should have been {}",
                    parameters.document_count, self.document_count
                ),
            });
        }
        self.core.layer_mut().sender = Some(parameters);
        Ok(())
    }
}

// ── Receiving platform ──────────────────────────────────────────────────────

pub struct ReceiverStateSetup {
    core: ActionCore<PintContext>,
    scenario_class: ScenarioClass,
}

impl ReceiverStateSetup {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        receiver: &str,
        sender: &str,
        scenario_class: ScenarioClass,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                format!("ReceiverStateSetup({scenario_class})"),
                receiver,
                sender,
                Capabilities::INPUT,
            ),
            scenario_class,
        }
    }
}

impl ConformanceAction<PintContext> for ReceiverStateSetup {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::ReceiverStateSetup.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        format!(
            "Prepare to receive the transport document '{}' in scenario class {} and supply the \
             receiver parameters",
            ctx.transport_document_reference().unwrap_or("?"),
            self.scenario_class
        )
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("scenarioClass".into(), json!(self.scenario_class));
        details.insert("senderScenarioParameters".into(), json!(ctx.sender));
        details
    }

    fn apply_party_input(&mut self, input: &Value, _ctx: &PintContext) -> Result<(), EngineError> {
        let mut parameters: ReceiverScenarioParameters =
            parse_input(self.core.action_path(), input)?;
        parameters.scenario_class = self.scenario_class;
        self.core.layer_mut().receiver = Some(parameters);
        Ok(())
    }
}

/// Switch the receiving platform to another scenario class mid-transfer.
pub struct ResetScenarioClass {
    core: ActionCore<PintContext>,
    scenario_class: ScenarioClass,
}

impl ResetScenarioClass {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        receiver: &str,
        sender: &str,
        scenario_class: ScenarioClass,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                format!("ResetScenarioClass({scenario_class})"),
                receiver,
                sender,
                Capabilities::INPUT,
            ),
            scenario_class,
        }
    }
}

impl ConformanceAction<PintContext> for ResetScenarioClass {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::ResetScenarioClass.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        format!(
            "Switch the handling of transport document '{}' to scenario class {}",
            ctx.transport_document_reference().unwrap_or("?"),
            self.scenario_class
        )
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("scenarioClass".into(), json!(self.scenario_class));
        details.insert(
            "transportDocumentReference".into(),
            json!(ctx.transport_document_reference()),
        );
        details
    }

    fn apply_party_input(&mut self, _input: &Value, ctx: &PintContext) -> Result<(), EngineError> {
        if let Some(mut receiver) = ctx.receiver.clone() {
            receiver.scenario_class = self.scenario_class;
            self.core.layer_mut().receiver = Some(receiver);
        }
        Ok(())
    }
}

pub struct SupplyValidationParameters {
    core: ActionCore<PintContext>,
}

impl SupplyValidationParameters {
    pub fn new(previous: Option<&ActionCore<PintContext>>, receiver: &str, sender: &str) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                "SupplyValidationParameters",
                receiver,
                sender,
                Capabilities::INPUT,
            ),
        }
    }
}

impl ConformanceAction<PintContext> for SupplyValidationParameters {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::SupplyValidationParameters.name()
    }

    fn human_readable_prompt(&self, _ctx: &PintContext) -> String {
        "Supply the identifying code of a party that the receiving platform can validate".into()
    }

    fn apply_party_input(&mut self, input: &Value, _ctx: &PintContext) -> Result<(), EngineError> {
        let parameters: ValidationParameters = parse_input(self.core.action_path(), input)?;
        self.core.layer_mut().validation = Some(parameters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::receiver;

    #[test]
    fn sender_parameters_must_match_document_count() {
        let mut action = SupplySenderParameters::new(None, "S1", "R1", 2);
        action.core_mut().activate();
        let input = json!({
            "transportDocumentReference": "HHL71800000ABCDEFGHI",
            "sendersPublicKey": "key",
            "eblPlatform": "BOLE",
            "documentCount": 0,
        });
        let err = action.handle_party_input(&input, &PintContext::default()).unwrap_err();
        assert!(err.to_string().contains("documentCount was 0"));
    }

    #[test]
    fn reset_scenario_class_rewrites_the_receiver_parameters() {
        let mut action = ResetScenarioClass::new(None, "R1", "S1", ScenarioClass::FailW503);
        action.core_mut().activate();
        let ctx = PintContext {
            receiver: Some(receiver()),
            ..Default::default()
        };
        action.handle_party_input(&json!({}), &ctx).unwrap();
        assert_eq!(
            action.core().layer().receiver.as_ref().unwrap().scenario_class,
            ScenarioClass::FailW503
        );
        assert_eq!(action.core().title(), "ResetScenarioClass(FAIL_W_503)");
    }
}
