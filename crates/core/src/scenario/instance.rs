use serde_json::{json, Value};
use uuid::Uuid;

use super::action::{ActionState, ConformanceAction};
use super::context::{resolve, ContextLayer};
use crate::check::ConformanceCheck;
use crate::error::EngineError;
use crate::traffic::ConformanceExchange;

/// One root-to-leaf path of a scenario graph, walked head first.
pub struct ConformanceScenario<C> {
    module_index: usize,
    scenario_index: usize,
    actions: Vec<Box<dyn ConformanceAction<C>>>,
    next_action_index: usize,
    abort_reason: Option<String>,
}

impl<C: ContextLayer> ConformanceScenario<C> {
    pub(crate) fn new(
        module_index: usize,
        scenario_index: usize,
        actions: Vec<Box<dyn ConformanceAction<C>>>,
    ) -> Self {
        let mut scenario = Self {
            module_index,
            scenario_index,
            actions,
            next_action_index: 0,
            abort_reason: None,
        };
        scenario.activate_head();
        scenario
    }

    pub fn module_index(&self) -> usize {
        self.module_index
    }

    pub fn scenario_index(&self) -> usize {
        self.scenario_index
    }

    pub fn actions(&self) -> &[Box<dyn ConformanceAction<C>>] {
        &self.actions
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn title(&self) -> String {
        self.actions
            .last()
            .map(|a| a.core().action_path().to_string())
            .unwrap_or_default()
    }

    pub fn has_next_action(&self) -> bool {
        self.abort_reason.is_none() && self.next_action_index < self.actions.len()
    }

    pub fn peek_next_action(&self) -> Option<&dyn ConformanceAction<C>> {
        if !self.has_next_action() {
            return None;
        }
        self.actions.get(self.next_action_index).map(|a| a.as_ref())
    }

    /// The resolved context at `index`: the fold of layers `0..=index`.
    pub fn context_at(&self, index: usize) -> C {
        let end = (index + 1).min(self.actions.len());
        resolve(self.actions[..end].iter().map(|a| a.core().layer()))
    }

    /// Prompt JSON of the head action, for the party that must act on it.
    pub fn next_prompt(&self) -> Option<Value> {
        let action = self.peek_next_action()?;
        Some(action.prompt(&self.context_at(self.next_action_index)))
    }

    /// Mark the head action done and activate its successor.
    pub fn pop_next_action(&mut self) {
        if self.has_next_action() {
            self.next_action_index += 1;
            self.activate_head();
        }
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.abort_reason = Some(reason.into());
    }

    /// Apply party input if the head action has this id. Returns whether
    /// the input was taken.
    pub fn handle_party_input(
        &mut self,
        action_id: Uuid,
        input: &Value,
    ) -> Result<bool, EngineError> {
        let index = self.next_action_index;
        let matches = self
            .peek_next_action()
            .is_some_and(|action| action.core().id() == action_id);
        if !matches {
            return Ok(false);
        }
        let ctx = self.context_at(index);
        self.actions[index].handle_party_input(input, &ctx)?;
        self.advance_if_done();
        Ok(true)
    }

    /// Whether the head action would take this exchange and its business
    /// key agrees with the scenario context (or the context has none yet).
    pub fn owns_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let Some(action) = self.peek_next_action() else {
            return false;
        };
        if action.core().state() != ActionState::AwaitingExchange
            || !action.matches_exchange(exchange)
        {
            return false;
        }
        match action.exchange_business_key(exchange) {
            Some(key) => self
                .context_at(self.next_action_index)
                .business_key(key.name)
                .map_or(true, |expected| expected == key.value),
            None => true,
        }
    }

    /// Offer an exchange to the head action. Returns whether it was taken.
    /// A fatal violation aborts the scenario and still counts as taken.
    pub fn handle_exchange(&mut self, exchange: &ConformanceExchange) -> Result<bool, EngineError> {
        let index = self.next_action_index;
        let matches = self.peek_next_action().is_some_and(|action| {
            action.core().state() == ActionState::AwaitingExchange
                && action.matches_exchange(exchange)
        });
        if !matches {
            return Ok(false);
        }
        let ctx = self.context_at(index);
        match self.actions[index].handle_exchange(exchange, &ctx) {
            Ok(()) => {
                self.advance_if_done();
                Ok(true)
            }
            Err(e) if e.is_fatal_to_scenario() => {
                self.abort(e.to_string());
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Scenario check: one child per action plus the abort verdict.
    pub fn create_check(&self, expected_api_version: &str) -> ConformanceCheck {
        let mut children: Vec<ConformanceCheck> = self
            .actions
            .iter()
            .enumerate()
            .filter_map(|(i, action)| {
                action.create_check(expected_api_version, &self.context_at(i))
            })
            .collect();
        if let Some(reason) = &self.abort_reason {
            children.push(ConformanceCheck::failure(
                "The scenario ran to completion",
                format!("Scenario aborted: {reason}"),
            ));
        }
        ConformanceCheck::group(self.title(), children)
    }

    pub fn mark_checked(&mut self) {
        for action in &mut self.actions {
            action.core_mut().mark_checked();
        }
    }

    pub fn reset(&mut self) {
        for action in &mut self.actions {
            action.reset();
        }
        self.next_action_index = 0;
        self.abort_reason = None;
        self.activate_head();
    }

    pub fn export_state(&self) -> Result<Value, EngineError> {
        let actions = self
            .actions
            .iter()
            .map(|a| a.export_state())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "nextActionIndex": self.next_action_index,
            "abortReason": self.abort_reason,
            "actions": actions,
        }))
    }

    pub fn import_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let actions = state["actions"]
            .as_array()
            .ok_or_else(|| EngineError::StateImport("scenario state has no actions".into()))?;
        if actions.len() != self.actions.len() {
            return Err(EngineError::StateImport(format!(
                "scenario '{}' has {} actions but the stored state has {}",
                self.title(),
                self.actions.len(),
                actions.len()
            )));
        }
        for (action, exported) in self.actions.iter_mut().zip(actions) {
            action.import_state(exported)?;
        }
        self.next_action_index = state["nextActionIndex"]
            .as_u64()
            .ok_or_else(|| EngineError::StateImport("missing nextActionIndex".into()))?
            as usize;
        self.abort_reason = state["abortReason"].as_str().map(str::to_string);
        Ok(())
    }

    fn advance_if_done(&mut self) {
        while self
            .peek_next_action()
            .is_some_and(|action| action.core().state().is_done())
        {
            self.pop_next_action();
        }
    }

    fn activate_head(&mut self) {
        if let Some(action) = self.actions.get_mut(self.next_action_index) {
            action.core_mut().activate();
        }
        self.advance_if_done();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scenario::action::tests::{exchange, DocContext, SendDocument, SupplyReference};
    use crate::scenario::action::{ActionCore, Capabilities};
    use crate::scenario::builder::ScenarioListBuilder;

    fn two_step() -> ScenarioListBuilder<DocContext> {
        ScenarioListBuilder::new(|prev| {
            Box::new(SupplyReference {
                core: ActionCore::new(prev, "Supply", "S1", "R1", Capabilities::INPUT),
            }) as Box<dyn ConformanceAction<DocContext>>
        })
        .then(ScenarioListBuilder::new(|prev| {
            Box::new(SendDocument {
                core: ActionCore::new(prev, "Send", "S1", "R1", Capabilities::EXCHANGE),
                notification: false,
            }) as Box<dyn ConformanceAction<DocContext>>
        }))
    }

    fn single() -> ConformanceScenario<DocContext> {
        two_step().build_scenario_list(0).remove(0)
    }

    #[test]
    fn input_then_exchange_runs_to_completion() {
        let mut scenario = single();
        let supply_id = scenario.peek_next_action().unwrap().core().id();
        assert!(scenario
            .handle_party_input(supply_id, &json!({"reference": "DOC-1"}))
            .unwrap());
        assert_eq!(scenario.context_at(1).reference.as_deref(), Some("DOC-1"));

        assert!(scenario.handle_exchange(&exchange("S1", "R1", "DOC-1")).unwrap());
        assert!(!scenario.has_next_action());
        assert!(scenario.abort_reason().is_none());
    }

    #[test]
    fn unrelated_exchange_is_not_taken() {
        let mut scenario = single();
        let supply_id = scenario.peek_next_action().unwrap().core().id();
        scenario
            .handle_party_input(supply_id, &json!({"reference": "DOC-1"}))
            .unwrap();
        assert!(!scenario.handle_exchange(&exchange("X", "R1", "DOC-1")).unwrap());
        assert!(scenario.has_next_action());
    }

    #[test]
    fn business_key_mismatch_aborts_scenario() {
        let mut scenario = single();
        let supply_id = scenario.peek_next_action().unwrap().core().id();
        scenario
            .handle_party_input(supply_id, &json!({"reference": "DOC-1"}))
            .unwrap();
        assert!(scenario.handle_exchange(&exchange("S1", "R1", "DOC-9")).unwrap());
        assert!(!scenario.has_next_action());
        assert!(scenario.abort_reason().unwrap().contains("DOC-9"));
    }

    #[test]
    fn export_import_round_trips_through_a_rebuilt_graph() {
        let mut scenario = single();
        let supply_id = scenario.peek_next_action().unwrap().core().id();
        scenario
            .handle_party_input(supply_id, &json!({"reference": "DOC-1"}))
            .unwrap();
        let exported = scenario.export_state().unwrap();

        let mut rebuilt = single();
        rebuilt.import_state(&exported).unwrap();
        assert_eq!(rebuilt.export_state().unwrap(), exported);
        assert!(rebuilt.handle_exchange(&exchange("S1", "R1", "DOC-1")).unwrap());
        assert!(!rebuilt.has_next_action());
    }

    #[test]
    fn reset_then_replay_reaches_the_same_state() {
        let mut scenario = single();
        let run = |scenario: &mut ConformanceScenario<DocContext>| {
            let id = scenario.peek_next_action().unwrap().core().id();
            scenario
                .handle_party_input(id, &json!({"reference": "DOC-1"}))
                .unwrap();
            scenario.handle_exchange(&exchange("S1", "R1", "DOC-1")).unwrap();
            scenario
                .actions()
                .iter()
                .map(|a| a.core().state())
                .collect::<Vec<_>>()
        };
        let first = run(&mut scenario);
        scenario.reset();
        assert!(scenario.has_next_action());
        let second = run(&mut scenario);
        assert_eq!(first, second);
    }
}
