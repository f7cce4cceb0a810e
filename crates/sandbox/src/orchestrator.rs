//! Runs the scenarios of one session in batches and routes prompts, inputs
//! and exchanges to their head actions.

use serde_json::{json, Value};
use uuid::Uuid;

use quayside_core::{
    ComponentFactory, ConformanceCheck, ConformanceExchange, ConformanceReport, ConformanceScenario,
    ConformanceStatus, ContextLayer, EngineError, PartyNames, TrafficRecorder,
};

/// Scenario runner for one sandbox session.
///
/// The orchestrator is rebuilt from the component factory on every call and
/// then fed its exported state, so it holds nothing across invocations.
pub struct Orchestrator<C> {
    module_titles: Vec<String>,
    scenarios: Vec<ConformanceScenario<C>>,
    batch_size: usize,
}

impl<C: ContextLayer> Orchestrator<C> {
    /// Build all scenarios of the standard. `batch_size` of `None` means the
    /// orchestrator is inactive and runs nothing.
    pub fn new<F>(factory: &F, names: &PartyNames, batch_size: Option<usize>) -> Self
    where
        F: ComponentFactory<Context = C>,
    {
        let Some(batch_size) = batch_size else {
            return Self {
                module_titles: Vec::new(),
                scenarios: Vec::new(),
                batch_size: 1,
            };
        };
        let modules = factory.create_scenario_modules(names);
        let module_titles = modules.iter().map(|m| m.title.clone()).collect();
        let scenarios = modules
            .iter()
            .enumerate()
            .flat_map(|(index, module)| module.builder.build_scenario_list(index))
            .collect();
        Self {
            module_titles,
            scenarios,
            batch_size: batch_size.max(1),
        }
    }

    pub fn scenarios(&self) -> &[ConformanceScenario<C>] {
        &self.scenarios
    }

    /// Scenarios that still have an action to run.
    pub fn scenarios_left(&self) -> usize {
        self.scenarios.iter().filter(|s| s.has_next_action()).count()
    }

    pub fn status(&self) -> Value {
        json!({ "scenariosLeft": self.scenarios_left() })
    }

    /// Index range of the first batch with unfinished scenarios.
    fn active_batch(&self) -> std::ops::Range<usize> {
        let mut start = 0;
        while start < self.scenarios.len() {
            let end = (start + self.batch_size).min(self.scenarios.len());
            if self.scenarios[start..end].iter().any(|s| s.has_next_action()) {
                return start..end;
            }
            start = end;
        }
        0..0
    }

    /// Prompts of the active heads that `party` must act on.
    pub fn party_prompt(&self, party: &str) -> Vec<Value> {
        self.scenarios[self.active_batch()]
            .iter()
            .filter(|scenario| {
                scenario
                    .peek_next_action()
                    .is_some_and(|action| action.core().source_party_name() == party)
            })
            .filter_map(|scenario| scenario.next_prompt())
            .collect()
    }

    /// Apply `{actionId, input}` to the head action with that id.
    pub fn handle_party_input(&mut self, body: &Value) -> Result<(), EngineError> {
        let action_id = body["actionId"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| EngineError::UnexpectedInput {
                action_path: String::new(),
                message: "party input has no valid 'actionId'".into(),
            })?;
        let input = body.get("input").cloned().unwrap_or(Value::Null);
        let batch = self.active_batch();
        for scenario in &mut self.scenarios[batch] {
            if scenario.handle_party_input(action_id, &input)? {
                tracing::info!(%action_id, scenario = %scenario.title(), "party input applied");
                return Ok(());
            }
        }
        Err(EngineError::UnknownAction(action_id))
    }

    /// Offer an exchange to the heads of the active batch. A head whose
    /// business key agrees with the exchange is preferred over one that
    /// merely matches the endpoint. Returns whether any scenario took it.
    pub fn handle_exchange(&mut self, exchange: &ConformanceExchange) -> Result<bool, EngineError> {
        let batch = self.active_batch();
        let owner = self.scenarios[batch.clone()]
            .iter()
            .position(|s| s.owns_exchange(exchange))
            .map(|offset| batch.start + offset);
        let candidates: Vec<usize> = owner.into_iter().chain(batch).collect();
        for index in candidates {
            let scenario = &mut self.scenarios[index];
            if scenario.handle_exchange(exchange)? {
                match scenario.abort_reason() {
                    Some(reason) => tracing::warn!(
                        exchange = %exchange.uuid,
                        scenario = %scenario.title(),
                        reason,
                        "scenario aborted"
                    ),
                    None => tracing::info!(
                        exchange = %exchange.uuid,
                        scenario = %scenario.title(),
                        "exchange matched"
                    ),
                }
                return Ok(true);
            }
        }
        tracing::info!(
            exchange = %exchange.uuid,
            method = %exchange.request.method,
            url = %exchange.request.url,
            "exchange did not match any pending action"
        );
        Ok(false)
    }

    pub fn export_state(&self) -> Result<Value, EngineError> {
        let scenarios = self
            .scenarios
            .iter()
            .map(ConformanceScenario::export_state)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "nextScenarioBatchesSize": self.batch_size,
            "scenarios": scenarios,
        }))
    }

    pub fn import_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let scenarios = state["scenarios"]
            .as_array()
            .ok_or_else(|| EngineError::StateImport("orchestrator state has no scenarios".into()))?;
        if scenarios.len() != self.scenarios.len() {
            return Err(EngineError::StateImport(format!(
                "standard has {} scenarios but the stored state has {}",
                self.scenarios.len(),
                scenarios.len()
            )));
        }
        for (scenario, exported) in self.scenarios.iter_mut().zip(scenarios) {
            scenario.import_state(exported)?;
        }
        if let Some(size) = state["nextScenarioBatchesSize"].as_u64() {
            self.batch_size = (size as usize).max(1);
        }
        Ok(())
    }

    fn create_check(&self, title: &str, expected_api_version: &str) -> ConformanceCheck {
        let modules = self
            .module_titles
            .iter()
            .enumerate()
            .map(|(index, module_title)| {
                let checks = self
                    .scenarios
                    .iter()
                    .filter(|s| s.module_index() == index)
                    .map(|s| s.create_check(expected_api_version))
                    .collect();
                ConformanceCheck::group(module_title.clone(), checks)
            })
            .collect();
        ConformanceCheck::group(title, modules)
    }

    /// Move every satisfied action to checked, once a report has evaluated
    /// its checks.
    pub fn mark_checked(&mut self) {
        for scenario in &mut self.scenarios {
            scenario.mark_checked();
        }
    }

    /// Detailed report of `role` against the recorded traffic.
    pub fn report(
        &self,
        title: &str,
        expected_api_version: &str,
        role: &str,
        traffic: &TrafficRecorder,
    ) -> ConformanceReport {
        match self.create_check(title, expected_api_version).evaluate(role, traffic) {
            Some(outcome) => ConformanceReport::from_outcome(&outcome),
            None => ConformanceReport {
                title: title.to_string(),
                status: ConformanceStatus::NoTraffic,
                sub_reports: Vec::new(),
                error_messages: Vec::new(),
            },
        }
    }
}
