//! Stateless sandbox entry points.
//!
//! Every call reloads what it needs from the stores and writes back what it
//! changed. Locked items go through the [`StatefulExecutor`], so concurrent
//! calls on the same session serialize on the store, not in memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use quayside_core::{
    ComponentFactory, ConformanceExchange, ConformanceParty, ConformanceReport, ConformanceRequest,
    ConformanceResponse, EngineError, PartyConfiguration, PartyNames, PartyOutbound,
    TrafficRecorder,
};
use quayside_storage::{
    MemoryLockingMap, MemoryNonLockingMap, NonLockingMap, RetryPolicy, StatefulExecutor,
};

use crate::config::SandboxConfiguration;
use crate::error::SandboxError;
use crate::keys::{
    exchange_sort_key, party_sort_key, sandbox_partition, session_partition, CONFIG_SORT_KEY,
    EXCHANGE_SORT_KEY_PREFIX, ORCHESTRATOR_SORT_KEY, STATE_SORT_KEY,
};
use crate::orchestrator::Orchestrator;
use crate::tasks::{DeferredTask, TaskQueue};
use crate::transport::{ExchangeTransport, UreqTransport};

/// The report of one tested role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleReport {
    pub role: String,
    pub report: ConformanceReport,
}

/// Pointer to the session a sandbox is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPointer {
    current_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_session_id: Option<String>,
}

pub struct Sandbox<F: ComponentFactory> {
    factory: Arc<F>,
    executor: StatefulExecutor,
    documents: Arc<dyn NonLockingMap>,
    tasks: Arc<dyn TaskQueue>,
    transport: Arc<dyn ExchangeTransport>,
}

impl<F: ComponentFactory> Sandbox<F> {
    pub fn new(
        factory: Arc<F>,
        executor: StatefulExecutor,
        documents: Arc<dyn NonLockingMap>,
        tasks: Arc<dyn TaskQueue>,
        transport: Arc<dyn ExchangeTransport>,
    ) -> Self {
        Self {
            factory,
            executor,
            documents,
            tasks,
            transport,
        }
    }

    /// Sandbox over fresh in-memory stores, calling external counterparts
    /// with [`UreqTransport`].
    pub fn in_memory(
        factory: Arc<F>,
        locking: MemoryLockingMap,
        tasks: Arc<dyn TaskQueue>,
    ) -> Self {
        Self::new(
            factory,
            StatefulExecutor::new(Arc::new(locking), RetryPolicy::default()),
            Arc::new(MemoryNonLockingMap::new()),
            tasks,
            Arc::new(UreqTransport::new()),
        )
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Validate and store a configuration, then start its first session.
    /// An empty id is replaced by a fresh one.
    pub async fn create(
        &self,
        mut config: SandboxConfiguration,
    ) -> Result<SandboxConfiguration, SandboxError> {
        self.validate(&config)?;
        if config.id.is_empty() {
            config.id = Uuid::new_v4().to_string();
        }
        let partition = sandbox_partition(&config.id);
        if self.documents.get_item(&partition, CONFIG_SORT_KEY).await?.is_some() {
            return Err(SandboxError::InvalidRequest(format!(
                "sandbox '{}' already exists",
                config.id
            )));
        }
        self.documents
            .set_item(&partition, CONFIG_SORT_KEY, serde_json::to_value(&config)?)
            .await?;
        tracing::info!(sandbox_id = %config.id, name = %config.name, "sandbox created");
        self.reset(&config.id).await?;
        Ok(config)
    }

    fn validate(&self, config: &SandboxConfiguration) -> Result<(), SandboxError> {
        let factory = self.factory.as_ref();
        if config.standard.name != factory.standard_name()
            || config.standard.version != factory.standard_version()
        {
            return Err(SandboxError::InvalidRequest(format!(
                "this sandbox runs {} {}, not {} {}",
                factory.standard_name(),
                factory.standard_version(),
                config.standard.name,
                config.standard.version
            )));
        }
        PartyNames::from_configuration(factory.role_names(), &config.parties)?;
        if let Some(party) = config
            .parties
            .iter()
            .find(|p| !p.in_sandbox && config.counterpart(&p.name).is_none())
        {
            return Err(SandboxError::InvalidRequest(format!(
                "party '{}' runs outside the sandbox but has no counterpart configuration",
                party.name
            )));
        }
        if let Some(role) = config
            .tested_roles
            .iter()
            .find(|role| !factory.role_names().contains(&role.as_str()))
        {
            return Err(SandboxError::InvalidRequest(format!(
                "tested role '{role}' is not a role of {}",
                factory.standard_name()
            )));
        }
        if config
            .orchestrator
            .as_ref()
            .is_some_and(|o| o.max_parallel_scenarios == 0)
        {
            return Err(SandboxError::InvalidRequest(
                "maxParallelScenarios must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub async fn configuration(
        &self,
        sandbox_id: &str,
    ) -> Result<SandboxConfiguration, SandboxError> {
        let stored = self
            .documents
            .get_item(&sandbox_partition(sandbox_id), CONFIG_SORT_KEY)
            .await?
            .ok_or_else(|| SandboxError::UnknownSandbox(sandbox_id.to_string()))?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Start a new session with freshly built scenarios and parties, and
    /// notify the parties. Returns the new session id.
    pub async fn reset(&self, sandbox_id: &str) -> Result<String, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        let session_id = Uuid::new_v4().to_string();
        let partition = session_partition(&session_id);

        let orchestrator_state = self.fresh_orchestrator(&config)?.export_state()?;
        self.executor
            .execute(
                "initialize orchestrator",
                &partition,
                ORCHESTRATOR_SORT_KEY,
                Value::Null,
                move |_| async move { Ok::<_, SandboxError>((orchestrator_state, ())) },
            )
            .await?;

        for party in self.factory.create_parties(&config.parties, &config.counterparts)? {
            let state = party.export_state()?;
            self.executor
                .execute(
                    "initialize party",
                    &partition,
                    &party_sort_key(party.name()),
                    Value::Null,
                    move |_| async move { Ok::<_, SandboxError>((state, ())) },
                )
                .await?;
        }

        let new_session = session_id.clone();
        self.executor
            .execute(
                "start session",
                &sandbox_partition(sandbox_id),
                STATE_SORT_KEY,
                Value::Null,
                move |_| async move {
                    let pointer = SessionPointer {
                        current_session_id: Some(new_session.clone()),
                        last_session_id: Some(new_session),
                    };
                    Ok::<_, SandboxError>((serde_json::to_value(pointer)?, ()))
                },
            )
            .await?;

        tracing::info!(sandbox_id, session_id = %session_id, "session started");
        self.schedule(DeferredTask::NotifyAllParties {
            sandbox_id: sandbox_id.to_string(),
            session_id: session_id.clone(),
        })?;
        Ok(session_id)
    }

    /// Clear the session pointer. Deferred tasks of the old session become
    /// no-ops; its traffic stays available for reports.
    pub async fn stop(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        self.configuration(sandbox_id).await?;
        self.executor
            .execute(
                "stop session",
                &sandbox_partition(sandbox_id),
                STATE_SORT_KEY,
                Value::Null,
                move |state| async move {
                    let mut pointer: SessionPointer = if state.is_null() {
                        SessionPointer::default()
                    } else {
                        serde_json::from_value(state)?
                    };
                    pointer.current_session_id = None;
                    Ok::<_, SandboxError>((serde_json::to_value(pointer)?, ()))
                },
            )
            .await?;
        tracing::info!(sandbox_id, "session stopped");
        Ok(())
    }

    async fn session_pointer(&self, sandbox_id: &str) -> Result<SessionPointer, SandboxError> {
        match self
            .executor
            .map()
            .peek(&sandbox_partition(sandbox_id), STATE_SORT_KEY)
            .await?
        {
            Some(state) if !state.is_null() => Ok(serde_json::from_value(state)?),
            _ => Ok(SessionPointer::default()),
        }
    }

    async fn running_session(&self, sandbox_id: &str) -> Result<String, SandboxError> {
        self.session_pointer(sandbox_id)
            .await?
            .current_session_id
            .ok_or_else(|| SandboxError::NotRunning(sandbox_id.to_string()))
    }

    // ── Orchestrator ─────────────────────────────────────────────────────────

    fn fresh_orchestrator(
        &self,
        config: &SandboxConfiguration,
    ) -> Result<Orchestrator<F::Context>, SandboxError> {
        let names = PartyNames::from_configuration(self.factory.role_names(), &config.parties)?;
        Ok(Orchestrator::new(
            self.factory.as_ref(),
            &names,
            config.orchestrator.as_ref().map(|o| o.max_parallel_scenarios),
        ))
    }

    fn restore_orchestrator(
        &self,
        config: &SandboxConfiguration,
        state: &Value,
    ) -> Result<Orchestrator<F::Context>, SandboxError> {
        let mut orchestrator = self.fresh_orchestrator(config)?;
        if !state.is_null() {
            orchestrator.import_state(state)?;
        }
        Ok(orchestrator)
    }

    async fn peek_orchestrator(
        &self,
        config: &SandboxConfiguration,
        session_id: &str,
    ) -> Result<Orchestrator<F::Context>, SandboxError> {
        let state = self
            .executor
            .map()
            .peek(&session_partition(session_id), ORCHESTRATOR_SORT_KEY)
            .await?
            .unwrap_or(Value::Null);
        self.restore_orchestrator(config, &state)
    }

    /// `{scenariosLeft}` of the running session; zero when stopped.
    pub async fn status(&self, sandbox_id: &str) -> Result<Value, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        match self.session_pointer(sandbox_id).await?.current_session_id {
            Some(session_id) => Ok(self.peek_orchestrator(&config, &session_id).await?.status()),
            None => Ok(json!({ "scenariosLeft": 0 })),
        }
    }

    /// Prompts the named party has to act on.
    pub async fn party_prompt(
        &self,
        sandbox_id: &str,
        party_name: &str,
    ) -> Result<Vec<Value>, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        require_party(&config, party_name)?;
        let session_id = self.running_session(sandbox_id).await?;
        Ok(self
            .peek_orchestrator(&config, &session_id)
            .await?
            .party_prompt(party_name))
    }

    /// Feed `{actionId, input}` to the scenario waiting for it.
    pub async fn party_input(&self, sandbox_id: &str, input: &Value) -> Result<(), SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        let session_id = self.running_session(sandbox_id).await?;
        self.apply_party_input(&config, &session_id, input).await
    }

    async fn apply_party_input(
        &self,
        config: &SandboxConfiguration,
        session_id: &str,
        input: &Value,
    ) -> Result<(), SandboxError> {
        self.executor
            .execute(
                "handle party input",
                &session_partition(session_id),
                ORCHESTRATOR_SORT_KEY,
                Value::Null,
                move |state| async move {
                    let mut orchestrator = self.restore_orchestrator(config, &state)?;
                    orchestrator.handle_party_input(input)?;
                    Ok::<_, SandboxError>((orchestrator.export_state()?, ()))
                },
            )
            .await?;
        self.schedule(DeferredTask::NotifyAllParties {
            sandbox_id: config.id.clone(),
            session_id: session_id.to_string(),
        })
    }

    async fn record_exchange(
        &self,
        config: &SandboxConfiguration,
        session_id: &str,
        exchange: ConformanceExchange,
    ) -> Result<(), SandboxError> {
        let partition = session_partition(session_id);
        self.documents
            .set_item(
                &partition,
                &exchange_sort_key(OffsetDateTime::now_utc(), exchange.uuid),
                serde_json::to_value(&exchange)?,
            )
            .await?;
        let matched = self
            .executor
            .execute(
                "handle exchange",
                &partition,
                ORCHESTRATOR_SORT_KEY,
                Value::Null,
                move |state| async move {
                    let mut orchestrator = self.restore_orchestrator(config, &state)?;
                    let matched = orchestrator.handle_exchange(&exchange)?;
                    Ok::<_, SandboxError>((orchestrator.export_state()?, matched))
                },
            )
            .await?;
        if matched {
            self.schedule(DeferredTask::NotifyAllParties {
                sandbox_id: config.id.clone(),
                session_id: session_id.to_string(),
            })?;
        }
        Ok(())
    }

    // ── Parties ──────────────────────────────────────────────────────────────

    fn create_party(
        &self,
        config: &SandboxConfiguration,
        party_name: &str,
    ) -> Result<Box<dyn ConformanceParty>, SandboxError> {
        self.factory
            .create_parties(&config.parties, &config.counterparts)?
            .into_iter()
            .find(|party| party.name() == party_name)
            .ok_or_else(|| SandboxError::UnknownParty {
                sandbox_id: config.id.clone(),
                party: party_name.to_string(),
            })
    }

    fn restore_party(
        &self,
        config: &SandboxConfiguration,
        party_name: &str,
        state: &Value,
    ) -> Result<Box<dyn ConformanceParty>, SandboxError> {
        let mut party = self.create_party(config, party_name)?;
        if !state.is_null() {
            party.import_state(state)?;
        }
        Ok(party)
    }

    /// Operator log of an in-sandbox party in the running session.
    pub async fn party_operator_log(
        &self,
        sandbox_id: &str,
        party_name: &str,
    ) -> Result<Vec<String>, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        let session_id = self.running_session(sandbox_id).await?;
        let state = self
            .executor
            .map()
            .peek(&session_partition(&session_id), &party_sort_key(party_name))
            .await?
            .unwrap_or(Value::Null);
        Ok(self.restore_party(&config, party_name, &state)?.operator_log())
    }

    /// Deliver an inbound request to an in-sandbox party and record the
    /// exchange.
    pub async fn handle_party_request(
        &self,
        sandbox_id: &str,
        party_name: &str,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        let session_id = self.running_session(sandbox_id).await?;
        let response = self
            .party_handle_request(&config, &session_id, party_name, &request)
            .await?;
        let exchange = ConformanceExchange::new(request, response.clone());
        self.record_exchange(&config, &session_id, exchange).await?;
        Ok(response)
    }

    async fn party_handle_request(
        &self,
        config: &SandboxConfiguration,
        session_id: &str,
        party_name: &str,
        request: &ConformanceRequest,
    ) -> Result<ConformanceResponse, SandboxError> {
        if !require_party(config, party_name)?.in_sandbox {
            return Err(SandboxError::UnknownParty {
                sandbox_id: config.id.clone(),
                party: party_name.to_string(),
            });
        }
        tracing::debug!(
            sandbox_id = %config.id,
            party = party_name,
            method = %request.method,
            url = %request.url,
            "inbound party request"
        );
        self.executor
            .execute(
                "handle party request",
                &session_partition(session_id),
                &party_sort_key(party_name),
                Value::Null,
                move |state| async move {
                    let mut party = self.restore_party(config, party_name, &state)?;
                    let response = party.handle_request(request).await?;
                    Ok::<_, SandboxError>((party.export_state()?, response))
                },
            )
            .await
    }

    async fn notify_party(
        &self,
        config: &SandboxConfiguration,
        session_id: &str,
        party_name: &str,
    ) -> Result<(), SandboxError> {
        let prompts = self
            .peek_orchestrator(config, session_id)
            .await?
            .party_prompt(party_name);
        if prompts.is_empty() {
            return Ok(());
        }
        let failure = self
            .executor
            .execute(
                "notify party",
                &session_partition(session_id),
                &party_sort_key(party_name),
                Value::Null,
                move |state| async move {
                    let mut party = self.restore_party(config, party_name, &state)?;
                    let outbound = SandboxOutbound {
                        sandbox: self,
                        config,
                        session_id,
                    };
                    let mut failure = None;
                    for prompt in &prompts {
                        if let Err(e) = party.handle_prompt(prompt, &outbound).await {
                            tracing::warn!(
                                sandbox_id = %config.id,
                                party = party_name,
                                action = %prompt["actionPath"],
                                error = %e,
                                "party could not act on prompt"
                            );
                            failure.get_or_insert(e);
                        }
                    }
                    Ok::<_, SandboxError>((party.export_state()?, failure))
                },
            )
            .await?;
        // The party state is saved either way; the failed prompt stays
        // unhandled until the next notification.
        match failure {
            Some(e) => Err(SandboxError::Engine(e)),
            None => Ok(()),
        }
    }

    // ── Deferred tasks ───────────────────────────────────────────────────────

    fn schedule(&self, task: DeferredTask) -> Result<(), SandboxError> {
        self.tasks.schedule(task.to_payload()?);
        Ok(())
    }

    /// Run one deferred task. Tasks for a session that is no longer the
    /// sandbox's current one are dropped.
    pub async fn execute_task(&self, payload: &Value) -> Result<(), SandboxError> {
        let task = DeferredTask::from_payload(payload)?;
        let config = match self.configuration(task.sandbox_id()).await {
            Ok(config) => config,
            Err(SandboxError::UnknownSandbox(sandbox_id)) => {
                tracing::warn!(sandbox_id = %sandbox_id, "dropping task for unknown sandbox");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let current = self.session_pointer(&config.id).await?.current_session_id;
        if current.as_deref() != Some(task.session_id()) {
            tracing::info!(
                sandbox_id = %config.id,
                session_id = task.session_id(),
                current_session_id = ?current,
                "dropping task for stale session"
            );
            return Ok(());
        }

        match task {
            DeferredTask::NotifyAllParties { sandbox_id, session_id } => {
                for party in config.in_sandbox_parties() {
                    self.schedule(DeferredTask::NotifyParty {
                        sandbox_id: sandbox_id.clone(),
                        session_id: session_id.clone(),
                        party_name: party.name.clone(),
                    })?;
                }
                Ok(())
            }
            DeferredTask::NotifyParty {
                session_id,
                party_name,
                ..
            } => self.notify_party(&config, &session_id, &party_name).await,
        }
    }

    // ── Reports ──────────────────────────────────────────────────────────────

    /// Per-role reports of the running session, or of the last one when the
    /// sandbox is stopped. Without `roles` the configured tested roles are
    /// reported, and without those every role of the standard. Actions
    /// whose checks the reports evaluated are marked checked.
    pub async fn report(
        &self,
        sandbox_id: &str,
        roles: &[String],
    ) -> Result<Vec<RoleReport>, SandboxError> {
        let config = self.configuration(sandbox_id).await?;
        let pointer = self.session_pointer(sandbox_id).await?;
        let session_id = pointer
            .current_session_id
            .or(pointer.last_session_id)
            .ok_or_else(|| SandboxError::NotRunning(sandbox_id.to_string()))?;

        let role_names = self.factory.role_names();
        if let Some(unknown) = roles.iter().find(|r| !role_names.contains(&r.as_str())) {
            return Err(SandboxError::InvalidRequest(format!(
                "'{}' is not a role of {}",
                unknown,
                self.factory.report_title()
            )));
        }
        let roles: Vec<String> = if !roles.is_empty() {
            roles.to_vec()
        } else if !config.tested_roles.is_empty() {
            config.tested_roles.clone()
        } else {
            role_names.iter().map(|r| r.to_string()).collect()
        };
        let title = self.factory.report_title();
        let config = &config;
        let session = session_id.as_str();
        self.executor
            .execute(
                "report",
                &session_partition(session),
                ORCHESTRATOR_SORT_KEY,
                Value::Null,
                move |state| async move {
                    let mut orchestrator = self.restore_orchestrator(config, &state)?;
                    let traffic = self.recorded_traffic(session).await?;
                    let version = self.factory.expected_api_version();
                    let reports: Vec<RoleReport> = roles
                        .into_iter()
                        .map(|role| RoleReport {
                            report: orchestrator.report(&title, version, &role, &traffic),
                            role,
                        })
                        .collect();
                    orchestrator.mark_checked();
                    Ok::<_, SandboxError>((orchestrator.export_state()?, reports))
                },
            )
            .await
    }

    async fn recorded_traffic(&self, session_id: &str) -> Result<TrafficRecorder, SandboxError> {
        Ok(self
            .documents
            .get_partition_values_by_sort_key_prefix(
                &session_partition(session_id),
                EXCHANGE_SORT_KEY_PREFIX,
            )
            .await?
            .into_iter()
            .map(serde_json::from_value::<ConformanceExchange>)
            .collect::<Result<TrafficRecorder, _>>()?)
    }
}

fn require_party<'c>(
    config: &'c SandboxConfiguration,
    party_name: &str,
) -> Result<&'c PartyConfiguration, SandboxError> {
    config.party(party_name).ok_or_else(|| SandboxError::UnknownParty {
        sandbox_id: config.id.clone(),
        party: party_name.to_string(),
    })
}

fn into_engine_error(e: SandboxError) -> EngineError {
    match e {
        SandboxError::Engine(e) => e,
        other => EngineError::Outbound(other.to_string()),
    }
}

// ── Outbound routing ─────────────────────────────────────────────────────────

/// What a party may call while acting on a prompt: other in-sandbox
/// parties directly, external counterparts over the transport, and its own
/// session's orchestrator for input.
struct SandboxOutbound<'a, F: ComponentFactory> {
    sandbox: &'a Sandbox<F>,
    config: &'a SandboxConfiguration,
    session_id: &'a str,
}

#[async_trait]
impl<'a, F: ComponentFactory> PartyOutbound for SandboxOutbound<'a, F> {
    async fn send_request(
        &self,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError> {
        let target = request.message.target_party_name.clone();
        let party = require_party(self.config, &target).map_err(into_engine_error)?;
        let response = if party.in_sandbox {
            self.sandbox
                .party_handle_request(self.config, self.session_id, &target, &request)
                .await
        } else {
            match self.config.counterpart(&target) {
                Some(counterpart) => {
                    self.sandbox.transport.send(counterpart, request.clone()).await
                }
                None => Err(SandboxError::UnknownParty {
                    sandbox_id: self.config.id.clone(),
                    party: target.clone(),
                }),
            }
        }
        .map_err(into_engine_error)?;

        let exchange = ConformanceExchange::new(request, response.clone());
        self.sandbox
            .record_exchange(self.config, self.session_id, exchange)
            .await
            .map_err(into_engine_error)?;
        Ok(response)
    }

    async fn post_input(&self, action_id: Uuid, input: Value) -> Result<(), EngineError> {
        let input = json!({ "actionId": action_id, "input": input });
        self.sandbox
            .apply_party_input(self.config, self.session_id, &input)
            .await
            .map_err(into_engine_error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::config::OrchestratorConfiguration;
    use crate::tasks::ManualTaskQueue;
    use quayside_core::{ActionState, CounterpartConfiguration};
    use quayside_pint::{PintComponentFactory, RECEIVING_PLATFORM, SENDING_PLATFORM};

    fn sandbox(tasks: Arc<ManualTaskQueue>) -> Sandbox<PintComponentFactory> {
        let factory = Arc::new(PintComponentFactory::new().unwrap());
        Sandbox::in_memory(factory, MemoryLockingMap::default(), tasks)
    }

    fn configuration(receiver_in_sandbox: bool) -> SandboxConfiguration {
        serde_json::from_value(json!({
            "id": "sb-1",
            "name": "PINT",
            "standard": {"name": "PINT", "version": "3.0.0"},
            "orchestrator": {"maxParallelScenarios": 1},
            "parties": [
                {"name": "Sender1", "role": SENDING_PLATFORM},
                {"name": "Receiver1", "role": RECEIVING_PLATFORM, "inSandbox": receiver_in_sandbox}
            ],
            "counterparts": [
                {"name": "Receiver1", "role": RECEIVING_PLATFORM, "url": "http://127.0.0.1:9"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_rejects_a_foreign_standard() {
        let sandbox = sandbox(Arc::new(ManualTaskQueue::new()));
        let mut config = configuration(true);
        config.standard.name = "Booking".into();
        let err = sandbox.create(config).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn external_party_needs_a_counterpart() {
        let sandbox = sandbox(Arc::new(ManualTaskQueue::new()));
        let mut config = configuration(false);
        config.counterparts.clear();
        let err = sandbox.create(config).await.unwrap_err();
        assert!(err.to_string().contains("no counterpart configuration"));
    }

    #[tokio::test]
    async fn create_starts_a_session_and_schedules_notification() {
        let tasks = Arc::new(ManualTaskQueue::new());
        let sandbox = sandbox(tasks.clone());
        sandbox.create(configuration(true)).await.unwrap();
        assert_eq!(tasks.len(), 1);
        let status = sandbox.status("sb-1").await.unwrap();
        assert!(status["scenariosLeft"].as_u64().unwrap() > 0);
        assert!(sandbox.create(configuration(true)).await.is_err());
    }

    #[tokio::test]
    async fn tasks_of_a_replaced_session_are_dropped() {
        let tasks = Arc::new(ManualTaskQueue::new());
        let sandbox = sandbox(tasks.clone());
        sandbox.create(configuration(true)).await.unwrap();
        let first = sandbox.session_pointer("sb-1").await.unwrap().current_session_id.unwrap();
        let second = sandbox.reset("sb-1").await.unwrap();
        assert_ne!(first, second);

        let stale = DeferredTask::NotifyAllParties {
            sandbox_id: "sb-1".into(),
            session_id: first,
        };
        let before = tasks.len();
        sandbox.execute_task(&stale.to_payload().unwrap()).await.unwrap();
        assert_eq!(tasks.len(), before);
    }

    #[tokio::test]
    async fn stopped_sandbox_rejects_input_but_still_reports() {
        let sandbox = sandbox(Arc::new(ManualTaskQueue::new()));
        sandbox.create(configuration(true)).await.unwrap();
        sandbox.stop("sb-1").await.unwrap();

        let err = sandbox
            .party_input("sb-1", &json!({ "actionId": Uuid::new_v4(), "input": {} }))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(sandbox.status("sb-1").await.unwrap(), json!({ "scenariosLeft": 0 }));

        let reports = sandbox.report("sb-1", &[]).await.unwrap();
        assert_eq!(reports.len(), 2);

        let err = sandbox.report("sb-1", &["Carrier".to_string()]).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn reporting_marks_satisfied_actions_checked() {
        let tasks = Arc::new(ManualTaskQueue::new());
        let sandbox = sandbox(tasks.clone());
        let config = sandbox.create(configuration(true)).await.unwrap();
        tasks.drain(&sandbox, 100_000).await.unwrap();
        let session_id = sandbox
            .session_pointer("sb-1")
            .await
            .unwrap()
            .current_session_id
            .unwrap();
        let states = |orchestrator: Orchestrator<_>| -> Vec<ActionState> {
            orchestrator
                .scenarios()
                .iter()
                .flat_map(|scenario| scenario.actions().iter().map(|a| a.core().state()))
                .collect()
        };

        let before = states(sandbox.peek_orchestrator(&config, &session_id).await.unwrap());
        assert!(before.iter().all(|state| *state == ActionState::Satisfied));

        sandbox.report("sb-1", &[]).await.unwrap();
        let after = states(sandbox.peek_orchestrator(&config, &session_id).await.unwrap());
        assert_eq!(after.len(), before.len());
        assert!(after.iter().all(|state| *state == ActionState::Checked));
        assert_eq!(sandbox.status("sb-1").await.unwrap(), json!({ "scenariosLeft": 0 }));
    }

    #[tokio::test]
    async fn unknown_sandbox_and_party_are_not_found() {
        let sandbox = sandbox(Arc::new(ManualTaskQueue::new()));
        assert_eq!(sandbox.status("nope").await.unwrap_err().status_code(), 404);
        sandbox.create(configuration(true)).await.unwrap();
        let err = sandbox.party_prompt("sb-1", "Nobody").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    /// Fails the first call, then answers every request with `200`.
    #[derive(Default)]
    struct FlakyTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeTransport for FlakyTransport {
        async fn send(
            &self,
            counterpart: &CounterpartConfiguration,
            request: ConformanceRequest,
        ) -> Result<ConformanceResponse, SandboxError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SandboxError::Transport {
                    url: counterpart.url.clone(),
                    message: "connection refused".into(),
                });
            }
            Ok(request
                .create_response(200)
                .with_header("Api-Version", "3.0.0")
                .with_body(json!({ "partyName": "Jane Doe" })))
        }
    }

    #[tokio::test]
    async fn failed_prompt_is_retried_on_the_next_notification() {
        let tasks = Arc::new(ManualTaskQueue::new());
        let transport = Arc::new(FlakyTransport::default());
        let sandbox = Sandbox::new(
            Arc::new(PintComponentFactory::new().unwrap()),
            StatefulExecutor::new(Arc::new(MemoryLockingMap::default()), RetryPolicy::default()),
            Arc::new(MemoryNonLockingMap::new()),
            tasks.clone(),
            transport.clone(),
        );
        let mut config = configuration(false);
        config.orchestrator = Some(OrchestratorConfiguration {
            max_parallel_scenarios: 100,
        });
        sandbox.create(config).await.unwrap();
        tasks.drain(&sandbox, 1_000).await.unwrap();

        let prompts = sandbox.party_prompt("sb-1", "Receiver1").await.unwrap();
        let validation = prompts
            .iter()
            .find(|prompt| prompt["actionType"] == "SupplyValidationParameters")
            .unwrap();
        sandbox
            .party_input(
                "sb-1",
                &json!({
                    "actionId": validation["actionId"],
                    "input": {"codeListProvider": "EPUI", "partyCode": "12345-jane-doe"},
                }),
            )
            .await
            .unwrap();

        let err = tasks.drain(&sandbox, 1_000).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"), "{err}");
        assert_eq!(err.status_code(), 500);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let log = sandbox.party_operator_log("sb-1", "Sender1").await.unwrap();
        assert!(log.iter().any(|line| line.starts_with("Failed to handle ReceiverValidation")));

        let session_id = sandbox
            .session_pointer("sb-1")
            .await
            .unwrap()
            .current_session_id
            .unwrap();
        let again = DeferredTask::NotifyParty {
            sandbox_id: "sb-1".into(),
            session_id,
            party_name: "Sender1".into(),
        };
        sandbox.execute_task(&again.to_payload().unwrap()).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let log = sandbox.party_operator_log("sb-1", "Sender1").await.unwrap();
        let expected = "Asked for validation of party '12345-jane-doe': response status 200";
        assert!(log.iter().any(|line| line == expected));
    }
}
