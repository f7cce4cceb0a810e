//! Deferred work.
//!
//! A task is a JSON payload handed to a queue and later passed back to
//! [`Sandbox::execute_task`]. Nothing else travels with it: the sandbox
//! reloads whatever state the task needs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use quayside_core::ComponentFactory;

use crate::error::SandboxError;
use crate::sandbox::Sandbox;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all_fields = "camelCase")]
pub enum DeferredTask {
    /// Schedule a `NotifyParty` for every in-sandbox party.
    NotifyAllParties { sandbox_id: String, session_id: String },
    /// Let one party act on its pending prompts.
    NotifyParty {
        sandbox_id: String,
        session_id: String,
        party_name: String,
    },
}

impl DeferredTask {
    pub fn sandbox_id(&self) -> &str {
        match self {
            DeferredTask::NotifyAllParties { sandbox_id, .. }
            | DeferredTask::NotifyParty { sandbox_id, .. } => sandbox_id,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            DeferredTask::NotifyAllParties { session_id, .. }
            | DeferredTask::NotifyParty { session_id, .. } => session_id,
        }
    }

    pub fn to_payload(&self) -> Result<Value, SandboxError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_payload(payload: &Value) -> Result<Self, SandboxError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| SandboxError::InvalidRequest(format!("invalid task payload: {e}")))
    }
}

/// Where deferred task payloads go.
pub trait TaskQueue: Send + Sync + 'static {
    fn schedule(&self, payload: Value);
}

// ── Tokio queue ──────────────────────────────────────────────────────────────

/// Queue backed by a channel. Payloads are executed by a [`TaskWorker`]
/// after a short delay, each on its own tokio task.
pub struct TokioTaskQueue {
    sender: mpsc::UnboundedSender<Value>,
}

impl TokioTaskQueue {
    pub fn new(delay: Duration) -> (Self, TaskWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, TaskWorker { receiver, delay })
    }
}

impl TaskQueue for TokioTaskQueue {
    fn schedule(&self, payload: Value) {
        if self.sender.send(payload).is_err() {
            tracing::warn!("task worker has stopped, dropping deferred task");
        }
    }
}

pub struct TaskWorker {
    receiver: mpsc::UnboundedReceiver<Value>,
    delay: Duration,
}

impl TaskWorker {
    /// Run until every queue handle is dropped.
    pub async fn run<F: ComponentFactory>(mut self, sandbox: Arc<Sandbox<F>>) {
        while let Some(payload) = self.receiver.recv().await {
            let sandbox = Arc::clone(&sandbox);
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = sandbox.execute_task(&payload).await {
                    tracing::error!(error = %e, task = %payload, "deferred task failed");
                }
            });
        }
        tracing::debug!("task worker stopped");
    }
}

// ── Manual queue ─────────────────────────────────────────────────────────────

/// Queue that only runs when drained. Used by tests and by `quayside run`
/// to step a sandbox deterministically.
#[derive(Default)]
pub struct ManualTaskQueue {
    pending: Mutex<VecDeque<Value>>,
}

impl ManualTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<Value> {
        self.pending.lock().ok().and_then(|mut p| p.pop_front())
    }

    /// Execute queued tasks in order, including the ones they schedule, until
    /// the queue is empty or `max_tasks` have run. Returns how many ran.
    pub async fn drain<F: ComponentFactory>(
        &self,
        sandbox: &Sandbox<F>,
        max_tasks: usize,
    ) -> Result<usize, SandboxError> {
        let mut executed = 0;
        while executed < max_tasks {
            let Some(payload) = self.pop() else {
                break;
            };
            sandbox.execute_task(&payload).await?;
            executed += 1;
        }
        Ok(executed)
    }
}

impl TaskQueue for ManualTaskQueue {
    fn schedule(&self, payload: Value) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push_back(payload),
            Err(_) => tracing::error!("task queue mutex poisoned, dropping deferred task"),
        }
    }
}
