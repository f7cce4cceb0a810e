#![allow(clippy::result_large_err)]
//! quayside-sandbox: persisted conformance sandboxes.
//!
//! A [`Sandbox`] runs the scenarios of one [`ComponentFactory`] against the
//! parties of a [`SandboxConfiguration`]. Each call is stateless: the
//! orchestrator and the parties are rebuilt from the factory and their
//! exported state is loaded from the store, mutated under lock and saved.
//! Work that must happen later (parties acting on prompts) is queued as a
//! [`DeferredTask`] payload.
//!
//! [`ComponentFactory`]: quayside_core::ComponentFactory

mod config;
mod error;
pub mod keys;
mod orchestrator;
mod sandbox;
mod tasks;
mod transport;

pub use config::{OrchestratorConfiguration, SandboxConfiguration, StandardConfiguration};
pub use error::SandboxError;
pub use orchestrator::Orchestrator;
pub use sandbox::{RoleReport, Sandbox};
pub use tasks::{DeferredTask, ManualTaskQueue, TaskQueue, TaskWorker, TokioTaskQueue};
pub use transport::{counterpart_url, ExchangeTransport, UreqTransport};
