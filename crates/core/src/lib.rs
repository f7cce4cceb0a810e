#![allow(clippy::result_large_err)]
//! quayside-core: scenario engine for API conformance sandboxes.
//!
//! A standard is described by a [`ComponentFactory`]: its parties, and the
//! scenario graphs those parties walk through. Scenarios are chains of
//! [`ConformanceAction`]s built by a [`ScenarioListBuilder`]. Every captured
//! exchange is checked by a tree of [`ConformanceCheck`]s whose outcomes are
//! folded into a [`ConformanceReport`].
//!
//! # Public API
//!
//! - [`scenario`] -- actions, context layers, the graph builder
//! - [`check`] -- check tree, standard leaf checks, schema validators
//! - [`traffic`] -- exchange model and recorder
//! - [`party`] -- party trait, operator log, outbound calls
//! - [`report`] -- statuses, detailed reports, digests

pub mod check;
mod error;
mod factory;
pub mod party;
pub mod report;
pub mod scenario;
pub mod traffic;

// ── Convenience re-exports ───────────────────────────────────────────

pub use check::{CheckOutcome, ConformanceCheck, Violations};
pub use error::EngineError;
pub use factory::{ComponentFactory, PartyNames};
pub use party::{
    ConformanceParty, CounterpartConfiguration, PartyConfiguration, PartyCore, PartyOutbound,
};
pub use report::{ConformanceReport, ConformanceStatus, ReportDigest};
pub use scenario::{
    ActionCore, ActionState, BusinessKey, Capabilities, ConformanceAction, ConformanceScenario,
    ContextLayer, ScenarioListBuilder, ScenarioModule,
};
pub use traffic::{
    ConformanceExchange, ConformanceMessage, ConformanceRequest, ConformanceResponse,
    HttpMessageType, TrafficRecorder, API_VERSION_HEADER,
};
