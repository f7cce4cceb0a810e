//! Scenario graphs: actions, their context layers, the builder that wires
//! them into trees, and the scenarios walked at runtime.

mod action;
mod builder;
mod context;
mod instance;

pub use action::{ActionCore, ActionState, BusinessKey, Capabilities, ConformanceAction};
pub use builder::{ActionFactory, ScenarioListBuilder, ScenarioModule};
pub use context::{overlay_field, resolve, ContextLayer};
pub use instance::ConformanceScenario;
