//! Application state.

use std::sync::Arc;

use quayside_pint::PintComponentFactory;
use quayside_sandbox::Sandbox;

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) sandbox: Arc<Sandbox<PintComponentFactory>>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
