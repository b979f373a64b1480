//! Application state.

use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The stack lifecycle orchestrator.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
