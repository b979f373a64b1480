//! The stack engine contract.

use std::sync::Arc;

use async_trait::async_trait;
use sitedeck_core::{
    EngineError, EngineResult, OutputMap, Program, StackSummary, UpResult, UpdateSummary,
};
use tokio::sync::mpsc::UnboundedSender;

/// Receives engine progress lines while an operation runs.
pub type OutputSink = UnboundedSender<String>;

/// Longest accepted stack name.
pub const MAX_STACK_NAME_LEN: usize = 100;

/// A workspace that owns named stacks grouped by project.
///
/// Every call may take seconds to minutes against a real backend.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Register a new, empty stack bound to `program`.
    async fn create_stack(
        &self,
        project: &str,
        name: &str,
        program: Arc<dyn Program>,
    ) -> EngineResult<Box<dyn Stack>>;

    /// Select an existing stack, binding `program` for subsequent deploys.
    async fn select_stack(
        &self,
        project: &str,
        name: &str,
        program: Arc<dyn Program>,
    ) -> EngineResult<Box<dyn Stack>>;

    /// All stacks registered for `project`.
    async fn list_stacks(&self, project: &str) -> EngineResult<Vec<StackSummary>>;

    /// Drop a stack's bookkeeping entry. The stack must hold no resources.
    async fn remove_stack(&self, project: &str, name: &str) -> EngineResult<()>;
}

/// Handle to a selected stack.
#[async_trait]
pub trait Stack: Send + Sync {
    /// The stack name.
    fn name(&self) -> &str;

    /// Set a per-stack configuration value.
    async fn set_config(&self, key: &str, value: &str) -> EngineResult<()>;

    /// Deploy the bound program, streaming progress to `on_output`.
    async fn up(&self, on_output: OutputSink) -> EngineResult<UpResult>;

    /// Tear down every resource the stack holds.
    async fn destroy(&self, on_output: OutputSink) -> EngineResult<UpdateSummary>;

    /// Outputs of the last successful deploy.
    async fn outputs(&self) -> EngineResult<OutputMap>;
}

/// Check a stack name against the engine's naming rules.
pub fn validate_stack_name(name: &str) -> EngineResult<()> {
    let invalid = |reason: &str| EngineError::InvalidStackName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_STACK_NAME_LEN {
        return Err(invalid("name must be at most 100 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "name may only contain alphanumerics, hyphens, underscores, or periods",
        ));
    }
    Ok(())
}
