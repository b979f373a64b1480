//! Stack lifecycle orchestration.
//!
//! Maps the five site operations onto engine calls. The engine owns all
//! stack state and the per-stack update lock; nothing here caches, queues
//! or retries. Engine failures are classified per operation and returned
//! as they are.

use std::sync::Arc;

use sitedeck_core::{
    EngineError, NoopProgram, Operation, OutputMap, OutputValue, Result, SiteError, SiteOutput,
    StackSummary, StaticSite, REGION_CONFIG_KEY, WEBSITE_URL_OUTPUT,
};
use sitedeck_workspace::{OutputSink, Stack, Workspace};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument};

/// Orchestrates site stacks for one project.
pub struct Orchestrator {
    workspace: Arc<dyn Workspace>,
    project: String,
    region: String,
}

impl Orchestrator {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        project: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            workspace,
            project: project.into(),
            region: region.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Names of every stack in the project.
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn list(&self) -> Result<Vec<String>> {
        let stacks = self
            .workspace
            .list_stacks(&self.project)
            .await
            .map_err(|e| fail(Operation::List, e))?;
        Ok(stacks.into_iter().map(|s| s.name).collect())
    }

    /// Summaries of every stack in the project, most recently updated first.
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn summaries(&self) -> Result<Vec<StackSummary>> {
        let mut stacks = self
            .workspace
            .list_stacks(&self.project)
            .await
            .map_err(|e| fail(Operation::List, e))?;
        stacks.sort_by(|a, b| b.last_update.cmp(&a.last_update));

        let busy = stacks.iter().filter(|s| s.status.is_busy()).count();
        debug!(total = stacks.len(), busy, "Listed stack summaries");
        Ok(stacks)
    }

    /// Published outputs of an existing stack.
    #[instrument(skip_all, fields(stack = %id))]
    pub async fn get(&self, id: &str) -> Result<SiteOutput> {
        let op = Operation::Get;
        let stack = self
            .workspace
            .select_stack(&self.project, id, Arc::new(NoopProgram))
            .await
            .map_err(|e| fail(op, e))?;
        let outputs = stack.outputs().await.map_err(|e| fail(op, e))?;
        site_output(id, &outputs)
    }

    /// Register a new stack and deploy `content` to it.
    #[instrument(skip_all, fields(stack = %id))]
    pub async fn create(&self, id: &str, content: &str) -> Result<SiteOutput> {
        let op = Operation::Create;
        let stack = self
            .workspace
            .create_stack(&self.project, id, Arc::new(StaticSite::new(content)))
            .await
            .map_err(|e| fail(op, e))?;
        info!("Stack registered, deploying");
        self.deploy(op, stack.as_ref()).await
    }

    /// Replace the content of an existing stack.
    #[instrument(skip_all, fields(stack = %id))]
    pub async fn update(&self, id: &str, content: &str) -> Result<SiteOutput> {
        let op = Operation::Update;
        let stack = self
            .workspace
            .select_stack(&self.project, id, Arc::new(StaticSite::new(content)))
            .await
            .map_err(|e| fail(op, e))?;
        self.deploy(op, stack.as_ref()).await
    }

    /// Tear down a stack's resources and forget the stack.
    #[instrument(skip_all, fields(stack = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let op = Operation::Delete;
        let stack = self
            .workspace
            .select_stack(&self.project, id, Arc::new(NoopProgram))
            .await
            .map_err(|e| fail(op, e))?;

        let summary = stack
            .destroy(progress_sink(id))
            .await
            .map_err(|e| fail(op, e))?;
        self.workspace
            .remove_stack(&self.project, id)
            .await
            .map_err(|e| fail(op, e))?;

        info!(
            deleted = summary.resource_changes.delete,
            "Stack destroyed and removed"
        );
        Ok(())
    }

    async fn deploy(&self, op: Operation, stack: &dyn Stack) -> Result<SiteOutput> {
        stack
            .set_config(REGION_CONFIG_KEY, &self.region)
            .await
            .map_err(|e| fail(op, e))?;

        let result = stack
            .up(progress_sink(stack.name()))
            .await
            .map_err(|e| fail(op, e))?;

        info!(
            update_id = %result.summary.id,
            changed = result.summary.resource_changes.changed(),
            "Deploy complete"
        );
        site_output(stack.name(), &result.outputs)
    }
}

/// Build the caller-visible result from stack outputs.
fn site_output(id: &str, outputs: &OutputMap) -> Result<SiteOutput> {
    let url = outputs
        .get(WEBSITE_URL_OUTPUT)
        .and_then(OutputValue::as_str)
        .ok_or_else(|| SiteError::Engine {
            message: format!("stack \"{id}\" has no {WEBSITE_URL_OUTPUT} output"),
        })?;

    Ok(SiteOutput {
        id: id.to_string(),
        url: url.to_string(),
    })
}

fn fail(op: Operation, err: EngineError) -> SiteError {
    let kind = err.kind();
    let classified = SiteError::classify(op, err);
    match &classified {
        SiteError::Engine { message } => {
            error!(operation = ?op, kind, "Engine failure: {}", message)
        }
        other => debug!(
            operation = ?op,
            kind,
            retryable = other.is_retryable(),
            "Rejected: {}",
            other
        ),
    }
    classified
}

/// Forward engine progress lines to the log until the engine drops the sender.
fn progress_sink(stack: &str) -> OutputSink {
    let (tx, rx) = mpsc::unbounded_channel();
    let stack = stack.to_string();
    tokio::spawn(async move {
        let mut lines = UnboundedReceiverStream::new(rx);
        while let Some(line) = lines.next().await {
            info!(stack = %stack, "{}", line);
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use sitedeck_core::{EngineResult, Program, ResourceKind, StackStatus};
    use sitedeck_workspace::{Checkpoint, LocalWorkspace, LocalWorkspaceConfig};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(LocalWorkspace::new()), "test", "us-west-2")
    }

    async fn slow_orchestrator() -> Orchestrator {
        let ws = LocalWorkspace::open(LocalWorkspaceConfig {
            state_dir: None,
            deploy_latency: Duration::from_millis(100),
        })
        .await
        .unwrap();
        Orchestrator::new(Arc::new(ws), "test", "us-west-2")
    }

    fn not_found(id: &str) -> SiteError {
        SiteError::NotFound { id: id.to_string() }
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let orch = orchestrator();
        assert_eq!(orch.get("n").await.unwrap_err(), not_found("n"));
        assert_eq!(orch.update("n", "c").await.unwrap_err(), not_found("n"));
        assert_eq!(orch.delete("n").await.unwrap_err(), not_found("n"));
        assert!(orch.create("n", "c").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_existing_fails_regardless_of_content() {
        let orch = orchestrator();
        orch.create("n", "c").await.unwrap();

        for content in ["c", "different"] {
            assert_eq!(
                orch.create("n", content).await.unwrap_err(),
                SiteError::AlreadyExists {
                    id: "n".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_get_matches_latest_deploy() {
        let orch = orchestrator();
        let created = orch.create("site1", "<h1>hi</h1>").await.unwrap();
        assert_eq!(created.id, "site1");
        assert!(created.url.ends_with(".s3-website-us-west-2.amazonaws.com"));

        assert_eq!(orch.get("site1").await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::open(LocalWorkspaceConfig {
            state_dir: Some(dir.path().to_path_buf()),
            deploy_latency: Duration::ZERO,
        })
        .await
        .unwrap();
        let orch = Orchestrator::new(Arc::new(ws), "test", "us-west-2");

        orch.create("n", "c1").await.unwrap();
        let updated = orch.update("n", "c2").await.unwrap();
        assert_eq!(orch.get("n").await.unwrap(), updated);

        let bytes = std::fs::read(dir.path().join("test").join("n.json")).unwrap();
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes).unwrap();
        let index = checkpoint
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::BucketObject)
            .unwrap();
        assert_eq!(index.inputs["content"], "c2");
    }

    #[tokio::test]
    async fn test_delete_frees_name() {
        let orch = orchestrator();
        orch.create("n", "c").await.unwrap();
        orch.delete("n").await.unwrap();

        assert_eq!(orch.get("n").await.unwrap_err(), not_found("n"));
        assert!(orch.create("n", "new content").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_updates_one_conflicts() {
        let orch = slow_orchestrator().await;
        orch.create("n", "c").await.unwrap();

        let (a, b) = tokio::join!(orch.update("n", "x"), orch.update("n", "y"));
        let conflict = SiteError::Conflict { id: "n".to_string() };
        match (a, b) {
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => assert_eq!(e, conflict),
            (a, b) => panic!("expected exactly one success, got {a:?} and {b:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_during_update_conflicts() {
        let orch = slow_orchestrator().await;
        orch.create("n", "c").await.unwrap();

        let (a, b) = tokio::join!(orch.update("n", "x"), orch.delete("n"));
        let conflict = SiteError::Conflict { id: "n".to_string() };
        match (a, b) {
            (Ok(_), Err(e)) => assert_eq!(e, conflict),
            (Err(e), Ok(())) => assert_eq!(e, conflict),
            (a, b) => panic!("expected exactly one success, got {a:?} and {b:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_after_delete() {
        let orch = orchestrator();
        orch.create("a", "a").await.unwrap();
        orch.create("b", "b").await.unwrap();
        orch.delete("a").await.unwrap();

        assert_eq!(orch.list().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_summaries_most_recent_first() {
        let orch = orchestrator();
        orch.create("a", "a").await.unwrap();
        orch.create("b", "b").await.unwrap();

        let names = |stacks: &[StackSummary]| -> Vec<String> {
            stacks.iter().map(|s| s.name.clone()).collect()
        };
        assert_eq!(names(&orch.summaries().await.unwrap()), vec!["b", "a"]);

        orch.update("a", "a2").await.unwrap();
        let stacks = orch.summaries().await.unwrap();
        assert_eq!(names(&stacks), vec!["a", "b"]);
        assert!(stacks
            .iter()
            .all(|s| s.status == StackStatus::Active && s.resource_count == 3));
    }

    #[tokio::test]
    async fn test_invalid_name_is_an_engine_failure() {
        let orch = orchestrator();
        assert!(matches!(
            orch.create("not valid", "c").await.unwrap_err(),
            SiteError::Engine { .. }
        ));
    }

    /// Engine whose backend is unreachable.
    struct UnreachableWorkspace;

    #[async_trait]
    impl Workspace for UnreachableWorkspace {
        async fn create_stack(
            &self,
            _project: &str,
            _name: &str,
            _program: Arc<dyn Program>,
        ) -> EngineResult<Box<dyn Stack>> {
            Err(EngineError::Backend("connection refused".to_string()))
        }

        async fn select_stack(
            &self,
            _project: &str,
            _name: &str,
            _program: Arc<dyn Program>,
        ) -> EngineResult<Box<dyn Stack>> {
            Err(EngineError::Backend("connection refused".to_string()))
        }

        async fn list_stacks(&self, _project: &str) -> EngineResult<Vec<StackSummary>> {
            Err(EngineError::Backend("connection refused".to_string()))
        }

        async fn remove_stack(&self, _project: &str, _name: &str) -> EngineResult<()> {
            Err(EngineError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_backend_failures_are_unclassified() {
        let orch = Orchestrator::new(Arc::new(UnreachableWorkspace), "test", "us-west-2");
        let expected = SiteError::Engine {
            message: "backend error: connection refused".to_string(),
        };

        assert_eq!(orch.list().await.unwrap_err(), expected);
        assert_eq!(orch.get("n").await.unwrap_err(), expected);
        assert_eq!(orch.create("n", "c").await.unwrap_err(), expected);
        assert_eq!(orch.delete("n").await.unwrap_err(), expected);
    }

    #[test]
    fn test_missing_website_url_is_engine_failure() {
        let err = site_output("n", &OutputMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "stack \"n\" has no websiteUrl output");
    }
}
