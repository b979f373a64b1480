//! In-process stack engine.
//!
//! `LocalWorkspace` keeps stack checkpoints in memory, optionally mirrored
//! to a state directory, and deploys programs through the simulated
//! provider. Mutations on one stack are serialized by its update lock;
//! different stacks proceed independently.
//!
//! The stack map lock is only held to look up or register an entry. Each
//! entry guards its own checkpoint, and a new checkpoint replaces the stored
//! one only after it has been persisted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sitedeck_core::{
    EngineError, EngineResult, OutputMap, Program, StackStatus, StackSummary, UpResult,
    UpdateKind, UpdateSummary, REGION_CONFIG_KEY,
};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::deploy::{self, emit};
use crate::lock::{UpdateGuard, UpdateLock};
use crate::workspace::{validate_stack_name, OutputSink, Stack, Workspace};

/// Configuration for a [`LocalWorkspace`].
#[derive(Debug, Clone, Default)]
pub struct LocalWorkspaceConfig {
    /// Directory for checkpoint files. `None` keeps state in memory only.
    pub state_dir: Option<PathBuf>,

    /// Simulated provisioning time for every `up` and `destroy`.
    pub deploy_latency: Duration,
}

type StackKey = (String, String);

fn key(project: &str, name: &str) -> StackKey {
    (project.to_string(), name.to_string())
}

fn not_found(key: &StackKey) -> EngineError {
    EngineError::StackNotFound {
        name: key.1.clone(),
    }
}

struct StackEntry {
    /// `None` once the stack has been removed.
    checkpoint: Mutex<Option<Checkpoint>>,
    lock: UpdateLock,
}

impl StackEntry {
    fn new(checkpoint: Checkpoint) -> Arc<Self> {
        Arc::new(Self {
            checkpoint: Mutex::new(Some(checkpoint)),
            lock: UpdateLock::default(),
        })
    }

    fn status(&self, checkpoint: &Checkpoint) -> StackStatus {
        match self.lock.current() {
            Some(UpdateKind::Destroy) => StackStatus::Destroying,
            Some(UpdateKind::Update) if checkpoint.has_deployed() => StackStatus::Updating,
            Some(UpdateKind::Update) => StackStatus::Provisioning,
            None if checkpoint.has_deployed() => StackStatus::Active,
            None => StackStatus::Provisioning,
        }
    }

    async fn summary(&self) -> Option<StackSummary> {
        let slot = self.checkpoint.lock().await;
        let checkpoint = slot.as_ref()?;
        Some(StackSummary {
            name: checkpoint.name.clone(),
            status: self.status(checkpoint),
            last_update: checkpoint.last_update(),
            resource_count: checkpoint.resources.len(),
        })
    }
}

struct Inner {
    stacks: RwLock<HashMap<StackKey, Arc<StackEntry>>>,
    store: Option<CheckpointStore>,
    deploy_latency: Duration,
}

impl Inner {
    async fn persist(&self, checkpoint: &Checkpoint) -> EngineResult<()> {
        match &self.store {
            Some(store) => store.save(checkpoint).await,
            None => Ok(()),
        }
    }

    async fn entry(&self, key: &StackKey) -> EngineResult<Arc<StackEntry>> {
        let stacks = self.stacks.read().await;
        stacks.get(key).cloned().ok_or_else(|| not_found(key))
    }

    /// Take the stack's update lock without waiting.
    async fn acquire(&self, key: &StackKey, kind: UpdateKind) -> EngineResult<UpdateGuard> {
        self.entry(key)
            .await?
            .lock
            .try_acquire(kind)
            .ok_or_else(|| EngineError::ConcurrentUpdate {
                name: key.1.clone(),
            })
    }

    async fn checkpoint(&self, key: &StackKey) -> EngineResult<Checkpoint> {
        let entry = self.entry(key).await?;
        let slot = entry.checkpoint.lock().await;
        slot.clone().ok_or_else(|| not_found(key))
    }

    /// Apply `f` to a copy of the checkpoint, persist it, then store it.
    ///
    /// A failed write leaves the stored checkpoint untouched.
    async fn commit<F>(&self, key: &StackKey, f: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let entry = self.entry(key).await?;
        let mut slot = entry.checkpoint.lock().await;
        let current = slot.as_ref().ok_or_else(|| not_found(key))?;

        let mut next = current.clone();
        f(&mut next);
        self.persist(&next).await?;
        *slot = Some(next);
        Ok(())
    }
}

/// An engine workspace running entirely inside this process.
#[derive(Clone)]
pub struct LocalWorkspace {
    inner: Arc<Inner>,
}

impl LocalWorkspace {
    /// Create an empty in-memory workspace.
    pub fn new() -> Self {
        Self::from_parts(HashMap::new(), LocalWorkspaceConfig::default())
    }

    /// Open a workspace, loading any checkpoints under the state directory.
    pub async fn open(config: LocalWorkspaceConfig) -> EngineResult<Self> {
        let mut stacks = HashMap::new();

        if let Some(dir) = &config.state_dir {
            let store = CheckpointStore::new(dir);
            for checkpoint in store.load_all().await? {
                debug!(
                    project = %checkpoint.project,
                    stack = %checkpoint.name,
                    "Loaded stack checkpoint"
                );
                stacks.insert(
                    key(&checkpoint.project, &checkpoint.name),
                    StackEntry::new(checkpoint),
                );
            }
            info!(
                "Opened workspace state at {} ({} stacks)",
                store.root().display(),
                stacks.len()
            );
        }

        Ok(Self::from_parts(stacks, config))
    }

    fn from_parts(
        stacks: HashMap<StackKey, Arc<StackEntry>>,
        config: LocalWorkspaceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                stacks: RwLock::new(stacks),
                store: config.state_dir.map(CheckpointStore::new),
                deploy_latency: config.deploy_latency,
            }),
        }
    }

    fn handle(&self, project: &str, name: &str, program: Arc<dyn Program>) -> Box<dyn Stack> {
        Box::new(LocalStack {
            key: key(project, name),
            program,
            inner: self.inner.clone(),
        })
    }
}

impl Default for LocalWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn create_stack(
        &self,
        project: &str,
        name: &str,
        program: Arc<dyn Program>,
    ) -> EngineResult<Box<dyn Stack>> {
        validate_stack_name(name)?;

        let key = key(project, name);
        let checkpoint = Checkpoint::new(project, name);
        let entry = StackEntry::new(checkpoint.clone());
        // Held until the first checkpoint is on disk, so other callers
        // that find the new entry wait for the outcome.
        let mut slot = entry.checkpoint.lock().await;
        {
            let mut stacks = self.inner.stacks.write().await;
            if stacks.contains_key(&key) {
                return Err(EngineError::StackAlreadyExists {
                    name: name.to_string(),
                });
            }
            stacks.insert(key.clone(), entry.clone());
        }

        if let Err(e) = self.inner.persist(&checkpoint).await {
            *slot = None;
            self.inner.stacks.write().await.remove(&key);
            return Err(e);
        }
        drop(slot);

        info!(project, stack = name, "Created stack");
        Ok(self.handle(project, name, program))
    }

    async fn select_stack(
        &self,
        project: &str,
        name: &str,
        program: Arc<dyn Program>,
    ) -> EngineResult<Box<dyn Stack>> {
        self.inner.entry(&key(project, name)).await?;
        Ok(self.handle(project, name, program))
    }

    async fn list_stacks(&self, project: &str) -> EngineResult<Vec<StackSummary>> {
        let entries: Vec<Arc<StackEntry>> = {
            let stacks = self.inner.stacks.read().await;
            stacks
                .iter()
                .filter(|((p, _), _)| p == project)
                .map(|(_, entry)| entry.clone())
                .collect()
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(summary) = entry.summary().await {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn remove_stack(&self, project: &str, name: &str) -> EngineResult<()> {
        let key = key(project, name);
        let entry = self.inner.entry(&key).await?;
        let _guard = entry
            .lock
            .try_acquire(UpdateKind::Destroy)
            .ok_or_else(|| EngineError::ConcurrentUpdate {
                name: name.to_string(),
            })?;

        let mut slot = entry.checkpoint.lock().await;
        let checkpoint = slot.as_ref().ok_or_else(|| not_found(&key))?;
        let remaining = checkpoint.resources.len();
        if remaining > 0 {
            return Err(EngineError::Backend(format!(
                "stack '{name}' still has {remaining} resources; destroy it first"
            )));
        }

        if let Some(store) = &self.inner.store {
            store.remove(project, name).await?;
        }
        *slot = None;
        self.inner.stacks.write().await.remove(&key);
        info!(project, stack = name, "Removed stack");
        Ok(())
    }
}

/// Handle to a stack in a [`LocalWorkspace`].
struct LocalStack {
    key: StackKey,
    program: Arc<dyn Program>,
    inner: Arc<Inner>,
}

impl LocalStack {
    fn project(&self) -> &str {
        &self.key.0
    }
}

#[async_trait]
impl Stack for LocalStack {
    fn name(&self) -> &str {
        &self.key.1
    }

    async fn set_config(&self, key: &str, value: &str) -> EngineResult<()> {
        self.inner
            .commit(&self.key, |checkpoint| {
                checkpoint.config.insert(key.to_string(), value.to_string());
            })
            .await
    }

    async fn up(&self, on_output: OutputSink) -> EngineResult<UpResult> {
        let _guard = self.inner.acquire(&self.key, UpdateKind::Update).await?;
        let started_at = Utc::now();
        emit(
            &on_output,
            format!("Updating ({}/{})", self.project(), self.name()),
        );

        let graph = self.program.declare()?;
        let current = self.inner.checkpoint(&self.key).await?;
        let region = current.config.get(REGION_CONFIG_KEY).map(String::as_str);

        sleep(self.inner.deploy_latency).await;

        let deployment = match deploy::apply(&graph, &current.resources, region, &on_output) {
            Ok(deployment) => deployment,
            Err(e) => {
                warn!(stack = self.name(), error = %e, "Update failed");
                emit(&on_output, format!("error: {e}"));
                return Err(e);
            }
        };

        let summary = UpdateSummary {
            id: Uuid::new_v4(),
            kind: UpdateKind::Update,
            started_at,
            finished_at: Utc::now(),
            resource_changes: deployment.changes,
        };

        let outputs = deployment.outputs.clone();
        let recorded = summary.clone();
        self.inner
            .commit(&self.key, move |checkpoint| {
                checkpoint.resources = deployment.resources;
                checkpoint.outputs = deployment.outputs;
                checkpoint.history.push(recorded);
            })
            .await?;

        Ok(UpResult { outputs, summary })
    }

    async fn destroy(&self, on_output: OutputSink) -> EngineResult<UpdateSummary> {
        let _guard = self.inner.acquire(&self.key, UpdateKind::Destroy).await?;
        let started_at = Utc::now();
        emit(
            &on_output,
            format!("Destroying ({}/{})", self.project(), self.name()),
        );

        let current = self.inner.checkpoint(&self.key).await?;

        sleep(self.inner.deploy_latency).await;

        let changes = deploy::teardown(&current.resources, &on_output);
        let summary = UpdateSummary {
            id: Uuid::new_v4(),
            kind: UpdateKind::Destroy,
            started_at,
            finished_at: Utc::now(),
            resource_changes: changes,
        };

        let recorded = summary.clone();
        self.inner
            .commit(&self.key, move |checkpoint| {
                checkpoint.resources.clear();
                checkpoint.outputs.clear();
                checkpoint.history.push(recorded);
            })
            .await?;

        Ok(summary)
    }

    async fn outputs(&self) -> EngineResult<OutputMap> {
        Ok(self.inner.checkpoint(&self.key).await?.outputs)
    }
}
