//! Stack checkpoints and their on-disk store.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitedeck_core::{EngineResult, OutputMap, ResourceKind, UpdateKind, UpdateSummary};
use tokio::fs;

/// A realized resource as recorded in the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Logical name from the program.
    pub name: String,
    pub kind: ResourceKind,
    /// Physical id assigned by the provider.
    pub id: String,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
}

/// Everything the engine knows about one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    #[serde(default)]
    pub outputs: OutputMap,
    #[serde(default)]
    pub history: Vec<UpdateSummary>,
}

impl Checkpoint {
    pub fn new(project: &str, name: &str) -> Self {
        Self {
            project: project.to_string(),
            name: name.to_string(),
            config: BTreeMap::new(),
            resources: Vec::new(),
            outputs: OutputMap::new(),
            history: Vec::new(),
        }
    }

    /// When the last update or destroy finished.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.history.last().map(|h| h.finished_at)
    }

    /// Whether any deploy has ever completed.
    pub fn has_deployed(&self) -> bool {
        self.history.iter().any(|h| h.kind == UpdateKind::Update)
    }
}

/// Writes one JSON file per stack under `<root>/<project>/<stack>.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, project: &str, name: &str) -> PathBuf {
        self.root.join(project).join(format!("{name}.json"))
    }

    /// Persist a checkpoint, replacing the previous file atomically.
    pub async fn save(&self, checkpoint: &Checkpoint) -> EngineResult<()> {
        let path = self.path(&checkpoint.project, &checkpoint.name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Delete a stack's checkpoint. Missing files are not an error.
    pub async fn remove(&self, project: &str, name: &str) -> EngineResult<()> {
        match fs::remove_file(self.path(project, name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every checkpoint under the root.
    pub async fn load_all(&self) -> EngineResult<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();

        let mut projects = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(checkpoints),
            Err(e) => return Err(e.into()),
        };

        while let Some(project) = projects.next_entry().await? {
            if !project.file_type().await?.is_dir() {
                continue;
            }
            let mut stacks = fs::read_dir(project.path()).await?;
            while let Some(entry) = stacks.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let bytes = fs::read(&path).await?;
                checkpoints.push(serde_json::from_slice(&bytes)?);
            }
        }

        Ok(checkpoints)
    }
}
