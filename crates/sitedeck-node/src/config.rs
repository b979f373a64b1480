//! Node configuration, read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use sitedeck_workspace::LocalWorkspaceConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Project namespace all stacks are created under.
    #[serde(default = "default_project")]
    pub project: String,

    /// Provider region applied to every deploy.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_state_dir")]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_deploy_latency")]
    pub deploy_latency_ms: u64,
}

fn default_bind_addr() -> String {
    std::env::var("SITEDECK_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

fn default_project() -> String {
    std::env::var("SITEDECK_PROJECT").unwrap_or_else(|_| "pulumi_over_http".to_string())
}

fn default_region() -> String {
    std::env::var("SITEDECK_REGION").unwrap_or_else(|_| "us-west-2".to_string())
}

fn default_state_dir() -> Option<PathBuf> {
    std::env::var("SITEDECK_STATE_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn default_deploy_latency() -> u64 {
    std::env::var("SITEDECK_DEPLOY_LATENCY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            project: default_project(),
            region: default_region(),
            state_dir: default_state_dir(),
            deploy_latency_ms: default_deploy_latency(),
        }
    }
}

impl Config {
    /// Load settings from the JSON file named by `SITEDECK_CONFIG`, or from
    /// the environment alone when it is unset. Fields missing from the file
    /// fall back to their environment defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("SITEDECK_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Settings for the in-process engine.
    pub fn workspace(&self) -> LocalWorkspaceConfig {
        LocalWorkspaceConfig {
            state_dir: self.state_dir.clone(),
            deploy_latency: Duration::from_millis(self.deploy_latency_ms),
        }
    }
}
