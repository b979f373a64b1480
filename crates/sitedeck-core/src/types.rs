//! Common types shared by the engine and the control plane.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stack output carrying the deployed site's endpoint.
pub const WEBSITE_URL_OUTPUT: &str = "websiteUrl";

/// Configuration key selecting the provider region.
pub const REGION_CONFIG_KEY: &str = "aws:region";

/// Result of a successful create, update or get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutput {
    /// The stack name, also the public site id.
    pub id: String,
    /// The resolved website endpoint.
    pub url: String,
}

/// Lifecycle state of a stack as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Registered, first deployment not yet completed.
    Provisioning,
    /// Deployed and idle.
    Active,
    /// A deployment is replacing existing resources.
    Updating,
    /// Resources are being torn down.
    Destroying,
}

impl StackStatus {
    /// Returns true while a mutating operation holds the stack.
    pub fn is_busy(&self) -> bool {
        matches!(self, StackStatus::Updating | StackStatus::Destroying)
    }
}

/// Kind of mutating engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Update,
    Destroy,
}

/// Per-resource change counts for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChanges {
    pub create: usize,
    pub update: usize,
    pub same: usize,
    pub delete: usize,
}

impl ResourceChanges {
    /// Number of resources that were actually touched.
    pub fn changed(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// Record of a completed update or destroy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub id: Uuid,
    pub kind: UpdateKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resource_changes: ResourceChanges,
}

/// A listed stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    pub status: StackStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub resource_count: usize,
}

/// A single stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub secret: bool,
}

impl OutputValue {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Stack outputs keyed by name.
pub type OutputMap = BTreeMap<String, OutputValue>;

/// Outcome of a successful `up`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpResult {
    pub outputs: OutputMap,
    pub summary: UpdateSummary,
}
