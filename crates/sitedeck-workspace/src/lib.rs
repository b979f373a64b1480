//! # Sitedeck Workspace
//!
//! The stack engine contract ([`Workspace`], [`Stack`]) and an in-process
//! engine implementing it ([`LocalWorkspace`]).

pub mod checkpoint;
mod deploy;
pub mod local;
mod lock;
mod provider;
pub mod workspace;

pub use checkpoint::{Checkpoint, CheckpointStore, ResourceState};
pub use local::{LocalWorkspace, LocalWorkspaceConfig};
pub use workspace::{validate_stack_name, OutputSink, Stack, Workspace};
