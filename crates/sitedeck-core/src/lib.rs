//! # Sitedeck Core
//!
//! Core types shared by the Sitedeck engine and control plane:
//! - [`StaticSite`] - The provisioning recipe for a content-addressed site
//! - [`Program`] / [`ResourceGraph`] - What an engine deploys
//! - [`EngineError`] / [`SiteError`] - Engine failures and what callers see

pub mod error;
pub mod program;
pub mod recipe;
pub mod types;

// Re-exports for convenience
pub use error::{EngineError, EngineResult, Operation, Result, SiteError};
pub use program::{
    AttrRef, Input, NoopProgram, Program, ResourceDecl, ResourceGraph, ResourceHandle,
    ResourceKind,
};
pub use recipe::{public_read_policy, StaticSite};
pub use types::*;
