//! Error types for Sitedeck.
//!
//! Two layers live here. [`EngineError`] is the closed set of failures a
//! stack engine reports. [`SiteError`] is what callers of the control plane
//! see, produced by [`SiteError::classify`] from an engine error and the
//! operation that was running.

use thiserror::Error;

/// Failures reported by a stack engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No stack with this name is registered.
    #[error("stack '{name}' not found")]
    StackNotFound { name: String },

    /// A stack with this name is already registered.
    #[error("stack '{name}' already exists")]
    StackAlreadyExists { name: String },

    /// Another mutating operation holds the stack's update lock.
    #[error("stack '{name}' already has an update in progress")]
    ConcurrentUpdate { name: String },

    /// The stack name is not acceptable to the engine.
    #[error("invalid stack name '{name}': {reason}")]
    InvalidStackName { name: String, reason: String },

    /// The deployment program could not be evaluated.
    #[error("program error: {0}")]
    Program(String),

    /// The infrastructure provider rejected a resource operation.
    #[error("provider error: {0}")]
    Provider(String),

    /// The engine's state backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl EngineError {
    /// Short, stable name of the error kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::StackNotFound { .. } => "stack_not_found",
            EngineError::StackAlreadyExists { .. } => "stack_already_exists",
            EngineError::ConcurrentUpdate { .. } => "concurrent_update",
            EngineError::InvalidStackName { .. } => "invalid_stack_name",
            EngineError::Program(_) => "program",
            EngineError::Provider(_) => "provider",
            EngineError::Backend(_) => "backend",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Backend(err.to_string())
    }
}

/// Convenience Result type for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The control plane operations a failure can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Caller-visible failure of a control plane operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    /// The requested stack has no engine record.
    #[error("stack \"{id}\" does not exist")]
    NotFound { id: String },

    /// Create was requested for a name that is already registered.
    #[error("stack \"{id}\" already exists")]
    AlreadyExists { id: String },

    /// A mutation collided with another in-flight mutation on the same stack.
    #[error("stack \"{id}\" already has update in progress")]
    Conflict { id: String },

    /// Any other engine failure, passed through as reported.
    #[error("{message}")]
    Engine { message: String },
}

impl SiteError {
    /// Classify an engine failure raised while running `op`.
    ///
    /// Each operation only recognises the engine kinds it can legitimately
    /// hit; everything else is an unclassified engine failure.
    pub fn classify(op: Operation, err: EngineError) -> Self {
        match (op, err) {
            (
                Operation::Get | Operation::Update | Operation::Delete,
                EngineError::StackNotFound { name },
            ) => SiteError::NotFound { id: name },
            (Operation::Create, EngineError::StackAlreadyExists { name }) => {
                SiteError::AlreadyExists { id: name }
            }
            (Operation::Update | Operation::Delete, EngineError::ConcurrentUpdate { name }) => {
                SiteError::Conflict { id: name }
            }
            (_, other) => SiteError::Engine {
                message: other.to_string(),
            },
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SiteError::Conflict { .. })
    }
}

/// Convenience Result type for control plane operations.
pub type Result<T> = std::result::Result<T, SiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> EngineError {
        EngineError::StackNotFound {
            name: "site1".to_string(),
        }
    }

    fn conflict() -> EngineError {
        EngineError::ConcurrentUpdate {
            name: "site1".to_string(),
        }
    }

    #[test]
    fn test_not_found_is_classified_for_existing_stack_operations() {
        for op in [Operation::Get, Operation::Update, Operation::Delete] {
            assert_eq!(
                SiteError::classify(op, not_found()),
                SiteError::NotFound {
                    id: "site1".to_string()
                }
            );
        }
    }

    #[test]
    fn test_already_exists_only_on_create() {
        let err = EngineError::StackAlreadyExists {
            name: "site1".to_string(),
        };
        assert!(matches!(
            SiteError::classify(Operation::Create, err.clone()),
            SiteError::AlreadyExists { .. }
        ));
        assert!(matches!(
            SiteError::classify(Operation::Update, err),
            SiteError::Engine { .. }
        ));
    }

    #[test]
    fn test_conflict_on_mutations() {
        assert!(SiteError::classify(Operation::Update, conflict()).is_retryable());
        assert!(SiteError::classify(Operation::Delete, conflict()).is_retryable());
        // create never expects a lock collision
        assert!(matches!(
            SiteError::classify(Operation::Create, conflict()),
            SiteError::Engine { .. }
        ));
    }

    #[test]
    fn test_unclassified_keeps_engine_message() {
        let err = SiteError::classify(
            Operation::Get,
            EngineError::Provider("bucket quota exceeded".to_string()),
        );
        assert_eq!(err.to_string(), "provider error: bucket quota exceeded");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_messages_echo_stack_name() {
        assert_eq!(
            SiteError::classify(Operation::Get, not_found()).to_string(),
            "stack \"site1\" does not exist"
        );
        assert_eq!(
            SiteError::classify(Operation::Update, conflict()).to_string(),
            "stack \"site1\" already has update in progress"
        );
    }
}
