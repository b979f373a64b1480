//! Deployment programs and the resource graphs they declare.
//!
//! A [`Program`] is evaluated by the engine into a [`ResourceGraph`]: an
//! ordered list of resource declarations plus named outputs. Inputs may be
//! literal values, references to an attribute of an earlier resource, or a
//! deferred transform of such an attribute. Attributes are only known once
//! the engine has realized the referenced resource, so the engine resolves
//! declarations strictly in order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineResult;

/// Type of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "aws:s3/bucket:Bucket")]
    Bucket,
    #[serde(rename = "aws:s3/bucketObject:BucketObject")]
    BucketObject,
    #[serde(rename = "aws:s3/bucketPolicy:BucketPolicy")]
    BucketPolicy,
}

impl ResourceKind {
    /// The provider type token.
    pub fn type_token(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "aws:s3/bucket:Bucket",
            ResourceKind::BucketObject => "aws:s3/bucketObject:BucketObject",
            ResourceKind::BucketPolicy => "aws:s3/bucketPolicy:BucketPolicy",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

/// Reference to an attribute of another resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrRef {
    pub resource: String,
    pub attribute: String,
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Deferred computation over a resolved attribute.
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A resource input or stack output.
#[derive(Clone)]
pub enum Input {
    /// Known at declaration time.
    Value(Value),
    /// Copied from another resource once it is realized.
    Ref(AttrRef),
    /// Computed from another resource's attribute once it is realized.
    Apply { source: AttrRef, transform: Transform },
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Input::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            Input::Apply { source, .. } => f.debug_struct("Apply").field("source", source).finish(),
        }
    }
}

impl Input {
    /// A literal input.
    pub fn value(v: impl Into<Value>) -> Self {
        Input::Value(v.into())
    }

    /// The attribute this input waits on, if any.
    pub fn dependency(&self) -> Option<&AttrRef> {
        match self {
            Input::Value(_) => None,
            Input::Ref(r) => Some(r),
            Input::Apply { source, .. } => Some(source),
        }
    }

    /// Resolve against realized attributes. Returns the missing reference
    /// when `lookup` cannot supply it.
    pub fn resolve<F>(&self, lookup: F) -> Result<Value, AttrRef>
    where
        F: Fn(&AttrRef) -> Option<Value>,
    {
        match self {
            Input::Value(v) => Ok(v.clone()),
            Input::Ref(r) => lookup(r).ok_or_else(|| r.clone()),
            Input::Apply { source, transform } => lookup(source)
                .map(|v| transform(&v))
                .ok_or_else(|| source.clone()),
        }
    }
}

/// One declared resource.
#[derive(Debug, Clone)]
pub struct ResourceDecl {
    pub name: String,
    pub kind: ResourceKind,
    pub inputs: BTreeMap<String, Input>,
}

impl ResourceDecl {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: BTreeMap::new(),
        }
    }

    /// Add an input.
    pub fn input(mut self, key: impl Into<String>, input: Input) -> Self {
        self.inputs.insert(key.into(), input);
        self
    }

    /// Resources this declaration depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &AttrRef> {
        self.inputs.values().filter_map(Input::dependency)
    }
}

/// Handle to a declared resource, used to wire its attributes into
/// later declarations.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    name: String,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference one of the resource's attributes.
    pub fn attr(&self, attribute: &str) -> Input {
        Input::Ref(self.attr_ref(attribute))
    }

    /// Derive a value from one of the resource's attributes.
    pub fn apply<F>(&self, attribute: &str, f: F) -> Input
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Input::Apply {
            source: self.attr_ref(attribute),
            transform: Arc::new(f),
        }
    }

    fn attr_ref(&self, attribute: &str) -> AttrRef {
        AttrRef {
            resource: self.name.clone(),
            attribute: attribute.to_string(),
        }
    }
}

/// Resources and outputs declared by a program, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: Vec<ResourceDecl>,
    outputs: BTreeMap<String, Input>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource and get a handle to it.
    pub fn declare(&mut self, decl: ResourceDecl) -> ResourceHandle {
        let handle = ResourceHandle {
            name: decl.name.clone(),
        };
        self.resources.push(decl);
        handle
    }

    /// Export a stack output.
    pub fn export(&mut self, name: impl Into<String>, input: Input) {
        self.outputs.insert(name.into(), input);
    }

    pub fn resources(&self) -> &[ResourceDecl] {
        &self.resources
    }

    pub fn outputs(&self) -> &BTreeMap<String, Input> {
        &self.outputs
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

/// A deployment program. The engine evaluates it on every `up`.
pub trait Program: Send + Sync {
    /// Declare the desired resources.
    fn declare(&self) -> EngineResult<ResourceGraph>;
}

/// Program for read and destroy paths, which need one but never run it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgram;

impl Program for NoopProgram {
    fn declare(&self) -> EngineResult<ResourceGraph> {
        Ok(ResourceGraph::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_is_deferred_until_lookup() {
        let mut graph = ResourceGraph::new();
        let bucket = graph.declare(ResourceDecl::new("b", ResourceKind::Bucket));
        let input = bucket.apply("bucket", |v| json!(format!("arn:{}", v.as_str().unwrap_or(""))));

        assert_eq!(
            input.dependency(),
            Some(&AttrRef {
                resource: "b".to_string(),
                attribute: "bucket".to_string()
            })
        );
        assert!(input.resolve(|_| None).is_err());
        assert_eq!(input.resolve(|_| Some(json!("b-123"))).unwrap(), json!("arn:b-123"));
    }

    #[test]
    fn test_noop_program_is_empty() {
        assert!(NoopProgram.declare().unwrap().is_empty());
    }

    #[test]
    fn test_kind_serializes_as_type_token() {
        assert_eq!(
            serde_json::to_value(ResourceKind::BucketPolicy).unwrap(),
            json!(ResourceKind::BucketPolicy.type_token())
        );
    }
}
