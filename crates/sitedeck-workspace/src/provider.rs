//! Simulated storage provider.
//!
//! Realizes bucket, object and policy resources without calling out to a
//! cloud API. Physical names and computed attributes follow the shapes the
//! real provider reports so programs can be exercised end to end.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sitedeck_core::{EngineError, EngineResult, ResourceKind};
use uuid::Uuid;

use crate::checkpoint::ResourceState;

/// Provider bound to one region.
#[derive(Debug, Clone)]
pub(crate) struct SimulatedProvider {
    region: String,
}

/// Physical id and computed attributes of a realized resource.
pub(crate) type Realized = (String, BTreeMap<String, Value>);

impl SimulatedProvider {
    pub(crate) fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// Create or update a resource from its resolved inputs.
    pub(crate) fn realize(
        &self,
        name: &str,
        kind: ResourceKind,
        inputs: &BTreeMap<String, Value>,
        previous: Option<&ResourceState>,
    ) -> EngineResult<Realized> {
        match kind {
            ResourceKind::Bucket => Ok(self.bucket(name, inputs, previous)),
            ResourceKind::BucketObject => object(name, inputs),
            ResourceKind::BucketPolicy => policy(name, inputs),
        }
    }

    fn bucket(
        &self,
        name: &str,
        inputs: &BTreeMap<String, Value>,
        previous: Option<&ResourceState>,
    ) -> Realized {
        // A bucket keeps its physical name unless it has to move regions.
        let bucket = previous
            .filter(|p| p.kind == ResourceKind::Bucket)
            .filter(|p| {
                p.outputs.get("region").and_then(Value::as_str) == Some(self.region.as_str())
            })
            .map(|p| p.id.clone())
            .unwrap_or_else(|| autoname(name));

        let mut attrs = BTreeMap::new();
        attrs.insert("bucket".to_string(), json!(bucket));
        attrs.insert("arn".to_string(), json!(format!("arn:aws:s3:::{bucket}")));
        attrs.insert("region".to_string(), json!(self.region));
        attrs.insert(
            "bucketRegionalDomainName".to_string(),
            json!(format!("{bucket}.s3.{}.amazonaws.com", self.region)),
        );
        if let Some(website) = inputs.get("website") {
            attrs.insert("website".to_string(), website.clone());
            attrs.insert(
                "websiteEndpoint".to_string(),
                json!(format!("{bucket}.s3-website-{}.amazonaws.com", self.region)),
            );
        }
        (bucket, attrs)
    }
}

fn object(name: &str, inputs: &BTreeMap<String, Value>) -> EngineResult<Realized> {
    let bucket = required_str(name, inputs, "bucket")?;
    let key = required_str(name, inputs, "key")?;
    let content = inputs.get("content").and_then(Value::as_str).unwrap_or_default();

    let etag = format!("{:x}", Sha256::digest(content.as_bytes()));

    let mut attrs = inputs.clone();
    attrs.insert("etag".to_string(), json!(etag));
    Ok((format!("{bucket}/{key}"), attrs))
}

fn policy(name: &str, inputs: &BTreeMap<String, Value>) -> EngineResult<Realized> {
    let bucket = required_str(name, inputs, "bucket")?;
    let document = inputs
        .get("policy")
        .filter(|p| p.is_object())
        .ok_or_else(|| EngineError::Provider(format!("{name}: policy must be a JSON document")))?;

    let mut attrs = BTreeMap::new();
    attrs.insert("bucket".to_string(), json!(bucket));
    attrs.insert("policy".to_string(), json!(document.to_string()));
    Ok((bucket.to_string(), attrs))
}

fn required_str<'a>(
    name: &str,
    inputs: &'a BTreeMap<String, Value>,
    key: &str,
) -> EngineResult<&'a str> {
    inputs
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Provider(format!("{name}: missing required input '{key}'")))
}

/// Logical name plus a random suffix, lowercased for bucket naming rules.
fn autoname(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", name.to_ascii_lowercase(), &suffix[..7])
}
