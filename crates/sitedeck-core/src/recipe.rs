//! The static site provisioning recipe.
//!
//! Given page content, declares a bucket serving `index.html` as its website
//! root, the `index.html` object holding the content, and a public-read
//! policy scoped to the bucket. The policy is derived from the bucket's
//! resolved name and so is only computed once the bucket exists.

use serde_json::{json, Value};

use crate::error::EngineResult;
use crate::program::{Input, Program, ResourceDecl, ResourceGraph, ResourceKind};
use crate::types::WEBSITE_URL_OUTPUT;

/// Website index document and object key.
pub const INDEX_DOCUMENT: &str = "index.html";

/// Content type of the published page.
pub const INDEX_CONTENT_TYPE: &str = "text/html; charset=utf-8";

pub const BUCKET_RESOURCE: &str = "s3-website-bucket";
pub const INDEX_RESOURCE: &str = "index";
pub const POLICY_RESOURCE: &str = "bucketPolicy";

/// A static website published from a single content string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSite {
    content: String,
}

impl StaticSite {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Program for StaticSite {
    fn declare(&self) -> EngineResult<ResourceGraph> {
        let mut graph = ResourceGraph::new();

        let bucket = graph.declare(
            ResourceDecl::new(BUCKET_RESOURCE, ResourceKind::Bucket)
                .input("website", Input::value(json!({ "indexDocument": INDEX_DOCUMENT }))),
        );

        graph.declare(
            ResourceDecl::new(INDEX_RESOURCE, ResourceKind::BucketObject)
                .input("bucket", bucket.attr("bucket"))
                .input("key", Input::value(INDEX_DOCUMENT))
                .input("content", Input::value(self.content.as_str()))
                .input("contentType", Input::value(INDEX_CONTENT_TYPE)),
        );

        graph.declare(
            ResourceDecl::new(POLICY_RESOURCE, ResourceKind::BucketPolicy)
                .input("bucket", bucket.attr("bucket"))
                .input(
                    "policy",
                    bucket.apply("bucket", |name| {
                        public_read_policy(name.as_str().unwrap_or_default())
                    }),
                ),
        );

        graph.export(WEBSITE_URL_OUTPUT, bucket.attr("websiteEndpoint"));

        Ok(graph)
    }
}

/// Policy document granting anonymous `s3:GetObject` on every object in
/// `bucket_name`.
pub fn public_read_policy(bucket_name: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{bucket_name}/*")],
        }]
    })
}
