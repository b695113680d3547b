//! The pluggable analyzer contract and the three concrete analyzers.
//!
//! Mirrors the teacher's `FeatureExtractor: Send + Sync` contract in
//! `src/core/featureset.rs`: an `async_trait` interface with a synchronous
//! per-file `analyze` step and an async `aggregate` step that may perform
//! registry I/O.

pub mod container;
pub mod dependency;
pub mod infra;

use async_trait::async_trait;

use crate::model::{AggregatedResult, AnalyzerId};
use crate::registry::{ContainerRegistryClient, NpmClient, PypiClient, WheelTesterClient};

/// Registry clients shared by analyzers during one `Analyze` call.
///
/// Constructed fresh per analysis (orchestrator-scoped caches), matching the
/// teacher's pattern of passing owned config/cache objects into a pipeline
/// rather than relying on process-wide mutable statics.
pub struct RegistryClients {
    /// PyPI-style package registry client.
    pub pypi: PypiClient,
    /// npm-style package registry client.
    pub npm: NpmClient,
    /// Docker Registry v2 client.
    pub container: ContainerRegistryClient,
    /// External ARM64 wheel-test archive client.
    pub wheel_tester: WheelTesterClient,
}

impl RegistryClients {
    /// Build a fresh set of clients for one analysis.
    pub fn new(container_credentials: crate::core::config::ContainerRegistryConfig, forge_token: Option<String>) -> Self {
        Self {
            pypi: PypiClient::new(),
            npm: NpmClient::new(),
            container: ContainerRegistryClient::new(container_credentials),
            wheel_tester: WheelTesterClient::new(forge_token),
        }
    }
}

/// A single per-file analysis output, carried between `analyze` and
/// `aggregate`. Each analyzer interprets its own shape; this is a thin
/// envelope pairing the source file with analyzer-specific extracted data.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    /// Path of the file this analysis came from.
    pub path: String,
    /// Analyzer-specific extracted data.
    pub data: serde_json::Value,
}

/// The pluggable analyzer contract (C4). Every concrete analyzer exposes
/// file-path patterns, a pure per-file `analyze` step, and an async
/// `aggregate` step that may perform registry lookups.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Identifies this analyzer's slot in the verdict.
    fn id(&self) -> AnalyzerId;

    /// Case-insensitive file-path patterns (substring-regex semantics) that
    /// route blobs to this analyzer.
    fn patterns(&self) -> &[regex::Regex];

    /// Pure per-file extraction. MUST NOT mutate shared state except
    /// through registry clients, which memoize internally.
    fn analyze(&self, content: &str, path: &str) -> FileAnalysis;

    /// Combine every per-file output collected for this analyzer. MAY
    /// perform registry lookups (e.g. image manifests, package metadata).
    /// MUST be deterministic given the same input list.
    async fn aggregate(
        &self,
        outputs: Vec<FileAnalysis>,
        registries: &RegistryClients,
    ) -> AggregatedResult;
}

/// Check whether `path` matches any of an analyzer's patterns.
pub fn matches_any(patterns: &[regex::Regex], path: &str) -> bool {
    patterns.iter().any(|p| p.is_match(path))
}
