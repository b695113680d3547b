//! Dependency manifest analyzer: routes `requirements.txt` and
//! `package.json` files to their ecosystem-specific sub-checkers.
//!
//! Grounded on `manager.py`'s `DependencyManager`: same file-type routing,
//! same per-dependency recommendation/reasoning message templates.

pub mod js;
pub mod python;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AggregatedResult, AnalyzerId, Compatibility, Finding};

use super::{Analyzer, FileAnalysis, RegistryClients};

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)requirements\.txt$").expect("valid regex"),
        Regex::new(r"(?i)package\.json$").expect("valid regex"),
    ]
});

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "file_type", rename_all = "lowercase")]
enum ParsedManifest {
    Python { deps: Vec<python::PythonDependency> },
    Javascript { deps: Vec<js::NpmDependency> },
}

/// Analyzer for Python and npm dependency manifests.
#[derive(Default)]
pub struct DependencyAnalyzer;

#[async_trait]
impl Analyzer for DependencyAnalyzer {
    fn id(&self) -> AnalyzerId {
        AnalyzerId::Dependency
    }

    fn patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn analyze(&self, content: &str, path: &str) -> FileAnalysis {
        let lower = path.to_lowercase();
        let manifest = if lower.ends_with("requirements.txt") {
            ParsedManifest::Python {
                deps: python::parse_requirements(content),
            }
        } else if lower.ends_with("package.json") {
            ParsedManifest::Javascript {
                deps: js::parse_package_json(content),
            }
        } else {
            ParsedManifest::Python { deps: Vec::new() }
        };

        FileAnalysis {
            path: path.to_string(),
            data: serde_json::to_value(manifest).unwrap_or(serde_json::Value::Null),
        }
    }

    async fn aggregate(
        &self,
        outputs: Vec<FileAnalysis>,
        registries: &RegistryClients,
    ) -> AggregatedResult {
        let mut result = AggregatedResult::default();
        let mut seen = std::collections::BTreeSet::new();

        for output in &outputs {
            let Ok(manifest) = serde_json::from_value::<ParsedManifest>(output.data.clone())
            else {
                continue;
            };
            match manifest {
                ParsedManifest::Python { deps } => {
                    for dep in deps {
                        let dedup_key = format!("py:{}:{:?}", dep.name, dep.version_spec);
                        if !seen.insert(dedup_key) {
                            continue;
                        }
                        python::check_and_record(&dep, &output.path, registries, self.id(), &mut result)
                            .await;
                    }
                }
                ParsedManifest::Javascript { deps } => {
                    for dep in deps {
                        let dedup_key = format!("js:{}:{}", dep.name, dep.version_spec);
                        if !seen.insert(dedup_key) {
                            continue;
                        }
                        js::check_and_record(&dep, &output.path, registries, self.id(), &mut result)
                            .await;
                    }
                }
            }
        }

        result
    }
}

pub(super) fn push_finding(
    result: &mut AggregatedResult,
    analyzer_id: AnalyzerId,
    subject: String,
    compatibility: Compatibility,
    reason: String,
    recommendation: Option<String>,
) {
    let mut finding = Finding::new(analyzer_id, subject, compatibility, reason);
    if let Some(recommendation) = recommendation.clone() {
        result.push_recommendation(recommendation.clone());
        finding = finding.with_recommendation(recommendation);
    }
    if matches!(compatibility, Compatibility::No | Compatibility::Partial) {
        result.push_reasoning(finding.reason.clone());
    }
    result.findings.push(finding);
}
