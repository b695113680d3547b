//! `package.json` dependency parsing and compatibility checking.
//!
//! Grounded on `js_checker.py`'s `JSDependencyChecker`: reads the
//! `dependencies`/`devDependencies` maps; a document that fails to parse as
//! JSON yields an empty dependency list rather than per-entry errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{AggregatedResult, AnalyzerId, Compatibility};

use super::{super::RegistryClients, push_finding};

/// One parsed `package.json` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpmDependency {
    /// Package name.
    pub name: String,
    /// Version specifier as written in the manifest.
    pub version_spec: String,
    /// Whether this came from `devDependencies` rather than `dependencies`.
    pub dev_dependency: bool,
}

/// Parse `package.json` content. Structured-document parse failure is
/// all-or-nothing: invalid JSON yields an empty list.
pub fn parse_package_json(content: &str) -> Vec<NpmDependency> {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut deps = Vec::new();
    if let Some(map) = value.get("dependencies").and_then(Value::as_object) {
        for (name, spec) in map {
            deps.push(NpmDependency {
                name: name.clone(),
                version_spec: spec.as_str().unwrap_or_default().to_string(),
                dev_dependency: false,
            });
        }
    }
    if let Some(map) = value.get("devDependencies").and_then(Value::as_object) {
        for (name, spec) in map {
            deps.push(NpmDependency {
                name: name.clone(),
                version_spec: spec.as_str().unwrap_or_default().to_string(),
                dev_dependency: true,
            });
        }
    }
    deps
}

/// Check one dependency against the npm registry and record the resulting
/// finding/recommendation/reasoning.
pub async fn check_and_record(
    dep: &NpmDependency,
    file_path: &str,
    registries: &RegistryClients,
    analyzer_id: AnalyzerId,
    result: &mut AggregatedResult,
) {
    let outcome = registries.npm.check(&dep.name, &dep.version_spec).await;
    let subject = format!("{}@{}", dep.name, dep.version_spec);

    let recommendation = match outcome.compatibility {
        Compatibility::No => Some(format!(
            "Replace `{subject}` with an ARM64-compatible alternative in `{file_path}`."
        )),
        Compatibility::Partial if dep.dev_dependency => Some(format!(
            "Test dev dependency `{subject}` on ARM64 in `{file_path}` (may only affect the build environment)."
        )),
        Compatibility::Partial => Some(format!(
            "Test `{subject}` on ARM64 and check for compatibility issues in `{file_path}`."
        )),
        _ => None,
    };

    let reason = match outcome.compatibility {
        Compatibility::No => format!(
            "JavaScript package `{subject}` is not compatible with ARM64 in `{file_path}`. Reason: {}",
            outcome.reason
        ),
        Compatibility::Partial => format!(
            "JavaScript package `{subject}` may have ARM64 compatibility issues in `{file_path}`. Reason: {}",
            outcome.reason
        ),
        _ => outcome.reason.clone(),
    };

    push_finding(
        result,
        analyzer_id,
        subject,
        outcome.compatibility,
        reason,
        recommendation,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_json_splits_dev_dependencies() {
        let content = r#"{
            "dependencies": { "react": "^18.0.0" },
            "devDependencies": { "jest": "^29.0.0" }
        }"#;
        let deps = parse_package_json(content);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "react" && !d.dev_dependency));
        assert!(deps.iter().any(|d| d.name == "jest" && d.dev_dependency));
    }

    #[test]
    fn test_parse_package_json_invalid_json_yields_empty() {
        let deps = parse_package_json("{not valid json");
        assert!(deps.is_empty());
    }
}
