//! `requirements.txt` dependency parsing and compatibility checking.
//!
//! Grounded on `python_checker.py`'s `PythonDependencyChecker`: same
//! pragmatic line regex, same PyPI + Wheel Tester consolidation rules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{AggregatedResult, AnalyzerId, Compatibility};
use crate::registry::{pypi, wheel_tester};

use super::{super::RegistryClients, push_finding};

static DEP_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.-]+)(\[[A-Za-z0-9,_.-]+\])?\s*([=<>!~].+)?$").expect("valid regex")
});

/// One parsed `requirements.txt` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonDependency {
    /// Package name (or, for unparseable lines, the whole line).
    pub name: String,
    /// Version specifier, if present (e.g. `>=2.0`).
    pub version_spec: Option<String>,
    /// The original line, for display.
    pub original_line: String,
    /// Set when the line could not be parsed into a name/specifier pair.
    pub parse_error: bool,
}

/// Parse `requirements.txt` content into dependency entries. Unparseable
/// lines become a `{parse_error: true}` entry rather than being dropped.
pub fn parse_requirements(content: &str) -> Vec<PythonDependency> {
    let mut deps = Vec::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim().to_string();
        if let Some(idx) = line.find('#') {
            line.truncate(idx);
            line = line.trim().to_string();
        }
        if line.is_empty() {
            continue;
        }

        if let Some(captures) = DEP_LINE_RE.captures(&line) {
            let name = captures[1].to_string();
            let version_spec = captures.get(3).map(|m| m.as_str().trim().to_string());
            deps.push(PythonDependency {
                name,
                version_spec,
                original_line: line.clone(),
                parse_error: false,
            });
        } else {
            deps.push(PythonDependency {
                name: line.clone(),
                version_spec: None,
                original_line: line,
                parse_error: true,
            });
        }
    }
    deps
}

/// Check one dependency against PyPI and the wheel-tester archive, and
/// record the resulting finding/recommendation/reasoning.
pub async fn check_and_record(
    dep: &PythonDependency,
    file_path: &str,
    registries: &RegistryClients,
    analyzer_id: AnalyzerId,
    result: &mut AggregatedResult,
) {
    let subject = format!("{}{}", dep.name, dep.version_spec.as_deref().unwrap_or(""));

    if dep.parse_error {
        push_finding(
            result,
            analyzer_id,
            subject,
            Compatibility::Unknown,
            "could not parse line in requirements file".to_string(),
            None,
        );
        return;
    }

    let pypi_outcome = registries
        .pypi
        .check(&dep.name, dep.version_spec.as_deref())
        .await;

    let mut compatibility = pypi_outcome.compatibility;
    let mut reason = pypi_outcome.reason.clone();

    let normalized_name = pypi::canonicalize_name(&dep.name);
    if let Some(results) = registries.wheel_tester.latest_results().await {
        if let Some(env) = wheel_tester::recent_pass(&results, &normalized_name) {
            compatibility = Compatibility::Yes;
            reason = format!("passed ARM64 wheel-tester tests on {env}");
        } else {
            let failures = wheel_tester::any_recorded_failure(&results, &normalized_name);
            if !failures.is_empty() && !matches!(compatibility, Compatibility::Yes | Compatibility::Partial)
            {
                compatibility = Compatibility::No;
                reason = format!("failed ARM64 wheel-tester tests on {}", failures.join(", "));
            } else if !failures.is_empty() {
                reason = format!("{reason}; additionally failed wheel-tester tests on {}", failures.join(", "));
            }
        }
    }

    if matches!(compatibility, Compatibility::Partial) {
        reason = format!("{}. Source compilation might be required on ARM64.", reason.trim_end_matches('.'));
    }

    if let Some(warning) = &pypi_outcome.warning {
        reason = format!("{} (Warning: {warning})", reason.trim_end_matches('.'));
    }

    let recommendation = match compatibility {
        Compatibility::No => Some(format!(
            "Replace `{subject}` with an ARM64-compatible alternative in `{file_path}`."
        )),
        Compatibility::Partial => Some(format!(
            "Test `{subject}` on ARM64 and check for compatibility issues in `{file_path}`."
        )),
        _ => None,
    };

    let reason = match compatibility {
        Compatibility::No => format!(
            "Python package `{subject}` is not compatible with ARM64 in `{file_path}`. Reason: {reason}"
        ),
        Compatibility::Partial => format!(
            "Python package `{subject}` may have ARM64 compatibility issues in `{file_path}`. Reason: {reason}"
        ),
        _ => reason,
    };

    push_finding(result, analyzer_id, subject, compatibility, reason, recommendation);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requirements_basic() {
        let content = "requests>=2.0\n# a comment\nnumpy==1.26.0\n\nthis is not valid!!\n";
        let deps = parse_requirements(content);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "requests");
        assert_eq!(deps[0].version_spec.as_deref(), Some(">=2.0"));
        assert!(!deps[0].parse_error);
        assert!(deps[2].parse_error);
    }

    #[test]
    fn test_parse_requirements_strips_inline_comments() {
        let deps = parse_requirements("flask==2.0.0  # pinned for compat\n");
        assert_eq!(deps[0].name, "flask");
        assert_eq!(deps[0].version_spec.as_deref(), Some("==2.0.0"));
    }
}
