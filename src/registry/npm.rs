//! npm-style package registry client.
//!
//! Grounded on `js_checker.py`'s `_check_npm_package_compatibility`: the
//! same `cpu`/`os`/`binary`/`gypfile`/install-script signal set and the
//! same "start from yes, partial downgrades, no dominates" consolidation
//! rule.

use serde::Deserialize;
use serde_json::Value;

use crate::model::Compatibility;

use super::cache::ResultCache;
use super::version;

/// Outcome of an npm compatibility check for one `(name, spec)` pair.
#[derive(Debug, Clone)]
pub struct NpmOutcome {
    /// The determination.
    pub compatibility: Compatibility,
    /// Human-readable explanation, possibly combining multiple signals.
    pub reason: String,
    /// The concrete version that was inspected, if any.
    pub resolved_version: Option<String>,
    /// `false` when no version satisfied the spec and a fallback (`latest`)
    /// was used instead.
    pub spec_satisfied: bool,
}

#[derive(Debug, Deserialize)]
struct PackageResponse {
    versions: std::collections::BTreeMap<String, Value>,
    #[serde(rename = "dist-tags")]
    dist_tags: DistTags,
}

#[derive(Debug, Deserialize)]
struct DistTags {
    latest: Option<String>,
}

/// npm registry client with a process-lifetime cache.
pub struct NpmClient {
    client: reqwest::Client,
    base_url: String,
    /// Keyed by `(name, spec)`; holds unknown/error outcomes, so a repeated
    /// call with the same unresolvable spec doesn't re-hit the network.
    spec_cache: ResultCache<String, NpmOutcome>,
    /// Keyed by `(name, resolvedVersion)`; shared across different specs
    /// that resolve to the same concrete version.
    version_cache: ResultCache<String, NpmOutcome>,
}

impl NpmClient {
    /// Construct a client pointed at the default npm registry.
    pub fn new() -> Self {
        Self::with_base_url("https://registry.npmjs.org")
    }

    /// Construct a client pointed at an arbitrary base URL (used in tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            spec_cache: ResultCache::new(),
            version_cache: ResultCache::new(),
        }
    }

    /// Check compatibility of `name` constrained by `spec` (empty, `*`, or
    /// `latest` resolve to the registry's `latest` dist-tag).
    pub async fn check(&self, name: &str, spec: &str) -> NpmOutcome {
        let spec_key = format!("{name}@{spec}");
        if let Some(cached) = self.spec_cache.get(&spec_key).await {
            return cached;
        }

        let outcome = self.fetch_and_classify(name, spec).await;
        if outcome.resolved_version.is_none() {
            self.spec_cache.put(spec_key, outcome.clone()).await;
        }
        outcome
    }

    async fn fetch_and_classify(&self, name: &str, spec: &str) -> NpmOutcome {
        let encoded_name = name.replace('/', "%2F");
        let url = format!("{}/{encoded_name}", self.base_url);
        let response = match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return unknown(format!("network error checking npm registry: {e}")),
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return unknown(format!("package '{name}' not found on npm registry"));
        }
        if !response.status().is_success() {
            return unknown(format!("npm registry error: HTTP {}", response.status()));
        }

        let body: PackageResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return unknown(format!("npm response was not valid JSON: {e}")),
        };

        let (resolved_version, spec_satisfied) = resolve_version(spec, &body);
        let Some(resolved_version) = resolved_version else {
            return unknown("could not resolve a version from the npm registry");
        };

        let version_key = format!("{name}@{resolved_version}");
        if let Some(mut cached) = self.version_cache.get(&version_key).await {
            cached.resolved_version = Some(resolved_version);
            cached.spec_satisfied = spec_satisfied;
            return cached;
        }

        let Some(manifest) = body.versions.get(&resolved_version) else {
            return unknown(format!(
                "internal error: resolved version {resolved_version} missing from registry response"
            ));
        };

        let classified = classify_manifest(manifest);
        self.version_cache.put(version_key, classified.clone()).await;

        let mut outcome = classified;
        outcome.resolved_version = Some(resolved_version);
        outcome.spec_satisfied = spec_satisfied;
        outcome
    }
}

impl Default for NpmClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(reason: impl Into<String>) -> NpmOutcome {
    NpmOutcome {
        compatibility: Compatibility::Unknown,
        reason: reason.into(),
        resolved_version: None,
        spec_satisfied: true,
    }
}

fn resolve_version(spec: &str, body: &PackageResponse) -> (Option<String>, bool) {
    let trimmed = spec.trim();
    if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("latest") {
        return (body.dist_tags.latest.clone(), true);
    }

    let mut matching: Vec<(String, semver::Version)> = body
        .versions
        .keys()
        .filter_map(|raw| version::loose_parse(raw).map(|v| (raw.clone(), v)))
        .filter(|(_, v)| version::npm_range_satisfied(trimmed, v))
        .collect();
    matching.sort_by(|a, b| a.1.cmp(&b.1));

    match matching.pop() {
        Some((resolved, _)) => (Some(resolved), true),
        None => (body.dist_tags.latest.clone(), false),
    }
}

fn classify_manifest(manifest: &Value) -> NpmOutcome {
    let mut compatibility = Compatibility::Yes;
    let mut reasons: Vec<String> = Vec::new();

    if let Some(cpu) = manifest.get("cpu") {
        let list = string_list(cpu);
        if !list.is_empty() {
            let is_arm_allowed = list.iter().any(|c| c == "arm" || c == "arm64" || c == "any");
            let is_only_non_arm = list.iter().all(|c| c == "x64" || c == "ia32");
            let is_negated_arm_exclusion =
                list.iter().any(|c| c == "!arm" || c == "!arm64");
            let is_negated_other_inclusion = list
                .iter()
                .any(|c| c.starts_with('!') && c != "!arm" && c != "!arm64");

            if is_negated_arm_exclusion {
                compatibility = Compatibility::No;
                reasons.push(format!("cpu field explicitly excludes ARM: {cpu}"));
            } else if !is_arm_allowed && is_only_non_arm {
                compatibility = Compatibility::No;
                reasons.push(format!("cpu field lists only non-ARM architectures: {cpu}"));
            } else if !is_arm_allowed && !is_negated_other_inclusion && !list.iter().any(|c| c == "any") {
                downgrade_to_partial(&mut compatibility);
                reasons.push(format!("cpu field does not mention arm: {cpu}"));
            } else if list.iter().any(|c| c == "arm") && !list.iter().any(|c| c == "arm64") {
                downgrade_to_partial(&mut compatibility);
                reasons.push(format!("cpu field mentions arm but not arm64: {cpu}"));
            }
        }
    }

    if let Some(os) = manifest.get("os") {
        let list = string_list(os);
        if !list.is_empty() {
            let is_linux_excluded = list.iter().any(|o| o == "!linux");
            let is_only_non_linux = list
                .iter()
                .all(|o| o == "win32" || o == "darwin" || o == "freebsd");
            let allows_escape = list
                .iter()
                .any(|o| o == "linux" || o == "any" || o == "!win32" || o == "!darwin");

            if is_linux_excluded {
                compatibility = Compatibility::No;
                reasons.push(format!("os field explicitly excludes linux: {os}"));
            } else if !allows_escape && is_only_non_linux {
                compatibility = Compatibility::No;
                reasons.push(format!("os field lists only non-linux platforms: {os}"));
            }
        }
    }

    if manifest.get("binary").is_some() {
        downgrade_to_partial(&mut compatibility);
        reasons.push("package ships a 'binary' field: pre-compiled native code may be downloaded".to_string());
    }

    let gypfile = manifest
        .get("gypfile")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let install_scripts_use_gyp = ["install", "preinstall", "postinstall"]
        .iter()
        .filter_map(|key| manifest.get("scripts").and_then(|s| s.get(key)))
        .filter_map(Value::as_str)
        .any(|script| script.contains("node-gyp") || script.contains("node-pre-gyp"));

    if gypfile || install_scripts_use_gyp {
        downgrade_to_partial(&mut compatibility);
        reasons.push("package likely requires native compilation (node-gyp)".to_string());
    }

    let reason = if reasons.is_empty() {
        "no ARM-incompatibility signals found in package manifest".to_string()
    } else {
        reasons.join("; ")
    };

    NpmOutcome {
        compatibility,
        reason,
        resolved_version: None,
        spec_satisfied: true,
    }
}

fn downgrade_to_partial(compatibility: &mut Compatibility) {
    if *compatibility == Compatibility::Yes {
        *compatibility = Compatibility::Partial;
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.to_lowercase()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.to_lowercase())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_manifest_negated_arm_is_incompatible() {
        let manifest = json!({ "cpu": ["!arm64"] });
        let outcome = classify_manifest(&manifest);
        assert_eq!(outcome.compatibility, Compatibility::No);
    }

    #[test]
    fn test_classify_manifest_only_x86_is_incompatible() {
        let manifest = json!({ "cpu": ["x64"] });
        let outcome = classify_manifest(&manifest);
        assert_eq!(outcome.compatibility, Compatibility::No);
    }

    #[test]
    fn test_classify_manifest_gypfile_is_partial() {
        let manifest = json!({ "gypfile": true });
        let outcome = classify_manifest(&manifest);
        assert_eq!(outcome.compatibility, Compatibility::Partial);
    }

    #[test]
    fn test_classify_manifest_clean_package_is_yes() {
        let manifest = json!({ "name": "left-pad" });
        let outcome = classify_manifest(&manifest);
        assert_eq!(outcome.compatibility, Compatibility::Yes);
    }

    #[test]
    fn test_classify_manifest_no_dominates_partial() {
        let manifest = json!({ "cpu": ["!arm64"], "gypfile": true });
        let outcome = classify_manifest(&manifest);
        assert_eq!(outcome.compatibility, Compatibility::No);
    }
}
