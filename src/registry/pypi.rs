//! PyPI-style package registry client.
//!
//! Grounded on `python_checker.py`'s `_check_pypi_package_arm_compatibility`:
//! same wheel-tag classification, the same sdist native-code heuristic, and
//! the same yanked-release handling.

use serde::Deserialize;

use crate::model::Compatibility;

use super::cache::ResultCache;
use super::version;

/// Outcome of a PyPI compatibility check for one `(name, spec)` pair.
#[derive(Debug, Clone)]
pub struct PypiOutcome {
    /// The determination.
    pub compatibility: Compatibility,
    /// Human-readable explanation.
    pub reason: String,
    /// The concrete version that was inspected, if any.
    pub checked_version: Option<String>,
    /// Set when the selected release is yanked.
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageResponse {
    info: PackageInfo,
    releases: std::collections::BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    version: Option<String>,
    #[serde(default)]
    classifiers: Vec<String>,
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    packagetype: String,
    #[serde(default)]
    yanked: bool,
    yanked_reason: Option<String>,
}

/// PyPI JSON API client with a process-lifetime cache.
pub struct PypiClient {
    client: reqwest::Client,
    base_url: String,
    /// Keyed by `(name, spec)`; holds unknown/error outcomes, so a repeated
    /// call with the same unresolvable spec doesn't re-hit the network.
    spec_cache: ResultCache<String, PypiOutcome>,
    /// Keyed by `(name, checkedVersion)`; shared across different specs
    /// that resolve to the same concrete version.
    version_cache: ResultCache<String, PypiOutcome>,
}

/// PEP 503 name canonicalization: lower-case, runs of `-_.` collapsed to a
/// single `-`.
pub fn canonicalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut result = String::with_capacity(lower.len());
    let mut last_was_separator = false;
    for ch in lower.chars() {
        if ch == '-' || ch == '_' || ch == '.' {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(ch);
            last_was_separator = false;
        }
    }
    result.trim_matches('-').to_string()
}

impl PypiClient {
    /// Construct a client pointed at the default PyPI JSON API.
    pub fn new() -> Self {
        Self::with_base_url("https://pypi.org/pypi")
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

    /// Check compatibility of `name` (optionally constrained by `spec`).
    pub async fn check(&self, name: &str, spec: Option<&str>) -> PypiOutcome {
        let normalized = canonicalize_name(name);
        let spec_key = match spec {
            Some(spec) => format!("{normalized}@{spec}"),
            None => normalized.clone(),
        };
        if let Some(cached) = self.spec_cache.get(&spec_key).await {
            return cached;
        }
        let outcome = self.fetch_and_classify(&normalized, spec).await;
        if outcome.checked_version.is_none() {
            self.spec_cache.put(spec_key, outcome.clone()).await;
        }
        outcome
    }

    async fn fetch_and_classify(&self, normalized_name: &str, spec: Option<&str>) -> PypiOutcome {
        let url = format!("{}/{normalized_name}/json", self.base_url);
        let response = match self.client.get(&url).timeout(std::time::Duration::from_secs(10)).send().await {
            Ok(response) => response,
            Err(e) => return unknown(format!("network error checking PyPI: {e}")),
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return unknown(format!("package '{normalized_name}' not found on PyPI"));
        }
        if !response.status().is_success() {
            return unknown(format!("PyPI API error: HTTP {}", response.status()));
        }

        let body: PackageResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return unknown(format!("PyPI response was not valid JSON: {e}")),
        };

        if body.releases.is_empty() {
            return unknown(format!("no releases found for '{normalized_name}' on PyPI"));
        }

        let target_version = match spec {
            Some(spec) => {
                match version::pypi_satisfying(spec, body.releases.keys().map(String::as_str)) {
                    Some(candidates) if !candidates.is_empty() => {
                        candidates.last().unwrap().0.to_string()
                    }
                    Some(_) => {
                        return unknown(format!(
                            "no version found satisfying '{spec}'"
                        ))
                    }
                    None => return unknown(format!("invalid version specifier: '{spec}'")),
                }
            }
            None => match body.info.version.clone() {
                Some(version) => version,
                None => return unknown("could not determine latest version from PyPI info"),
            },
        };

        let version_key = format!("{normalized_name}@{target_version}");
        if let Some(cached) = self.version_cache.get(&version_key).await {
            return cached;
        }

        let release_files = match body.releases.get(&target_version) {
            Some(files) => files,
            None => {
                return unknown(format!(
                    "internal error: target version {target_version} details missing"
                ))
            }
        };

        let outcome = classify_release(&target_version, release_files, &body.info);
        self.version_cache.put(version_key, outcome.clone()).await;
        outcome
    }
}

impl Default for PypiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(reason: impl Into<String>) -> PypiOutcome {
    PypiOutcome {
        compatibility: Compatibility::Unknown,
        reason: reason.into(),
        checked_version: None,
        warning: None,
    }
}

fn classify_release(
    target_version: &str,
    release_files: &[ReleaseFile],
    info: &PackageInfo,
) -> PypiOutcome {
    let yanked_file = release_files.iter().find(|f| f.yanked);
    let warning = yanked_file.map(|f| {
        format!(
            "version {target_version} is yanked: {}",
            f.yanked_reason.as_deref().unwrap_or("no reason provided")
        )
    });

    let mut arm_wheels = Vec::new();
    let mut universal_wheels = Vec::new();
    let mut sdist_files = Vec::new();
    let mut other_arch_wheels = Vec::new();

    for file in release_files.iter().filter(|f| !f.yanked) {
        match file.packagetype.as_str() {
            "bdist_wheel" => classify_wheel(
                &file.filename,
                &mut arm_wheels,
                &mut universal_wheels,
                &mut other_arch_wheels,
            ),
            "sdist" => sdist_files.push(file.filename.clone()),
            _ => {}
        }
    }

    let mut outcome = if !arm_wheels.is_empty() {
        PypiOutcome {
            compatibility: Compatibility::Yes,
            reason: format!("ARM-specific wheels found for version {target_version}"),
            checked_version: Some(target_version.to_string()),
            warning: None,
        }
    } else if !universal_wheels.is_empty() {
        PypiOutcome {
            compatibility: Compatibility::Yes,
            reason: format!(
                "platform-agnostic or universal wheels found for version {target_version}"
            ),
            checked_version: Some(target_version.to_string()),
            warning: None,
        }
    } else if !sdist_files.is_empty() {
        let has_native_code = info.classifiers.iter().any(|c| {
            c.contains("Programming Language :: C")
                || c.contains("Programming Language :: C++")
                || c.contains("Programming Language :: Cython")
        });
        let is_platform_specific = !matches!(info.platform.as_deref(), None | Some("") | Some("any"));
        if has_native_code || is_platform_specific {
            PypiOutcome {
                compatibility: Compatibility::Partial,
                reason: format!(
                    "source distribution found for {target_version}, may require compilation on ARM64 (contains C/C++/Cython or platform markers)"
                ),
                checked_version: Some(target_version.to_string()),
                warning: None,
            }
        } else {
            PypiOutcome {
                compatibility: Compatibility::Yes,
                reason: format!("likely pure Python source distribution found for {target_version}"),
                checked_version: Some(target_version.to_string()),
                warning: None,
            }
        }
    } else if !other_arch_wheels.is_empty() {
        PypiOutcome {
            compatibility: Compatibility::No,
            reason: format!(
                "only non-ARM wheels (e.g. x86_64) found for non-yanked files of version {target_version}"
            ),
            checked_version: Some(target_version.to_string()),
            warning: None,
        }
    } else {
        PypiOutcome {
            compatibility: Compatibility::Unknown,
            reason: format!(
                "no non-yanked wheels or source distribution found for version {target_version} on PyPI"
            ),
            checked_version: Some(target_version.to_string()),
            warning: None,
        }
    };

    outcome.warning = warning;
    outcome
}

fn classify_wheel(
    filename: &str,
    arm_wheels: &mut Vec<String>,
    universal_wheels: &mut Vec<String>,
    other_arch_wheels: &mut Vec<String>,
) {
    // Wheel filenames end in `-{python tag}-{abi tag}-{platform tag}.whl`;
    // we only need the trailing `pyver-abi-platform` group.
    let Some(captured) = extract_wheel_tag_group(filename) else {
        return;
    };
    let lower = captured.to_lowercase();
    if lower.contains("aarch64") || lower.contains("arm64") {
        arm_wheels.push(filename.to_string());
    } else if (lower.contains("universal2") && lower.contains("macosx"))
        || (lower.contains("any")
            && !["win", "linux", "macosx", "x86_64", "amd64"]
                .iter()
                .any(|arch| lower.contains(arch)))
    {
        universal_wheels.push(filename.to_string());
    } else if ["win_amd64", "amd64", "x86_64", "x64", "win32", "i686"]
        .iter()
        .any(|arch| lower.contains(arch))
    {
        other_arch_wheels.push(filename.to_string());
    }
}

fn extract_wheel_tag_group(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(".whl")?;
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() < 3 {
        return None;
    }
    let tag_start = parts[..parts.len() - 3].join("-").len() + if parts.len() > 3 { 1 } else { 0 };
    Some(&stem[tag_start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_name_collapses_separators() {
        assert_eq!(canonicalize_name("Foo__Bar.Baz"), "foo-bar-baz");
        assert_eq!(canonicalize_name("simple"), "simple");
    }

    #[test]
    fn test_classify_wheel_detects_arm() {
        let mut arm = Vec::new();
        let mut universal = Vec::new();
        let mut other = Vec::new();
        classify_wheel(
            "numpy-1.26.0-cp311-cp311-manylinux_2_17_aarch64.whl",
            &mut arm,
            &mut universal,
            &mut other,
        );
        assert_eq!(arm.len(), 1);
        assert!(universal.is_empty());
        assert!(other.is_empty());
    }

    #[test]
    fn test_classify_wheel_detects_x86_only() {
        let mut arm = Vec::new();
        let mut universal = Vec::new();
        let mut other = Vec::new();
        classify_wheel(
            "numpy-1.26.0-cp311-cp311-win_amd64.whl",
            &mut arm,
            &mut universal,
            &mut other,
        );
        assert!(arm.is_empty());
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_classify_wheel_detects_pure_python() {
        let mut arm = Vec::new();
        let mut universal = Vec::new();
        let mut other = Vec::new();
        classify_wheel("six-1.16.0-py2.py3-none-any.whl", &mut arm, &mut universal, &mut other);
        assert_eq!(universal.len(), 1);
    }
}
