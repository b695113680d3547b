//! Client for the external ARM64 Python wheel-test archive.
//!
//! Grounded on `python_checker.py`'s `_get_latest_wheel_tester_results`:
//! find the latest successful workflow run, download its results artifact
//! (a zip containing a single `.json.xz`), and parse it. Fetched once per
//! process lifetime and cached, including cached failure.

use std::collections::HashMap;
use std::io::Read;

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tokio::sync::Mutex;

const OWNER: &str = "geoffreyblake";
const REPO: &str = "arm64-python-wheel-tester";
const WORKFLOW_ID: &str = "wheel-test.yaml";
const ARTIFACT_NAME_PATTERN: &str = "results";

/// Test outcome for one package under one Linux distribution test
/// environment.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEnvironmentResult {
    #[serde(rename = "test-passed")]
    pub test_passed: bool,
    #[serde(rename = "build-required", default)]
    pub build_required: bool,
}

/// Parsed archive contents: `{normalized_package_name: {env: result}}`.
pub type WheelTesterResults = HashMap<String, HashMap<String, TestEnvironmentResult>>;

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ArtifactsResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    id: u64,
    name: String,
}

/// Client for the external wheel-tester archive. Fetched and cached once
/// per process lifetime (`OnceCell`, mirroring the original's
/// fetched/not-fetched module-level flag).
pub struct WheelTesterClient {
    client: reqwest::Client,
    token: Option<String>,
    cached: Mutex<OnceCell<Option<WheelTesterResults>>>,
}

impl WheelTesterClient {
    /// Construct a client. A bearer token is required for meaningful
    /// access; without one, fetches fail and are cached as `None`.
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            cached: Mutex::new(OnceCell::new()),
        }
    }

    /// Fetch (or return the cached) latest successful results archive.
    pub async fn latest_results(&self) -> Option<WheelTesterResults> {
        let guard = self.cached.lock().await;
        if let Some(cached) = guard.get() {
            return cached.clone();
        }
        drop(guard);

        let fetched = self.fetch().await;
        let guard = self.cached.lock().await;
        let _ = guard.set(fetched.clone());
        fetched
    }

    async fn fetch(&self) -> Option<WheelTesterResults> {
        let Some(token) = &self.token else {
            tracing::warn!("cannot fetch wheel tester results: no forge token configured");
            return None;
        };

        let api_base = format!("https://api.github.com/repos/{OWNER}/{REPO}/actions");
        let headers = [
            ("Accept", "application/vnd.github.v3+json".to_string()),
            ("Authorization", format!("Bearer {token}")),
        ];

        let runs_url = format!("{api_base}/workflows/{WORKFLOW_ID}/runs?status=success&per_page=5");
        let runs: WorkflowRunsResponse = self.get_json(&runs_url, &headers).await?;
        let latest_run = runs.workflow_runs.first()?;

        let artifacts_url = format!("{api_base}/runs/{}/artifacts", latest_run.id);
        let artifacts: ArtifactsResponse = self.get_json(&artifacts_url, &headers).await?;
        if artifacts.artifacts.is_empty() {
            tracing::warn!(run_id = latest_run.id, "no artifacts found for wheel tester run");
            return None;
        }
        let target = artifacts
            .artifacts
            .iter()
            .find(|a| a.name.to_lowercase().contains(ARTIFACT_NAME_PATTERN))
            .unwrap_or(&artifacts.artifacts[0]);

        let download_url = format!("{api_base}/artifacts/{}/zip", target.id);
        let mut request = self.client.get(&download_url).timeout(std::time::Duration::from_secs(60));
        for (name, value) in &headers {
            request = request.header(*name, value);
        }
        let response = request.send().await.ok()?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "failed to download wheel tester artifact");
            return None;
        }
        let bytes = response.bytes().await.ok()?;

        extract_results(&bytes)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Option<T> {
        let mut request = self.client.get(url).timeout(std::time::Duration::from_secs(15));
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send().await.ok()?;
        if !response.status().is_success() {
            tracing::warn!(url, status = %response.status(), "wheel tester API request failed");
            return None;
        }
        response.json().await.ok()
    }
}

fn extract_results(zip_bytes: &[u8]) -> Option<WheelTesterResults> {
    let cursor = std::io::Cursor::new(zip_bytes);
    let mut archive = zip::ZipArchive::new(cursor).ok()?;
    let mut xz_name = None;
    for name in archive.file_names() {
        if name.ends_with(".json.xz") {
            xz_name = Some(name.to_string());
            break;
        }
    }
    let xz_name = xz_name?;

    let mut xz_bytes = Vec::new();
    archive.by_name(&xz_name).ok()?.read_to_end(&mut xz_bytes).ok()?;

    let mut decompressed = String::new();
    xz2::read::XzDecoder::new(&xz_bytes[..])
        .read_to_string(&mut decompressed)
        .ok()?;

    serde_json::from_str(&decompressed).ok()
}

/// Check whether a package passed on any recent Linux test environment, in
/// priority order `noble`, `jammy`, `focal`.
pub fn recent_pass(results: &WheelTesterResults, normalized_name: &str) -> Option<&'static str> {
    let package = results.get(normalized_name)?;
    for env in ["noble", "jammy", "focal"] {
        if let Some(result) = package.get(env) {
            if result.test_passed {
                return Some(env);
            }
        }
    }
    None
}

/// Check whether a package failed on any recorded environment (used once
/// `recent_pass` returns `None`).
pub fn any_recorded_failure(results: &WheelTesterResults, normalized_name: &str) -> Vec<String> {
    let Some(package) = results.get(normalized_name) else {
        return Vec::new();
    };
    package
        .iter()
        .filter(|(_, result)| !result.test_passed)
        .map(|(env, _)| env.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> WheelTesterResults {
        let mut package = HashMap::new();
        package.insert(
            "jammy".to_string(),
            TestEnvironmentResult {
                test_passed: true,
                build_required: true,
            },
        );
        package.insert(
            "focal".to_string(),
            TestEnvironmentResult {
                test_passed: false,
                build_required: false,
            },
        );
        let mut results = HashMap::new();
        results.insert("numpy".to_string(), package);
        results
    }

    #[test]
    fn test_recent_pass_prefers_noble_then_jammy() {
        let results = sample_results();
        assert_eq!(recent_pass(&results, "numpy"), Some("jammy"));
        assert_eq!(recent_pass(&results, "scipy"), None);
    }

    #[test]
    fn test_any_recorded_failure_lists_failed_envs() {
        let results = sample_results();
        let failures = any_recorded_failure(&results, "numpy");
        assert_eq!(failures, vec!["focal".to_string()]);
    }
}
