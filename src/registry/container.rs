//! Docker Registry v2 client for container base-image manifest inspection.
//!
//! Grounded on `docker_analyzer.py`'s `_get_docker_auth_token`,
//! `_parse_image_name`, and `_check_image_compatibility_via_manifest`: same
//! image-name parsing rules, the same Docker Hub token-exchange flow, and
//! the same manifest/manifest-list/OCI-index traversal.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::core::config::ContainerRegistryConfig;
use crate::model::Compatibility;

use super::cache::ResultCache;

const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
const DOCKER_HUB_AUTH_URL: &str = "https://auth.docker.io/token";
const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";
const ARM64_ARCHS: [&str; 2] = ["arm64", "aarch64"];

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImage {
    pub registry: String,
    pub repository: String,
    pub tag_or_digest: String,
}

/// Result of inspecting one image's manifest.
#[derive(Debug, Clone)]
pub struct ManifestOutcome {
    pub compatibility: Compatibility,
    pub reason: String,
    pub architectures: Vec<String>,
    pub checked_type: &'static str,
}

/// Normalize an image reference the way the orchestrator/aggregator keys
/// its per-image state: implicit `:latest` if neither tag nor digest is
/// present, `scratch` left alone.
pub fn normalize_image_key(image: &str) -> String {
    if !image.contains(':') && !image.contains('@') && image != "scratch" {
        format!("{image}:latest")
    } else {
        image.to_string()
    }
}

/// Parse an image reference into `{registry, repository, tag_or_digest}`.
pub fn parse_image_name(image_name: &str) -> ParsedImage {
    if image_name.eq_ignore_ascii_case("scratch") {
        return ParsedImage {
            registry: "scratch".to_string(),
            repository: "scratch".to_string(),
            tag_or_digest: String::new(),
        };
    }

    let mut registry = DOCKER_HUB_REGISTRY.to_string();
    let repo_part;

    if let Some((first, rest)) = image_name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            registry = first.to_string();
            repo_part = rest.to_string();
        } else {
            repo_part = image_name.to_string();
        }
    } else {
        repo_part = image_name.to_string();
    }

    let (mut repo_name, tag_or_digest) = if let Some((name, digest)) = repo_part.split_once('@') {
        (name.to_string(), format!("@{digest}"))
    } else if let Some((base, maybe_tag)) = repo_part.rsplit_once(':') {
        (base.to_string(), maybe_tag.to_string())
    } else {
        (repo_part.clone(), "latest".to_string())
    };

    if registry == DOCKER_HUB_REGISTRY && !repo_name.contains('/') {
        repo_name = format!("library/{repo_name}");
    }

    ParsedImage {
        registry,
        repository: repo_name,
        tag_or_digest,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ManifestListResponse {
    manifests: Vec<ManifestListEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestListEntry {
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: Option<String>,
    os: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SingleManifestResponse {
    config: Option<ConfigDescriptor>,
    architecture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigDescriptor {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct ConfigBlob {
    architecture: Option<String>,
    os: Option<String>,
}

/// Docker Registry v2 client with token and manifest caching.
pub struct ContainerRegistryClient {
    client: reqwest::Client,
    credentials: ContainerRegistryConfig,
    token_cache: ResultCache<String, CachedToken>,
    manifest_cache: ResultCache<String, ManifestOutcome>,
}

impl ContainerRegistryClient {
    /// Construct a client from configured default-registry credentials.
    pub fn new(credentials: ContainerRegistryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            token_cache: ResultCache::new(),
            manifest_cache: ResultCache::new(),
        }
    }

    /// Inspect an image reference's manifest for `linux/arm64` support.
    pub async fn inspect(&self, image_name: &str) -> ManifestOutcome {
        let cache_key = normalize_image_key(image_name);

        if cache_key == "scratch:latest" || cache_key == "scratch" {
            return ManifestOutcome {
                compatibility: Compatibility::Yes,
                reason: "base image is 'scratch', which is inherently multi-arch".to_string(),
                architectures: vec!["multiple".to_string()],
                checked_type: "special",
            };
        }

        if let Some(cached) = self.manifest_cache.get(&cache_key).await {
            return cached;
        }

        let outcome = self.fetch_manifest(&cache_key).await;
        self.manifest_cache.put(cache_key, outcome.clone()).await;
        outcome
    }

    async fn fetch_manifest(&self, cache_key: &str) -> ManifestOutcome {
        let parsed = parse_image_name(cache_key);

        if parsed.registry != DOCKER_HUB_REGISTRY && parsed.registry.ends_with("amazonaws.com") {
            return unknown(
                "ECR images require AWS credentials; cannot check manifest without IAM configuration",
                "limited_support",
            );
        }

        let token = self.get_token(&parsed).await;
        let accept = format!(
            "{OCI_INDEX_V1}, {OCI_MANIFEST_V1}, {DOCKER_MANIFEST_LIST_V2}, {DOCKER_MANIFEST_V2}"
        );
        let manifest_url = format!(
            "https://{}/v2/{}/manifests/{}",
            parsed.registry, parsed.repository, parsed.tag_or_digest
        );

        let mut request = self
            .client
            .get(&manifest_url)
            .header("Accept", &accept)
            .timeout(Duration::from_secs(15));
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return unknown(format!("network error checking manifest: {e}"), "error"),
        };

        if !response.status().is_success() {
            return http_error_outcome(response.status());
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return unknown(format!("failed to read manifest body: {e}"), "error"),
        };

        if content_type.starts_with(DOCKER_MANIFEST_LIST_V2) || content_type.starts_with(OCI_INDEX_V1)
        {
            self.classify_manifest_list(&bytes)
        } else if content_type.starts_with(DOCKER_MANIFEST_V2) || content_type.starts_with(OCI_MANIFEST_V1)
        {
            self.classify_single_manifest(&bytes, &parsed, token.as_deref()).await
        } else {
            unknown(format!("unsupported manifest Content-Type: {content_type}"), "error")
        }
    }

    fn classify_manifest_list(&self, bytes: &[u8]) -> ManifestOutcome {
        let list: ManifestListResponse = match serde_json::from_slice(bytes) {
            Ok(list) => list,
            Err(e) => return unknown(format!("could not parse manifest list: {e}"), "error"),
        };
        if list.manifests.is_empty() {
            return unknown("manifest list/index is empty", "manifest_list/index");
        }
        let mut architectures = Vec::new();
        let mut is_arm64 = false;
        for entry in &list.manifests {
            let Some(platform) = &entry.platform else {
                continue;
            };
            let arch = platform.architecture.as_deref().unwrap_or("").to_lowercase();
            let os = platform.os.as_deref().unwrap_or("").to_lowercase();
            if !arch.is_empty() && !os.is_empty() {
                architectures.push(format!("{os}/{arch}"));
            }
            if ARM64_ARCHS.contains(&arch.as_str()) && os == "linux" {
                is_arm64 = true;
            }
        }
        architectures.sort();
        architectures.dedup();
        finalize(is_arm64, architectures, "manifest_list/index")
    }

    async fn classify_single_manifest(
        &self,
        bytes: &[u8],
        parsed: &ParsedImage,
        token: Option<&str>,
    ) -> ManifestOutcome {
        let manifest: SingleManifestResponse = match serde_json::from_slice(bytes) {
            Ok(manifest) => manifest,
            Err(e) => return unknown(format!("could not parse manifest: {e}"), "error"),
        };

        let mut architectures = Vec::new();
        let mut is_arm64 = false;

        if let Some(config) = &manifest.config {
            let config_url = format!(
                "https://{}/v2/{}/blobs/{}",
                parsed.registry, parsed.repository, config.digest
            );
            let mut request = self
                .client
                .get(&config_url)
                .timeout(Duration::from_secs(10));
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    if let Ok(blob) = response.json::<ConfigBlob>().await {
                        let arch = blob.architecture.unwrap_or_default().to_lowercase();
                        let os = blob.os.unwrap_or_default().to_lowercase();
                        if !arch.is_empty() && !os.is_empty() {
                            architectures.push(format!("{os}/{arch}"));
                        }
                        if ARM64_ARCHS.contains(&arch.as_str()) && os == "linux" {
                            is_arm64 = true;
                        }
                    }
                }
                _ => {
                    tracing::warn!("failed to fetch config blob; relying on top-level manifest info");
                }
            }
        }

        if architectures.is_empty() {
            // Per the open question in the design notes: a single manifest
            // with no config digest (or a failed config fetch) never
            // asserts compatibility=yes from the top-level field alone.
            if let Some(arch) = manifest.architecture.as_deref() {
                let arch = arch.to_lowercase();
                if !arch.is_empty() {
                    architectures.push(format!("unknown/{arch}"));
                }
            }
            return unknown(
                "single manifest architecture could not be determined (missing config digest and architecture field)",
                "manifest",
            );
        }

        architectures.sort();
        architectures.dedup();
        finalize(is_arm64, architectures, "manifest")
    }

    async fn get_token(&self, parsed: &ParsedImage) -> Option<String> {
        if parsed.registry != DOCKER_HUB_REGISTRY {
            return None;
        }
        let username = self.credentials.username.as_deref().unwrap_or("anonymous");
        let cache_key = format!("{username}:{}", parsed.repository);

        if let Some(cached) = self.token_cache.get(&cache_key).await {
            if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                return Some(cached.token);
            }
        }

        let mut request = self.client.get(DOCKER_HUB_AUTH_URL).query(&[
            ("service", "registry.docker.io"),
            ("scope", &format!("repository:{}:pull", parsed.repository)),
        ]);
        if let (Some(username), Some(password)) =
            (&self.credentials.username, &self.credentials.password)
        {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.timeout(Duration::from_secs(10)).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: TokenResponse = response.json().await.ok()?;
        let token = body.token?;

        self.token_cache
            .put(
                cache_key,
                CachedToken {
                    token: token.clone(),
                    expires_at: Instant::now() + Duration::from_secs(body.expires_in),
                },
            )
            .await;
        Some(token)
    }
}

fn finalize(is_arm64: bool, architectures: Vec<String>, checked_type: &'static str) -> ManifestOutcome {
    if is_arm64 {
        ManifestOutcome {
            compatibility: Compatibility::Yes,
            reason: "image manifest supports linux/arm64".to_string(),
            architectures,
            checked_type,
        }
    } else if !architectures.is_empty() {
        ManifestOutcome {
            compatibility: Compatibility::No,
            reason: format!(
                "image manifest does not list linux/arm64 support; found: {}",
                architectures.join(", ")
            ),
            architectures,
            checked_type,
        }
    } else {
        unknown("could not determine architecture support from manifest", checked_type)
    }
}

fn unknown(reason: impl Into<String>, checked_type: &'static str) -> ManifestOutcome {
    ManifestOutcome {
        compatibility: Compatibility::Unknown,
        reason: reason.into(),
        architectures: Vec::new(),
        checked_type,
    }
}

fn http_error_outcome(status: reqwest::StatusCode) -> ManifestOutcome {
    let reason = match status.as_u16() {
        401 => "authentication error accessing manifest; check credentials or image visibility".to_string(),
        403 => "permission denied accessing manifest; check repository permissions".to_string(),
        404 => "image manifest not found (404); check image name, tag, and registry".to_string(),
        429 => "API rate limit hit checking manifest; try again later".to_string(),
        other => format!("HTTP error {other} checking manifest"),
    };
    unknown(reason, "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scratch() {
        let parsed = parse_image_name("scratch");
        assert_eq!(parsed.registry, "scratch");
    }

    #[test]
    fn test_parse_official_image_gets_library_prefix() {
        let parsed = parse_image_name("python:3.9-slim");
        assert_eq!(parsed.registry, DOCKER_HUB_REGISTRY);
        assert_eq!(parsed.repository, "library/python");
        assert_eq!(parsed.tag_or_digest, "3.9-slim");
    }

    #[test]
    fn test_parse_user_repo_no_tag_defaults_latest() {
        let parsed = parse_image_name("someorg/legacy");
        assert_eq!(parsed.repository, "someorg/legacy");
        assert_eq!(parsed.tag_or_digest, "latest");
    }

    #[test]
    fn test_parse_private_registry() {
        let parsed = parse_image_name("myregistry.example.com:5000/team/app:v2");
        assert_eq!(parsed.registry, "myregistry.example.com:5000");
        assert_eq!(parsed.repository, "team/app");
        assert_eq!(parsed.tag_or_digest, "v2");
    }

    #[test]
    fn test_normalize_image_key_adds_latest() {
        assert_eq!(normalize_image_key("alpine"), "alpine:latest");
        assert_eq!(normalize_image_key("alpine:3.18"), "alpine:3.18");
        assert_eq!(normalize_image_key("scratch"), "scratch");
    }

    #[test]
    fn test_finalize_prefers_arm64_over_found_archs() {
        let outcome = finalize(true, vec!["linux/amd64".to_string(), "linux/arm64".to_string()], "manifest_list/index");
        assert_eq!(outcome.compatibility, Compatibility::Yes);
    }
}
