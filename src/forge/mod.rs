//! Code forge client: repository metadata, file tree, and file content.
//!
//! Targets a GitHub-compatible REST API. Grounded on the original
//! `github_service.py`: the same endpoints, the same base64-padding fix
//! before decoding, and the same UTF-8-then-Latin-1 fallback for content
//! that isn't valid UTF-8.

use base64::Engine as _;
use serde::Deserialize;

use crate::core::config::ForgeConfig;
use crate::core::errors::{EngineError, Result};
use crate::model::{EntryKind, FileContent, TreeEntry};

/// Client for a GitHub-compatible code forge REST API.
pub struct RepoFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<RawTreeEntry>,
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RawTreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    content_type: String,
    encoding: Option<String>,
    content: Option<String>,
}

impl RepoFetcher {
    /// Build a client from forge configuration.
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "arm-compat-rs");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("token {token}"));
        }
        builder
    }

    /// Fetch the repository's default branch, returning [`EngineError::RepoNotFound`]
    /// on a 404.
    pub async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let url = format!("{}/repos/{owner}/{repo}", self.base_url);
        tracing::info!(owner, repo, "fetching repository info");
        let response = self.request(&url).send().await?;
        match response.status() {
            reqwest::StatusCode::OK => {
                let body: RepositoryResponse = response.json().await?;
                Ok(body.default_branch)
            }
            reqwest::StatusCode::NOT_FOUND => Err(EngineError::repo_not_found(owner, repo)),
            status => Err(EngineError::forge_api(
                format!("failed to get repository info for {owner}/{repo}"),
                Some(status.as_u16()),
            )),
        }
    }

    /// Fetch the full recursive file tree for a branch.
    pub async fn get_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        tracing::info!(owner, repo, branch, "fetching repository tree");
        let branch_url = format!("{}/repos/{owner}/{repo}/branches/{branch}", self.base_url);
        let branch_response = self.request(&branch_url).send().await?;
        let commit_sha = match branch_response.status() {
            reqwest::StatusCode::OK => {
                let body: BranchResponse = branch_response.json().await?;
                body.commit.sha
            }
            reqwest::StatusCode::NOT_FOUND => {
                return Err(EngineError::branch_not_found(owner, repo, branch))
            }
            status => {
                return Err(EngineError::forge_api(
                    format!("failed to get branch info for {owner}/{repo}/{branch}"),
                    Some(status.as_u16()),
                ))
            }
        };

        let tree_url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{commit_sha}?recursive=1",
            self.base_url
        );
        let tree_response = self.request(&tree_url).send().await?;
        if tree_response.status() != reqwest::StatusCode::OK {
            return Err(EngineError::forge_api(
                format!("failed to get repository tree for {owner}/{repo} (sha {commit_sha})"),
                Some(tree_response.status().as_u16()),
            ));
        }
        let body: TreeResponse = tree_response.json().await?;
        if body.truncated {
            tracing::warn!(
                owner,
                repo,
                "tree response was truncated; some files may be missing"
            );
        }
        Ok(body
            .tree
            .into_iter()
            .map(|entry| TreeEntry {
                path: entry.path,
                kind: match entry.entry_type.as_str() {
                    "tree" => EntryKind::Tree,
                    _ => EntryKind::Blob,
                },
                size: entry.size,
            })
            .collect())
    }

    /// Fetch and decode a single file's content. Returns `Ok(None)` if the
    /// path doesn't exist or isn't a regular file.
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContent>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{path}?ref={branch}",
            self.base_url
        );
        tracing::debug!(owner, repo, path, "fetching file content");
        let response = self.request(&url).send().await?;
        match response.status() {
            reqwest::StatusCode::OK => {
                let body: ContentResponse = response.json().await?;
                if body.content_type != "file" {
                    tracing::warn!(path, kind = %body.content_type, "path is not a file");
                    return Ok(None);
                }
                let (encoding, raw) = match (body.encoding.as_deref(), body.content) {
                    (Some("base64"), Some(content)) => ("base64", content),
                    _ => {
                        return Err(EngineError::decode(
                            path,
                            "unexpected content format (no base64 payload)",
                        ))
                    }
                };
                debug_assert_eq!(encoding, "base64");
                let bytes = decode_base64_padded(&raw)
                    .map_err(|e| EngineError::decode(path, format!("base64 error: {e}")))?;
                let text = decode_text_with_fallback(&bytes);
                Ok(Some(FileContent {
                    path: path.to_string(),
                    bytes,
                    text: Some(text),
                }))
            }
            reqwest::StatusCode::NOT_FOUND => {
                tracing::warn!(path, "file not found");
                Ok(None)
            }
            status => Err(EngineError::forge_api(
                format!("failed to get file content for {path}"),
                Some(status.as_u16()),
            )),
        }
    }
}

fn decode_base64_padded(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let missing_padding = encoded.len() % 4;
    let mut padded = encoded.to_string();
    if missing_padding != 0 {
        padded.push_str(&"=".repeat(4 - missing_padding));
    }
    base64::engine::general_purpose::STANDARD.decode(padded)
}

fn decode_text_with_fallback(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_padded_fixes_missing_padding() {
        let unpadded = "aGVsbG8"; // "hello" without trailing '='
        let decoded = decode_base64_padded(unpadded).unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_text_falls_back_for_invalid_utf8() {
        let bytes = vec![0xff, 0xfe, b'a'];
        let text = decode_text_with_fallback(&bytes);
        assert_eq!(text.chars().last(), Some('a'));
    }
}
