//! Container build-file analyzer: inspects Dockerfile-style build files for
//! non-ARM64-compatible base images and architecture-sensitive commands.
//!
//! Grounded on `docker_analyzer.py`: the same backslash line-joining
//! algorithm, the same `FROM` regex and arch-sensitive-line patterns, and
//! the same three-pass aggregation (collect → manifest-check → assess).

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AggregatedResult, AnalyzerId, Compatibility, Finding};
use crate::registry::container::normalize_image_key;

use super::{Analyzer, FileAnalysis, RegistryClients};

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(^|/)dockerfile$").expect("valid regex"),
        Regex::new(r"(?i)(^|/)dockerfile\.[^/]+$").expect("valid regex"),
        Regex::new(r"(?i)\.dockerfile$").expect("valid regex"),
    ]
});

static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*FROM\s+(?:--platform=(\S+)\s+)?([\w.:/@-]+)(?:\s+AS\s+\S+)?\s*$")
        .expect("valid regex")
});

static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(FROM|RUN|ARG|ENV|COPY|ADD)\s+").expect("valid regex"));

static ADD_ARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)dpkg --add-architecture\s+(amd64|x86_64)").expect("valid regex"));
static DOWNLOAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(wget|curl)\s+.*/(.*(amd64|x86_64).*\.(deb|rpm|tar\.gz|zip|bin))")
        .expect("valid regex")
});
static COPY_LIB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(copy|add)\s+.*\.(so|a)(\s+|$)").expect("valid regex"));
static COPY_ARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(copy|add)\s+.*(amd64|x86_64)").expect("valid regex"));
static INSTALL_ARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(apt-get|yum|dnf|apk)\s+install.*:(amd64|x86_64)").expect("valid regex"));
static TARGET_ARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(TARGETARCH|TARGETPLATFORM)\b").expect("valid regex"));
static X86_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(amd64|x86_64)\b").expect("valid regex"));

const ARCH_KEYWORDS: [&str; 7] = [
    "amd64",
    "x86_64",
    "arm64",
    "aarch64",
    "graviton",
    "--platform",
    "targetarch",
];

fn join_continuation_lines(content: &str) -> Vec<String> {
    let mut joined = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            // Keep comments (and blank lines) as separate lines; a
            // continuation in progress is flushed first rather than
            // spliced with the comment text.
            if !current.is_empty() {
                joined.push(std::mem::take(&mut current));
            }
            joined.push(line.to_string());
            continue;
        }

        if current.ends_with('\\') {
            current.truncate(current.len() - 1);
            current.push(' ');
            current.push_str(stripped);
        } else {
            if !current.is_empty() {
                joined.push(std::mem::take(&mut current));
            }
            current = stripped.to_string();
        }

        if !stripped.ends_with('\\') {
            joined.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        joined.push(current);
    }
    joined
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
struct BaseImageInfo {
    name: String,
    platform_used: Option<String>,
    line: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ExtractedDockerfile {
    base_images: Vec<BaseImageInfo>,
    arch_specific_lines: Vec<String>,
}

fn is_arch_sensitive_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if COMMAND_RE.is_match(line) {
        for keyword in ARCH_KEYWORDS {
            if lower.contains(keyword) {
                return true;
            }
        }
    }
    ADD_ARCH_RE.is_match(line)
        || DOWNLOAD_RE.is_match(line)
        || COPY_LIB_RE.is_match(line)
        || COPY_ARCH_RE.is_match(line)
}

/// Analyzer for Dockerfile-style container build files.
#[derive(Default)]
pub struct ContainerAnalyzer;

#[async_trait]
impl Analyzer for ContainerAnalyzer {
    fn id(&self) -> AnalyzerId {
        AnalyzerId::Container
    }

    fn patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn analyze(&self, content: &str, path: &str) -> FileAnalysis {
        let joined_lines = join_continuation_lines(content);
        let processed_content = joined_lines.join("\n");

        let mut base_images = Vec::new();
        for captures in FROM_RE.captures_iter(&processed_content) {
            let image_name = captures[2].to_string();
            if image_name.starts_with("${") {
                continue;
            }
            base_images.push(BaseImageInfo {
                name: image_name,
                platform_used: captures.get(1).map(|m| m.as_str().to_string()),
                line: captures[0].trim().to_string(),
            });
        }

        let mut arch_specific_lines = BTreeSet::new();
        for line in &joined_lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if is_arch_sensitive_line(trimmed) {
                arch_specific_lines.insert(trimmed.to_string());
            }
        }

        let extracted = ExtractedDockerfile {
            base_images,
            arch_specific_lines: arch_specific_lines.into_iter().collect(),
        };

        FileAnalysis {
            path: path.to_string(),
            data: serde_json::to_value(extracted).unwrap_or(serde_json::Value::Null),
        }
    }

    async fn aggregate(
        &self,
        outputs: Vec<FileAnalysis>,
        registries: &RegistryClients,
    ) -> AggregatedResult {
        let mut result = AggregatedResult::default();

        struct ImageUsage {
            files: BTreeSet<String>,
            platforms_used: BTreeSet<String>,
        }
        let mut images_data: BTreeMap<String, ImageUsage> = BTreeMap::new();
        let mut lines_by_file: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for output in &outputs {
            let Ok(extracted) = serde_json::from_value::<ExtractedDockerfile>(output.data.clone())
            else {
                continue;
            };
            for line in &extracted.arch_specific_lines {
                lines_by_file
                    .entry(line.clone())
                    .or_default()
                    .insert(output.path.clone());
            }
            for image in &extracted.base_images {
                let key = normalize_image_key(&image.name);
                let entry = images_data.entry(key).or_insert_with(|| ImageUsage {
                    files: BTreeSet::new(),
                    platforms_used: BTreeSet::new(),
                });
                entry.files.insert(output.path.clone());
                if let Some(platform) = &image.platform_used {
                    entry.platforms_used.insert(platform.to_lowercase());
                }
            }
        }

        let mut overall_low = false;
        let mut overall_medium = false;

        for (image_key, usage) in &images_data {
            let outcome = registries.container.inspect(image_key).await;
            let files_str = usage
                .files
                .iter()
                .map(|f| format!("`{f}`"))
                .collect::<Vec<_>>()
                .join(", ");

            let mut finding =
                Finding::new(self.id(), image_key.clone(), outcome.compatibility, outcome.reason.clone());

            match outcome.compatibility {
                Compatibility::Yes => {
                    if usage.platforms_used.contains("linux/amd64") {
                        let recommendation = format!(
                            "Modify Dockerfile(s) for `{image_key}`: remove/change explicit `--platform=linux/amd64` (used in: {files_str})."
                        );
                        result.push_recommendation(recommendation.clone());
                        finding = finding.with_recommendation(recommendation);
                    }
                }
                Compatibility::No => {
                    overall_low = true;
                    let recommendation = format!(
                        "Major blocker: base image `{image_key}` is not ARM64 compatible. Replace it with a multi-arch or ARM64 variant (used in: {files_str})."
                    );
                    result.push_recommendation(recommendation.clone());
                    finding = finding.with_recommendation(recommendation);
                }
                Compatibility::Unknown => {
                    overall_medium = true;
                    let recommendation = format!(
                        "Manually verify ARM64 support for `{image_key}` (used in: {files_str})."
                    );
                    result.push_recommendation(recommendation.clone());
                    finding = finding.with_recommendation(recommendation);
                }
                Compatibility::Partial => {
                    overall_medium = true;
                }
            }

            result.push_reasoning(finding.reason.clone());
            result.findings.push(finding);
        }

        for (line, files) in &lines_by_file {
            let lower = line.to_lowercase();
            let files_str = files
                .iter()
                .map(|f| format!("`{f}`"))
                .collect::<Vec<_>>()
                .join(", ");

            let (compatibility, reason, recommendation) = if DOWNLOAD_RE.is_match(&lower)
                || ADD_ARCH_RE.is_match(&lower)
                || INSTALL_ARCH_RE.is_match(&lower)
            {
                overall_low = true;
                (
                    Compatibility::No,
                    format!("line explicitly fetches or installs an x86-specific binary/package: `{line}` (in {files_str})"),
                    Some(format!(
                        "Replace x86-specific download/install with an ARM64 equivalent or multi-arch method in line: `{line}` (in {files_str})"
                    )),
                )
            } else if COPY_LIB_RE.is_match(&lower) {
                overall_medium = true;
                (
                    Compatibility::Partial,
                    format!("line copies a native library (.so/.a); ensure an ARM64 build is available: `{line}` (in {files_str})"),
                    Some(format!(
                        "Verify/modify: ensure an ARM64-compatible library is copied or built for line: `{line}` (in {files_str})"
                    )),
                )
            } else if COPY_ARCH_RE.is_match(&lower) {
                overall_medium = true;
                (
                    Compatibility::Partial,
                    format!("line copies a file potentially named for x86: `{line}` (in {files_str})"),
                    Some(format!(
                        "Verify/modify: check if an ARM variant is needed for the file copied in line: `{line}` (in {files_str})"
                    )),
                )
            } else if TARGET_ARCH_RE.is_match(line) {
                (
                    Compatibility::Yes,
                    format!("line uses multi-arch build arguments (TARGETARCH/TARGETPLATFORM): `{line}` (in {files_str})"),
                    None,
                )
            } else if X86_KEYWORD_RE.is_match(&lower) {
                overall_medium = true;
                (
                    Compatibility::Partial,
                    format!("line contains an x86 keyword ('amd64'/'x86_64'); review context: `{line}` (in {files_str})"),
                    Some(format!(
                        "Verify: review use of x86 keyword in line: `{line}` (in {files_str})"
                    )),
                )
            } else {
                continue;
            };

            let mut finding = Finding::new(self.id(), line.clone(), compatibility, reason);
            if let Some(recommendation) = recommendation {
                result.push_recommendation(recommendation.clone());
                finding = finding.with_recommendation(recommendation);
            }
            result.push_reasoning(finding.reason.clone());
            result.findings.push(finding);
        }

        let overall = if overall_low {
            "low"
        } else if overall_medium {
            "medium"
        } else if images_data.is_empty() {
            "unknown"
        } else {
            "high"
        };
        result.push_reasoning(format!("overall ARM64 migration potential: {overall}"));

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_continuation_lines() {
        let content = "RUN apt-get update && \\\n    apt-get install -y curl\nFROM alpine";
        let joined = join_continuation_lines(content);
        assert_eq!(joined.len(), 2);
        assert!(joined[0].contains("apt-get install"));
    }

    #[test]
    fn test_join_continuation_lines_keeps_comment_separate() {
        let content = "RUN apt-get update && \\\n# a comment\n    apt-get install -y curl";
        let joined = join_continuation_lines(content);
        assert_eq!(joined, vec![
            "RUN apt-get update && \\".to_string(),
            "# a comment".to_string(),
            "apt-get install -y curl".to_string(),
        ]);
    }

    #[test]
    fn test_analyze_extracts_from_and_skips_variable_image() {
        let analyzer = ContainerAnalyzer;
        let content = "FROM --platform=linux/amd64 python:3.11-slim AS build\nFROM ${BASE_IMAGE}\n";
        let output = analyzer.analyze(content, "Dockerfile");
        let extracted: ExtractedDockerfile = serde_json::from_value(output.data).unwrap();
        assert_eq!(extracted.base_images.len(), 1);
        assert_eq!(extracted.base_images[0].name, "python:3.11-slim");
        assert_eq!(extracted.base_images[0].platform_used.as_deref(), Some("linux/amd64"));
    }

    #[test]
    fn test_analyze_flags_arch_sensitive_copy() {
        let analyzer = ContainerAnalyzer;
        let content = "FROM alpine\nCOPY libfoo_amd64.so /usr/lib/\n";
        let output = analyzer.analyze(content, "Dockerfile");
        let extracted: ExtractedDockerfile = serde_json::from_value(output.data).unwrap();
        assert_eq!(extracted.arch_specific_lines.len(), 1);
    }
}
