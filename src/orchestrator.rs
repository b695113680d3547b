//! Ties the forge client, the pluggable analyzers, and the registry clients
//! together into one `Analyze` call.
//!
//! Grounded on `analysis_orchestrator.py`'s `AnalysisOrchestrator`: the same
//! owner/repo extraction, the same per-analyzer file-pattern dispatch, and
//! the same overall-compatibility determination (including its distinction
//! between "no relevant files found" and "files found but nothing flagged").

use std::collections::BTreeMap;

use url::Url;

use crate::analyzers::{self, Analyzer, FileAnalysis, RegistryClients};
use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, Result};
use crate::forge::RepoFetcher;
use crate::model::{
    AggregatedResult, AnalyzerId, OverallCompatibility, RepoRef, Statistics, Verdict,
};

/// Extract `(owner, repo)` from a forge repository URL.
fn extract_repo_ref(url: &str) -> Result<RepoRef> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| EngineError::invalid_input(format!("not a repository URL: {trimmed} ({e})")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(EngineError::invalid_input(format!(
            "not a repository URL: {trimmed}"
        )));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let [owner, name] = segments.as_slice() else {
        return Err(EngineError::invalid_input(format!(
            "not a repository URL: {trimmed}"
        )));
    };
    let name = name.strip_suffix(".git").unwrap_or(name);

    Ok(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
        url: trimmed.to_string(),
    })
}

/// Ties the forge, analyzers, and registry clients together.
pub struct Orchestrator {
    config: EngineConfig,
    fetcher: RepoFetcher,
}

impl Orchestrator {
    /// Build an orchestrator from engine configuration.
    pub fn new(config: EngineConfig) -> Self {
        let fetcher = RepoFetcher::new(&config.forge);
        Self { config, fetcher }
    }

    fn enabled_analyzers(&self) -> Vec<Box<dyn Analyzer>> {
        let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::new();
        if self.config.analyzers.infra {
            analyzers.push(Box::new(analyzers::infra::InfraTemplateAnalyzer));
        }
        if self.config.analyzers.container {
            analyzers.push(Box::new(analyzers::container::ContainerAnalyzer));
        }
        if self.config.analyzers.dependency {
            analyzers.push(Box::new(analyzers::dependency::DependencyAnalyzer));
        }
        analyzers
    }

    /// Run one full analysis of the repository at `url`.
    pub async fn analyze(&self, url: &str) -> Result<Verdict> {
        let repo_ref = extract_repo_ref(url)?;
        tracing::info!(owner = %repo_ref.owner, repo = %repo_ref.name, "starting analysis");

        let default_branch = self
            .fetcher
            .get_default_branch(&repo_ref.owner, &repo_ref.name)
            .await?;
        let tree = self
            .fetcher
            .get_tree(&repo_ref.owner, &repo_ref.name, &default_branch)
            .await?;
        tracing::info!(entries = tree.len(), "fetched repository tree");

        let analyzer_list = self.enabled_analyzers();
        let registries = RegistryClients::new(
            self.config.container_registry.clone(),
            self.config.forge.token.clone(),
        );

        let mut analysis_details = BTreeMap::new();
        let mut files_analyzed_by_type = BTreeMap::new();
        let mut total_files_analyzed = 0usize;

        for analyzer in &analyzer_list {
            let mut worklist = Vec::new();
            for entry in &tree {
                if entry.kind != crate::model::EntryKind::Blob {
                    continue;
                }
                if analyzers::matches_any(analyzer.patterns(), &entry.path) {
                    worklist.push(entry.path.clone());
                }
            }
            tracing::debug!(
                analyzer = %analyzer.id(),
                files = worklist.len(),
                "dispatching matched files"
            );

            let mut outputs: Vec<FileAnalysis> = Vec::new();
            for path in &worklist {
                let content = match self
                    .fetcher
                    .get_file_content(&repo_ref.owner, &repo_ref.name, path, &default_branch)
                    .await
                {
                    Ok(Some(file)) => file,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(path, error = %err, "failed to fetch file content; skipping");
                        continue;
                    }
                };
                let Some(text) = content.text.as_deref() else {
                    continue;
                };
                outputs.push(analyzer.analyze(text, path));
            }

            total_files_analyzed += outputs.len();
            files_analyzed_by_type.insert(analyzer.id().to_string(), outputs.len());

            let result = analyzer.aggregate(outputs, &registries).await;
            tracing::info!(
                analyzer = %analyzer.id(),
                findings = result.findings.len(),
                "aggregation complete"
            );
            analysis_details.insert(analyzer.id(), result);
        }

        Ok(self.compose_verdict(
            repo_ref,
            default_branch,
            analysis_details,
            files_analyzed_by_type,
            total_files_analyzed,
        ))
    }

    fn compose_verdict(
        &self,
        repo_ref: RepoRef,
        default_branch: String,
        analysis_details: BTreeMap<AnalyzerId, AggregatedResult>,
        files_analyzed_by_type: BTreeMap<String, usize>,
        total_files_analyzed: usize,
    ) -> Verdict {
        let all_findings: Vec<&crate::model::Finding> = analysis_details
            .values()
            .flat_map(|result| result.findings.iter())
            .collect();

        let mut overall_compatibility = Verdict::classify_overall(&all_findings);

        let mut recommendations = Vec::new();
        let mut reasoning = Vec::new();
        for result in analysis_details.values() {
            for rec in &result.recommendations {
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
            for why in &result.reasoning {
                if !reasoning.contains(why) {
                    reasoning.push(why.clone());
                }
            }
        }
        recommendations.sort();

        if all_findings.is_empty() {
            overall_compatibility = OverallCompatibility::Unknown;
            if total_files_analyzed == 0 {
                reasoning.push(
                    "No relevant infrastructure, container, or dependency files were found in this repository.".to_string(),
                );
            } else {
                reasoning.push(
                    "No specific ARM64 compatibility indicators were found in the analyzed files.".to_string(),
                );
            }
        }

        let mut counts_by_compat = BTreeMap::new();
        for finding in &all_findings {
            let label = match finding.compatibility {
                crate::model::Compatibility::Yes => "yes",
                crate::model::Compatibility::No => "no",
                crate::model::Compatibility::Partial => "partial",
                crate::model::Compatibility::Unknown => "unknown",
            };
            *counts_by_compat.entry(label.to_string()).or_insert(0usize) += 1;
        }

        let enabled_analyzers = AnalyzerId::ALL
            .into_iter()
            .filter(|id| analysis_details.contains_key(id))
            .collect();

        Verdict {
            repository: format!("{}/{}", repo_ref.owner, repo_ref.name),
            github_url: repo_ref.url,
            default_branch,
            analysis_details,
            overall_compatibility,
            recommendations,
            reasoning,
            enabled_analyzers,
            statistics: Statistics {
                files_analyzed_by_type,
                total_files_analyzed,
                counts_by_compat,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_repo_ref_strips_git_suffix_and_slash() {
        let repo_ref = extract_repo_ref("https://github.com/acme/widgets.git/").unwrap();
        assert_eq!(repo_ref.owner, "acme");
        assert_eq!(repo_ref.name, "widgets");
    }

    #[test]
    fn test_extract_repo_ref_rejects_non_url() {
        assert!(extract_repo_ref("not a url").is_err());
    }

    #[test]
    fn test_extract_repo_ref_plain() {
        let repo_ref = extract_repo_ref("https://github.com/acme/widgets").unwrap();
        assert_eq!(repo_ref.owner, "acme");
        assert_eq!(repo_ref.name, "widgets");
    }
}
