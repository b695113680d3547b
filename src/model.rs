//! Core data model: the types that flow between the forge, the analyzers,
//! and the final verdict.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner/name pair identifying a repository, derived from the input URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository owner or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// The original URL the ref was extracted from.
    pub url: String,
}

/// The kind of a tree entry returned by the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// A single entry in a repository's recursive file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// Whether this is a file (`Blob`) or directory (`Tree`).
    pub kind: EntryKind,
    /// Size in bytes, if known (blobs only).
    pub size: Option<u64>,
}

/// The decoded content of a single file.
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Path relative to the repository root.
    pub path: String,
    /// Raw bytes as transported.
    pub bytes: Vec<u8>,
    /// Decoded text, if the bytes could be decoded (UTF-8, with an 8-bit
    /// fallback for files that aren't valid UTF-8).
    pub text: Option<String>,
}

/// The closed set of analyzer identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerId {
    Infra,
    Container,
    Dependency,
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalyzerId::Infra => "infra",
            AnalyzerId::Container => "container",
            AnalyzerId::Dependency => "dependency",
        };
        write!(f, "{s}")
    }
}

impl AnalyzerId {
    /// All analyzer identities, in the fixed order the verdict uses.
    pub const ALL: [AnalyzerId; 3] = [
        AnalyzerId::Infra,
        AnalyzerId::Container,
        AnalyzerId::Dependency,
    ];
}

/// A compatibility determination for some subject (an instance type, a
/// container image, a dependency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    Yes,
    No,
    Partial,
    Unknown,
}

impl Compatibility {
    /// Whether this value counts toward the verdict's "has a determination"
    /// test (`yes`/`no`/`partial`, as opposed to `unknown`).
    pub fn is_determined(self) -> bool {
        !matches!(self, Compatibility::Unknown)
    }
}

/// A single finding produced by an analyzer's `aggregate` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Which analyzer produced this finding.
    pub analyzer_id: AnalyzerId,
    /// A type-specific identifier for what this finding is about (an
    /// instance type, an image reference, a `name@version`).
    pub subject: String,
    /// The compatibility determination.
    pub compatibility: Compatibility,
    /// Human-readable explanation. Non-empty whenever `compatibility=no`.
    pub reason: String,
    /// Suggested remediation, if any.
    pub recommendation: Option<String>,
    /// Free-form supporting evidence (e.g. the exact `cpu` field value).
    pub evidence: Option<serde_json::Value>,
}

impl Finding {
    /// Construct a finding, enforcing the "no" implies non-empty reason
    /// invariant defensively (callers should already supply a reason).
    pub fn new(
        analyzer_id: AnalyzerId,
        subject: impl Into<String>,
        compatibility: Compatibility,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            analyzer_id,
            subject: subject.into(),
            compatibility,
            reason: reason.into(),
            recommendation: None,
            evidence: None,
        }
    }

    /// Builder-style setter for the recommendation field.
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    /// Builder-style setter for the evidence field.
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// The combined output of one analyzer's `aggregate` step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Per-subject findings.
    pub findings: Vec<Finding>,
    /// Deduplicated, sorted recommendation strings.
    pub recommendations: Vec<String>,
    /// Order-preserving deduplicated reasoning strings.
    pub reasoning: Vec<String>,
    /// Set when the aggregator itself failed with an internal error; the
    /// analyzer's slot is still present but carries no findings.
    pub error: Option<String>,
}

impl AggregatedResult {
    /// Append a recommendation, keeping the collection sorted and deduped.
    pub fn push_recommendation(&mut self, recommendation: impl Into<String>) {
        let recommendation = recommendation.into();
        if !self.recommendations.contains(&recommendation) {
            self.recommendations.push(recommendation);
        }
        self.recommendations.sort();
        self.recommendations.dedup();
    }

    /// Append a reasoning string, preserving insertion order but dropping
    /// exact duplicates.
    pub fn push_reasoning(&mut self, reasoning: impl Into<String>) {
        let reasoning = reasoning.into();
        if !self.reasoning.contains(&reasoning) {
            self.reasoning.push(reasoning);
        }
    }
}

/// The overall compatibility verdict for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallCompatibility {
    Compatible,
    Incompatible,
    Unknown,
}

/// Counts of files processed, by analyzer and by outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of files routed to each analyzer.
    pub files_analyzed_by_type: BTreeMap<String, usize>,
    /// Total number of files dispatched to any analyzer.
    pub total_files_analyzed: usize,
    /// Count of findings by compatibility outcome.
    pub counts_by_compat: BTreeMap<String, usize>,
}

/// The top-level result of one `Analyze` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// `owner/name` of the analyzed repository.
    pub repository: String,
    /// The original input URL.
    pub github_url: String,
    /// The branch that was analyzed.
    pub default_branch: String,
    /// Per-analyzer aggregated results.
    pub analysis_details: BTreeMap<AnalyzerId, AggregatedResult>,
    /// The overall compatibility determination.
    pub overall_compatibility: OverallCompatibility,
    /// Deduplicated, sorted recommendations across all analyzers.
    pub recommendations: Vec<String>,
    /// Deduplicated, order-preserving reasoning across all analyzers.
    pub reasoning: Vec<String>,
    /// Which analyzers were enabled for this run.
    pub enabled_analyzers: Vec<AnalyzerId>,
    /// File/finding counts.
    pub statistics: Statistics,
}

impl Verdict {
    /// Derive [`OverallCompatibility`] from a set of findings, per the
    /// invariants: incompatible iff any finding is `no`; unknown iff no
    /// finding is determined; compatible otherwise.
    pub fn classify_overall(findings: &[&Finding]) -> OverallCompatibility {
        if findings.iter().any(|f| f.compatibility == Compatibility::No) {
            OverallCompatibility::Incompatible
        } else if findings.iter().any(|f| f.compatibility.is_determined()) {
            OverallCompatibility::Compatible
        } else {
            OverallCompatibility::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_overall_incompatible_dominates() {
        let yes = Finding::new(AnalyzerId::Infra, "t3.large", Compatibility::Yes, "ok");
        let no = Finding::new(AnalyzerId::Container, "legacy:1.0", Compatibility::No, "bad");
        let findings = vec![&yes, &no];
        assert_eq!(
            Verdict::classify_overall(&findings),
            OverallCompatibility::Incompatible
        );
    }

    #[test]
    fn test_classify_overall_unknown_when_no_determination() {
        let unknown = Finding::new(AnalyzerId::Dependency, "foo", Compatibility::Unknown, "n/a");
        let findings = vec![&unknown];
        assert_eq!(
            Verdict::classify_overall(&findings),
            OverallCompatibility::Unknown
        );
    }

    #[test]
    fn test_classify_overall_empty_is_unknown() {
        let findings: Vec<&Finding> = vec![];
        assert_eq!(
            Verdict::classify_overall(&findings),
            OverallCompatibility::Unknown
        );
    }

    #[test]
    fn test_classify_overall_compatible_when_only_yes_and_partial() {
        let yes = Finding::new(AnalyzerId::Infra, "t4g.large", Compatibility::Yes, "ok");
        let partial = Finding::new(
            AnalyzerId::Dependency,
            "sharp@0.32",
            Compatibility::Partial,
            "native build",
        );
        let findings = vec![&yes, &partial];
        assert_eq!(
            Verdict::classify_overall(&findings),
            OverallCompatibility::Compatible
        );
    }

    #[test]
    fn test_aggregated_result_dedup() {
        let mut result = AggregatedResult::default();
        result.push_recommendation("b: do x");
        result.push_recommendation("a: do y");
        result.push_recommendation("a: do y");
        assert_eq!(result.recommendations, vec!["a: do y", "b: do x"]);

        result.push_reasoning("first");
        result.push_reasoning("second");
        result.push_reasoning("first");
        assert_eq!(result.reasoning, vec!["first", "second"]);
    }
}
