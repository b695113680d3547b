//! Infrastructure-template analyzer: flags EC2 instance types in Terraform
//! configuration that lack (or already have) an ARM64/Graviton equivalent.
//!
//! Grounded on `terraform_analyzer.py`: same family lists, same x86→ARM
//! mapping table, same recommendation message templates.

use std::collections::BTreeSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AggregatedResult, AnalyzerId, Compatibility, Finding};

use super::{Analyzer, FileAnalysis, RegistryClients};

static PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![Regex::new(r"(?i)\.tf$").expect("valid regex")]);

static INSTANCE_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"instance_type\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

const ARM_FAMILIES: [&str; 11] = [
    "a1", "t4g", "m6g", "m7g", "c6g", "c7g", "r6g", "r7g", "x2gd", "im4gn", "gr6",
];

const X86_ONLY_FAMILIES: [&str; 11] = [
    "mac", "f1", "p2", "p3", "g3", "g4", "g5", "inf", "dl1", "vt1", "trn1",
];

const OTHER_INDICATORS: [&str; 5] = ["architecture", "amd64", "x86_64", "arm64", "graviton"];

/// `(x86 family prefix, ARM family prefix)`, checked in order against the
/// start of the instance type string (each prefix includes the trailing
/// dot, e.g. `"t3."`).
const INSTANCE_MAPPING: &[(&str, &str)] = &[
    ("t3.", "t4g."),
    ("t3a.", "t4g."),
    ("t2.", "t4g."),
    ("m6i.", "m7g."),
    ("m6a.", "m7g."),
    ("m5.", "m6g."),
    ("m5a.", "m6g."),
    ("m5n.", "m6gn."),
    ("m5zn.", "m6g."),
    ("m4.", "m6g."),
    ("c6i.", "c7g."),
    ("c6a.", "c7g."),
    ("c5.", "c6g."),
    ("c5a.", "c6g."),
    ("c5n.", "c6gn."),
    ("c4.", "c6g."),
    ("r6i.", "r7g."),
    ("r6a.", "r7g."),
    ("r5.", "r6g."),
    ("r5a.", "r6g."),
    ("r5b.", "r6g."),
    ("r5n.", "r6gn."),
    ("r4.", "r6g."),
    ("x1e.", "x2gd."),
    ("x1.", "x2gd."),
    ("z1d.", "m6g."),
    ("i3.", "im4gn."),
    ("i3en.", "i4g."),
    ("d2.", "i4g."),
    ("d3.", "i4g."),
    ("d3en.", "i4g."),
];

enum Classification {
    AlreadyArm,
    NoEquivalent,
    Mapped(String),
    Unknown,
}

fn family_prefix(instance_type: &str) -> Option<&str> {
    instance_type.split('.').next()
}

fn classify_instance_type(instance_type: &str) -> Classification {
    let lower = instance_type.to_lowercase();
    if let Some(family) = family_prefix(&lower) {
        if ARM_FAMILIES.contains(&family) {
            return Classification::AlreadyArm;
        }
        if X86_ONLY_FAMILIES.contains(&family) {
            return Classification::NoEquivalent;
        }
    }
    for (x86_prefix, arm_prefix) in INSTANCE_MAPPING {
        if lower.starts_with(x86_prefix) {
            let suffix = &instance_type[x86_prefix.len()..];
            return Classification::Mapped(format!("{arm_prefix}{suffix}"));
        }
    }
    Classification::Unknown
}

/// Analyzer for Terraform-style infrastructure templates.
#[derive(Default)]
pub struct InfraTemplateAnalyzer;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ExtractedInstanceTypes {
    instance_types: Vec<String>,
    other_indicators: Vec<String>,
}

#[async_trait]
impl Analyzer for InfraTemplateAnalyzer {
    fn id(&self) -> AnalyzerId {
        AnalyzerId::Infra
    }

    fn patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn analyze(&self, content: &str, path: &str) -> FileAnalysis {
        let mut instance_types: BTreeSet<String> = BTreeSet::new();
        for captures in INSTANCE_TYPE_RE.captures_iter(content) {
            instance_types.insert(captures[1].to_string());
        }

        let lower = content.to_lowercase();
        let other_indicators: Vec<String> = OTHER_INDICATORS
            .iter()
            .filter(|kw| lower.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        let extracted = ExtractedInstanceTypes {
            instance_types: instance_types.into_iter().collect(),
            other_indicators,
        };

        FileAnalysis {
            path: path.to_string(),
            data: serde_json::to_value(extracted).unwrap_or(serde_json::Value::Null),
        }
    }

    async fn aggregate(
        &self,
        outputs: Vec<FileAnalysis>,
        _registries: &RegistryClients,
    ) -> AggregatedResult {
        let mut result = AggregatedResult::default();
        let mut processed: BTreeSet<String> = BTreeSet::new();

        for output in &outputs {
            let Ok(extracted) = serde_json::from_value::<ExtractedInstanceTypes>(output.data.clone())
            else {
                continue;
            };
            for instance_type in &extracted.instance_types {
                if !processed.insert(instance_type.clone()) {
                    continue;
                }
                let (compatibility, reason, recommendation) = match classify_instance_type(instance_type)
                {
                    Classification::AlreadyArm => (
                        Compatibility::Yes,
                        format!("`{instance_type}` is already an ARM64/Graviton instance type"),
                        None,
                    ),
                    Classification::NoEquivalent => (
                        Compatibility::No,
                        format!("`{instance_type}` belongs to a specialized hardware family with no ARM64 equivalent"),
                        Some(format!(
                            "Review or replace incompatible instance type `{instance_type}` in `{}`.",
                            output.path
                        )),
                    ),
                    Classification::Mapped(suggestion) => (
                        Compatibility::Partial,
                        format!("`{instance_type}` has an ARM64 equivalent: `{suggestion}`"),
                        Some(format!(
                            "Replace `{instance_type}` with `{suggestion}` in `{}`",
                            output.path
                        )),
                    ),
                    Classification::Unknown => (
                        Compatibility::Unknown,
                        format!("no known ARM64 mapping for instance type `{instance_type}`"),
                        Some(format!(
                            "Manually verify ARM compatibility for instance type `{instance_type}` in `{}`.",
                            output.path
                        )),
                    ),
                };

                let mut finding = Finding::new(self.id(), instance_type.clone(), compatibility, reason);
                if let Some(recommendation) = recommendation {
                    result.push_recommendation(recommendation.clone());
                    finding = finding.with_recommendation(recommendation);
                }
                result.reasoning.push(finding.reason.clone());
                result.findings.push(finding);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_already_arm() {
        assert!(matches!(
            classify_instance_type("t4g.large"),
            Classification::AlreadyArm
        ));
    }

    #[test]
    fn test_classify_no_equivalent() {
        assert!(matches!(
            classify_instance_type("p3.2xlarge"),
            Classification::NoEquivalent
        ));
    }

    #[test]
    fn test_classify_mapped() {
        match classify_instance_type("t3.micro") {
            Classification::Mapped(suggestion) => assert_eq!(suggestion, "t4g.micro"),
            _ => panic!("expected mapped"),
        }
    }

    #[test]
    fn test_classify_mapped_preserves_size_suffix_for_n_variant() {
        match classify_instance_type("r5n.xlarge") {
            Classification::Mapped(suggestion) => assert_eq!(suggestion, "r6gn.xlarge"),
            _ => panic!("expected mapped"),
        }
    }

    #[test]
    fn test_classify_unknown_family() {
        assert!(matches!(
            classify_instance_type("u-6tb1.metal"),
            Classification::Unknown
        ));
    }

    #[test]
    fn test_analyze_extracts_and_dedupes_instance_types() {
        let analyzer = InfraTemplateAnalyzer;
        let content = r#"
resource "aws_instance" "a" {
  instance_type = "t3.micro"
}
resource "aws_instance" "b" {
  instance_type = "t3.micro"
}
"#;
        let output = analyzer.analyze(content, "main.tf");
        let extracted: ExtractedInstanceTypes = serde_json::from_value(output.data).unwrap();
        assert_eq!(extracted.instance_types, vec!["t3.micro".to_string()]);
    }
}
