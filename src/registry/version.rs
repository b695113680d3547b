//! Shared version-range evaluation for the package registry clients.
//!
//! Both ecosystem sub-checkers need to pick the greatest available version
//! satisfying a range, under two different but closely related grammars
//! (PEP 440 specifiers for PyPI, node-semver ranges for npm). Both are
//! implemented here on top of the real `semver` crate rather than the
//! original implementation's exact-match-only placeholder.

use semver::Version;

/// Parse a version string loosely: strip a leading `v`, and pad missing
/// minor/patch components with zero so that `"1.20"` parses the same as
/// `"1.20.0"`. Returns `None` if the string has no usable numeric prefix.
pub fn loose_parse(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }
    let mut parts = trimmed.splitn(2, ['-', '+']);
    let numeric = parts.next().unwrap_or(trimmed);
    let rest = trimmed[numeric.len()..].to_string();

    let mut components: Vec<&str> = numeric.split('.').collect();
    while components.len() < 3 {
        components.push("0");
    }
    if components.len() > 3 {
        components.truncate(3);
    }
    for component in &components {
        if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    let padded = format!("{}{rest}", components.join("."));
    Version::parse(&padded).ok()
}

/// The ordered set of PEP 440-style comparison operators this engine
/// recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PypiOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Compatible, // ~=
}

struct PypiConstraint {
    op: PypiOp,
    version: Version,
}

/// Parse a PEP 440 specifier (comma-separated AND of comparators) into a
/// list of constraints. Returns `None` if any clause is unparseable.
fn parse_pypi_specifier(specifier: &str) -> Option<Vec<PypiConstraint>> {
    let mut constraints = Vec::new();
    for clause in specifier.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (op, rest) = if let Some(rest) = clause.strip_prefix("~=") {
            (PypiOp::Compatible, rest)
        } else if let Some(rest) = clause.strip_prefix(">=") {
            (PypiOp::Ge, rest)
        } else if let Some(rest) = clause.strip_prefix("<=") {
            (PypiOp::Le, rest)
        } else if let Some(rest) = clause.strip_prefix("==") {
            (PypiOp::Eq, rest)
        } else if let Some(rest) = clause.strip_prefix("!=") {
            (PypiOp::Ne, rest)
        } else if let Some(rest) = clause.strip_prefix('>') {
            (PypiOp::Gt, rest)
        } else if let Some(rest) = clause.strip_prefix('<') {
            (PypiOp::Lt, rest)
        } else {
            return None;
        };
        let rest = rest.trim().trim_end_matches(".*");
        let version = loose_parse(rest)?;
        constraints.push(PypiConstraint { op, version });
    }
    Some(constraints)
}

fn pypi_constraint_satisfied(constraint: &PypiConstraint, candidate: &Version) -> bool {
    match constraint.op {
        PypiOp::Eq => candidate == &constraint.version,
        PypiOp::Ne => candidate != &constraint.version,
        PypiOp::Ge => candidate >= &constraint.version,
        PypiOp::Le => candidate <= &constraint.version,
        PypiOp::Gt => candidate > &constraint.version,
        PypiOp::Lt => candidate < &constraint.version,
        PypiOp::Compatible => {
            // `~=1.4.2` means `>=1.4.2, ==1.4.*`.
            candidate >= &constraint.version
                && candidate.major == constraint.version.major
                && candidate.minor == constraint.version.minor
        }
    }
}

/// Given a PEP 440 specifier and a set of available version strings, return
/// the parseable candidates (as `(original string, parsed version)`) that
/// satisfy every clause, sorted ascending. Returns `None` if the specifier
/// itself cannot be parsed.
pub fn pypi_satisfying<'a>(
    specifier: &str,
    available: impl Iterator<Item = &'a str>,
) -> Option<Vec<(&'a str, Version)>> {
    let constraints = parse_pypi_specifier(specifier)?;
    let mut matches: Vec<(&str, Version)> = available
        .filter_map(|raw| loose_parse(raw).map(|v| (raw, v)))
        .filter(|(_, v)| constraints.iter().all(|c| pypi_constraint_satisfied(c, v)))
        .collect();
    matches.sort_by(|a, b| a.1.cmp(&b.1));
    Some(matches)
}

/// Evaluate a node-semver range string (`^1.2.3`, `~1.2.3`, `>=1.0.0 <2.0.0`,
/// `1.x || 2.x`, an exact version, or `*`/`latest`) against a parsed
/// version. Space inside one OR-branch is AND; `||` separates OR branches.
pub fn npm_range_satisfied(range: &str, version: &Version) -> bool {
    let range = range.trim();
    if range.is_empty() || range == "*" || range.eq_ignore_ascii_case("latest") {
        return true;
    }
    range.split("||").any(|branch| {
        let branch = branch.trim();
        if branch.is_empty() {
            return true;
        }
        let cargo_style = branch
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(", ");
        match semver::VersionReq::parse(&cargo_style) {
            Ok(req) => req.matches(version),
            Err(_) => loose_parse(branch).is_some_and(|exact| &exact == version),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_parse_pads_components() {
        assert_eq!(loose_parse("1.20").unwrap(), Version::new(1, 20, 0));
        assert_eq!(loose_parse("v2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(loose_parse("1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn test_pypi_satisfying_picks_greatest() {
        let versions = ["1.18.0", "1.20.0", "1.21.0", "1.19.5"];
        let matches = pypi_satisfying(">=1.19,<1.21", versions.into_iter()).unwrap();
        let greatest = matches.last().unwrap();
        assert_eq!(greatest.0, "1.20.0");
    }

    #[test]
    fn test_pypi_compatible_release_operator() {
        let versions = ["1.4.1", "1.4.2", "1.4.9", "1.5.0"];
        let matches = pypi_satisfying("~=1.4.2", versions.into_iter()).unwrap();
        let names: Vec<&str> = matches.iter().map(|(s, _)| *s).collect();
        assert_eq!(names, vec!["1.4.2", "1.4.9"]);
    }

    #[test]
    fn test_npm_range_satisfied_caret() {
        assert!(npm_range_satisfied("^0.32.0", &Version::new(0, 32, 5)));
        assert!(!npm_range_satisfied("^0.32.0", &Version::new(0, 33, 0)));
    }

    #[test]
    fn test_npm_range_satisfied_or() {
        assert!(npm_range_satisfied("1.x || 2.x", &Version::new(2, 1, 0)));
    }
}
