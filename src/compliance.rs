use serde::Serialize;

use crate::dependency::Dependency;
use crate::policy::{ is_lesser_family, LicenseCategory, PolicyTable };
use crate::spdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// No license information came back from extraction.
    NoLicenseInfo,
    /// License name(s) outside the policy table; needs a human.
    UnknownLicense,
    /// Conditional license whose use the project does not document.
    UndocumentedConditional,
    /// Category X license with no applicable exception.
    ProhibitedViolation,
    /// A parser leaked an unsplit multi-license string; upstream bug.
    ParserContractViolation,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::NoLicenseInfo => "no-license-info",
            IssueKind::UnknownLicense => "unknown-license",
            IssueKind::UndocumentedConditional => "undocumented-conditional",
            IssueKind::ProhibitedViolation => "prohibited-violation",
            IssueKind::ParserContractViolation => "parser-contract-violation",
        }
    }

    /// Unknown-ish outcomes call for a human decision rather than a hard fail.
    pub fn requires_manual_review(&self) -> bool {
        matches!(self, IssueKind::NoLicenseInfo | IssueKind::UnknownLicense)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceIssue {
    pub dependency: Dependency,
    pub kind: IssueKind,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub issues: Vec<ComplianceIssue>,
}

/// Evaluate every dependency against the policy. Pure and total: no input
/// makes this panic, and the verdict is exactly `issues.is_empty()` — there
/// is no weighting or partial credit.
pub fn check_compliance(
    dependencies: &[Dependency],
    documentation: &str,
    policy: &PolicyTable
) -> ComplianceReport {
    let doc = documentation.to_lowercase();

    let issues: Vec<ComplianceIssue> = dependencies
        .iter()
        .filter_map(|dependency| evaluate_dependency(dependency, &doc, policy))
        .collect();

    ComplianceReport {
        compliant: issues.is_empty(),
        issues,
    }
}

/// Outcome of one atomic license under the policy.
enum LicenseEval {
    Compliant,
    Unknown(String),
    Undocumented(String),
    Prohibited(String),
}

fn evaluate_dependency(
    dependency: &Dependency,
    doc_lower: &str,
    policy: &PolicyTable
) -> Option<ComplianceIssue> {
    let licenses = match &dependency.licenses {
        Some(list) if !list.is_empty() => list,
        _ => {
            return Some(ComplianceIssue {
                dependency: dependency.clone(),
                kind: IssueKind::NoLicenseInfo,
                reason: "no license information available; manual review required".to_string(),
            });
        }
    };

    // Contract check first: an unsplit multi-license string is an upstream
    // parser bug and must never pass as (or be double-reported alongside)
    // an unknown license.
    if let Some(unsplit) = licenses.iter().find(|l| spdx::contains_separator(l)) {
        return Some(ComplianceIssue {
            dependency: dependency.clone(),
            kind: IssueKind::ParserContractViolation,
            reason: format!(
                "license string '{}' still contains multi-license separator syntax; parser contract violation",
                unsplit
            ),
        });
    }

    // Disjunction: one compliant license anywhere clears the dependency.
    let mut evaluations: Vec<LicenseEval> = Vec::with_capacity(licenses.len());
    for license in licenses {
        let evaluation = evaluate_license(license, &dependency.name, doc_lower, policy);
        if matches!(evaluation, LicenseEval::Compliant) {
            return None;
        }
        evaluations.push(evaluation);
    }

    // Nothing compliant. Unknown results outrank definite failures only when
    // no prohibited verdict exists: "might be fine, confirm manually".
    let unknowns: Vec<&str> = evaluations
        .iter()
        .filter_map(|e| {
            match e {
                LicenseEval::Unknown(name) => Some(name.as_str()),
                _ => None,
            }
        })
        .collect();
    let has_prohibited = evaluations
        .iter()
        .any(|e| matches!(e, LicenseEval::Prohibited(_)));

    if !unknowns.is_empty() && !has_prohibited {
        let reason = if unknowns.len() == 1 {
            format!(
                "license '{}' is not in the policy table; manual confirmation required",
                unknowns[0]
            )
        } else {
            let quoted: Vec<String> = unknowns.iter().map(|n| format!("'{}'", n)).collect();
            format!(
                "licenses {} are not in the policy table; manual confirmation required",
                quoted.join(", ")
            )
        };
        return Some(ComplianceIssue {
            dependency: dependency.clone(),
            kind: IssueKind::UnknownLicense,
            reason,
        });
    }

    // First definite failure in declaration order keeps reports reproducible.
    for evaluation in &evaluations {
        match evaluation {
            LicenseEval::Undocumented(reason) => {
                return Some(ComplianceIssue {
                    dependency: dependency.clone(),
                    kind: IssueKind::UndocumentedConditional,
                    reason: reason.clone(),
                });
            }
            LicenseEval::Prohibited(reason) => {
                return Some(ComplianceIssue {
                    dependency: dependency.clone(),
                    kind: IssueKind::ProhibitedViolation,
                    reason: reason.clone(),
                });
            }
            _ => {}
        }
    }

    None
}

fn evaluate_license(
    license: &str,
    dependency_name: &str,
    doc_lower: &str,
    policy: &PolicyTable
) -> LicenseEval {
    let normalized = policy.normalize(license);

    let category = match policy.category_of(license) {
        Some(category) => category,
        None => {
            return LicenseEval::Unknown(license.to_string());
        }
    };

    match category {
        LicenseCategory::Approved => LicenseEval::Compliant,
        LicenseCategory::Conditional | LicenseCategory::ConditionalCaveat => {
            if is_documented(dependency_name, &normalized, doc_lower) {
                LicenseEval::Compliant
            } else {
                LicenseEval::Undocumented(
                    format!(
                        "license '{}' is {} and its use is not documented by the project",
                        license,
                        category.label()
                    )
                )
            }
        }
        LicenseCategory::Prohibited => {
            if is_lesser_family(&normalized) {
                if let Some(exception) = policy.special_exception_for(dependency_name) {
                    if is_documented(dependency_name, &normalized, doc_lower) {
                        return LicenseEval::Compliant;
                    }
                    return LicenseEval::Undocumented(
                        format!(
                            "'{}' falls under special exception '{}' for license '{}', but the exception still requires documented use",
                            dependency_name,
                            exception,
                            license
                        )
                    );
                }
            }
            LicenseEval::Prohibited(
                format!("license '{}' is Category X (prohibited) and may not be used", license)
            )
        }
    }
}

/// Documentation gate: the dependency name or a keyword family derived from
/// the license name must appear (case-insensitively) in the documentation.
fn is_documented(dependency_name: &str, normalized_license: &str, doc_lower: &str) -> bool {
    let name_lower = dependency_name.to_lowercase();
    if !name_lower.is_empty() && doc_lower.contains(&name_lower) {
        return true;
    }

    doc_keywords(normalized_license)
        .iter()
        .any(|keyword| !keyword.is_empty() && doc_lower.contains(keyword.as_str()))
}

fn doc_keywords(normalized_license: &str) -> Vec<String> {
    let lower = normalized_license.to_lowercase();
    if lower.contains("lgpl") || lower.contains("lesser") {
        vec!["lgpl".to_string(), "lesser general public".to_string()]
    } else if lower.contains("mpl") || lower.contains("mozilla") {
        vec!["mpl".to_string(), "mozilla".to_string()]
    } else if lower.contains("epl") || lower.contains("eclipse") {
        vec!["epl".to_string(), "eclipse".to_string()]
    } else if lower.contains("cddl") || lower.contains("common development") {
        vec!["cddl".to_string(), "common development".to_string()]
    } else {
        vec![lower]
    }
}
