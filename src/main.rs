use std::collections::HashMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use clap::{ ArgAction, Parser };
use colored::Colorize;

mod compliance;
mod dependency;
mod exec;
mod extractor;
mod npm_registry;
mod parsers;
mod policy;
mod spdx;

use compliance::{ check_compliance, ComplianceReport, IssueKind };
use extractor::{ extract_dependencies, ExtractionResult, ExtractOptions };
use policy::{ LicenseCategory, PolicyTable };

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the project root to scan
    #[arg(index = 1, value_name = "PROJECT_PATH")]
    project_path: String,

    /// Directory with categories.toml, aliases.toml, exceptions.toml
    /// (defaults to the built-in policy)
    #[arg(long, value_name = "DIR")]
    policy_dir: Option<PathBuf>,

    /// Documentation file checked for conditional-license statements
    /// (defaults to the project README)
    #[arg(long, value_name = "FILE")]
    doc_file: Option<PathBuf>,

    /// Output the full report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Output the dependency table as CSV
    #[arg(long, action = ArgAction::SetTrue)]
    csv: bool,

    /// Output file path (for JSON or CSV)
    #[arg(short, value_name = "OUTPUT_FILE")]
    output: Option<String>,

    /// Show all dependencies, not just non-compliant ones
    #[arg(long, short, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Skip npm registry lookups
    #[arg(long, action = ArgAction::SetTrue)]
    offline: bool,

    /// Per-command timeout in seconds for build tool invocations
    #[arg(long, default_value_t = 120, value_name = "SECONDS")]
    timeout: u64,
}

/// Overall disposition of the scan, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pass,
    Fail,
    ManualReview,
}

impl Verdict {
    fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
            Verdict::ManualReview => 2,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::ManualReview => "MANUAL REVIEW",
        }
    }
}

fn main() {
    let args = Args::parse();

    let policy: &PolicyTable = match &args.policy_dir {
        Some(dir) => {
            match PolicyTable::load_dir(dir) {
                Ok(table) => Box::leak(Box::new(table)),
                Err(e) => {
                    eprintln!("Failed to load policy from {}: {}", dir.display(), e);
                    std::process::exit(2);
                }
            }
        }
        None => PolicyTable::default_table(),
    };

    let options = ExtractOptions {
        offline: args.offline,
        timeout: Duration::from_secs(args.timeout),
    };

    println!("Scanning {}", args.project_path);
    let extraction = extract_dependencies(&args.project_path, &options);

    let (doc_text, doc_source) = read_documentation(
        Path::new(&args.project_path),
        args.doc_file.as_deref()
    );
    if let Some(source) = &doc_source {
        println!("Using documentation from {}", source);
    } else {
        println!(
            "{}",
            "No documentation file found; conditional licenses cannot be satisfied".yellow()
        );
    }

    let report = check_compliance(&extraction.dependencies, &doc_text, policy);
    let verdict = decide_verdict(&report, &extraction);

    if args.json {
        let rendered = render_json(&extraction, &report, verdict);
        write_output(&rendered, args.output.as_deref());
    } else if args.csv {
        let rendered = render_csv(&extraction, &report);
        write_output(&rendered, args.output.as_deref());
    } else {
        print_report(&args, policy, &extraction, &report, verdict);
    }

    std::process::exit(verdict.exit_code());
}

/// Map extraction faults and compliance issues onto the final verdict.
///
/// Fatal extraction errors and degraded extraction can hide transitive
/// dependencies, so they never let a clean-looking compliance result pass
/// as PASS; manual-review-kind issues also stop short of a hard FAIL.
fn decide_verdict(report: &ComplianceReport, extraction: &ExtractionResult) -> Verdict {
    if report.issues.iter().any(|i| !i.kind.requires_manual_review()) {
        return Verdict::Fail;
    }
    if
        !report.issues.is_empty() ||
        !extraction.errors.is_empty() ||
        !extraction.warnings.is_empty()
    {
        return Verdict::ManualReview;
    }
    Verdict::Pass
}

/// Locate and read the documentation text the compliance evaluator gates on.
fn read_documentation(root: &Path, explicit: Option<&Path>) -> (String, Option<String>) {
    if let Some(path) = explicit {
        return match fs::read_to_string(path) {
            Ok(text) => (text, Some(path.display().to_string())),
            Err(_) => (String::new(), None),
        };
    }

    for candidate in ["README.md", "README.markdown", "README.txt", "README"] {
        let path = root.join(candidate);
        if path.is_file() {
            if let Ok(text) = fs::read_to_string(&path) {
                return (text, Some(candidate.to_string()));
            }
        }
    }
    (String::new(), None)
}

fn print_report(
    args: &Args,
    policy: &PolicyTable,
    extraction: &ExtractionResult,
    report: &ComplianceReport,
    verdict: Verdict
) {
    println!("\n=== DEPENDENCY EXTRACTION ===\n");
    println!("Found {} unique dependencies", extraction.dependencies.len());

    for warning in &extraction.warnings {
        println!("{} {}", "WARNING:".yellow().bold(), warning);
    }
    for error in &extraction.errors {
        println!("{} {}", "ERROR:".red().bold(), error);
    }

    if args.verbose {
        println!(
            "Policy: {} approved, {} conditional, {} prohibited licenses",
            policy.licenses_in_category(LicenseCategory::Approved).len(),
            policy.licenses_in_category(LicenseCategory::Conditional).len() +
                policy.licenses_in_category(LicenseCategory::ConditionalCaveat).len(),
            policy.licenses_in_category(LicenseCategory::Prohibited).len()
        );
        for dependency in &extraction.dependencies {
            let licenses = match &dependency.licenses {
                Some(list) => list.join(", "),
                None => "<no license info>".to_string(),
            };
            println!("  {} {}", dependency.key(), licenses);
        }
    }

    println!("\n=== COMPLIANCE ===\n");
    if report.issues.is_empty() {
        println!("{}", "All dependencies compliant.".green());
    } else {
        for issue in &report.issues {
            let tag = if issue.kind.requires_manual_review() {
                issue.kind.as_str().yellow().bold()
            } else {
                issue.kind.as_str().red().bold()
            };
            println!("{} {}: {}", tag, issue.dependency.key(), issue.reason);
        }
        println!("\n{} issue(s) found", report.issues.len());
    }

    print_license_statistics(extraction, policy);

    let verdict_label = match verdict {
        Verdict::Pass => verdict.label().green().bold(),
        Verdict::Fail => verdict.label().red().bold(),
        Verdict::ManualReview => verdict.label().yellow().bold(),
    };
    println!("\nVerdict: {}", verdict_label);
}

fn print_license_statistics(extraction: &ExtractionResult, policy: &PolicyTable) {
    if extraction.dependencies.is_empty() {
        return;
    }

    println!("\n=== LICENSE USAGE STATISTICS ===\n");

    let mut counts: HashMap<String, usize> = HashMap::new();
    for dependency in &extraction.dependencies {
        match &dependency.licenses {
            Some(list) => {
                for license in list {
                    *counts.entry(policy.normalize(license)).or_insert(0) += 1;
                }
            }
            None => {
                *counts.entry("<unknown>".to_string()).or_insert(0) += 1;
            }
        }
    }

    // Most common first.
    let mut sorted: Vec<(&String, &usize)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (license, count) in sorted {
        let annotation = match policy.category_of(license) {
            Some(category) => category.label().to_string(),
            None => "unrecognized".to_string(),
        };
        println!("{}: {} ({})", license, count, annotation);
    }
}

fn render_json(
    extraction: &ExtractionResult,
    report: &ComplianceReport,
    verdict: Verdict
) -> String {
    let value = serde_json::json!({
        "verdict": verdict.label(),
        "compliant": report.compliant,
        "dependencies": extraction.dependencies,
        "issues": report.issues,
        "errors": extraction.errors,
        "warnings": extraction.warnings,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

/// One row per dependency: name, version, licenses, compliance status.
fn render_csv(extraction: &ExtractionResult, report: &ComplianceReport) -> String {
    let mut issue_by_key: HashMap<String, IssueKind> = HashMap::new();
    for issue in &report.issues {
        issue_by_key.insert(issue.dependency.key(), issue.kind);
    }

    let mut csv = String::from("name,version,licenses,status\n");
    for dependency in &extraction.dependencies {
        let licenses = match &dependency.licenses {
            Some(list) => list.join("; "),
            None => String::new(),
        };
        let status = issue_by_key
            .get(&dependency.key())
            .map(|kind| kind.as_str())
            .unwrap_or("ok");
        csv.push_str(
            &format!(
                "\"{}\",\"{}\",\"{}\",\"{}\"\n",
                csv_field(&dependency.name),
                csv_field(&dependency.version),
                csv_field(&licenses),
                status
            )
        );
    }
    csv
}

fn csv_field(value: &str) -> String {
    value.replace('"', "'").replace(',', " ")
}

fn write_output(content: &str, output_file: Option<&str>) {
    match output_file {
        Some(path) => {
            match fs::write(path, content) {
                Ok(_) => println!("Report written to {}", path),
                Err(e) => eprintln!("Error writing to file {}: {}", path, e),
            }
        }
        None => {
            print!("{}", content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{ Dependency, ErrorSource, ExtractionError, ExtractionErrorKind };

    fn empty_extraction() -> ExtractionResult {
        ExtractionResult::default()
    }

    fn clean_report() -> ComplianceReport {
        check_compliance(&[], "", PolicyTable::default_table())
    }

    #[test]
    fn test_verdict_pass_when_clean() {
        let verdict = decide_verdict(&clean_report(), &empty_extraction());
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_verdict_fail_on_violation() {
        let deps = [
            Dependency::with_licenses(
                "bad".to_string(),
                "1.0.0".to_string(),
                vec!["GPL-3.0".to_string()]
            ),
        ];
        let report = check_compliance(&deps, "", PolicyTable::default_table());
        let verdict = decide_verdict(&report, &empty_extraction());
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_verdict_manual_review_on_unknown_license() {
        let deps = [
            Dependency::with_licenses(
                "odd".to_string(),
                "1.0.0".to_string(),
                vec!["Strange-1.0".to_string()]
            ),
        ];
        let report = check_compliance(&deps, "", PolicyTable::default_table());
        let verdict = decide_verdict(&report, &empty_extraction());
        assert_eq!(verdict, Verdict::ManualReview);
        assert_eq!(verdict.exit_code(), 2);
    }

    #[test]
    fn test_verdict_manual_review_on_extraction_error() {
        let mut extraction = empty_extraction();
        extraction.errors.push(
            ExtractionError::new(
                ErrorSource::Maven,
                ExtractionErrorKind::Timeout,
                "mvn timed out".to_string()
            )
        );
        // A clean compliance result must not read as PASS when extraction failed.
        assert_eq!(decide_verdict(&clean_report(), &extraction), Verdict::ManualReview);
    }

    #[test]
    fn test_verdict_manual_review_on_degraded_extraction() {
        let mut extraction = empty_extraction();
        extraction.warnings.push(
            ExtractionError::new(
                ErrorSource::Npm,
                ExtractionErrorKind::Degraded,
                "direct dependencies only".to_string()
            )
        );
        assert_eq!(decide_verdict(&clean_report(), &extraction), Verdict::ManualReview);
    }

    #[test]
    fn test_verdict_fail_outranks_manual_review() {
        let deps = [
            Dependency::with_licenses(
                "bad".to_string(),
                "1.0.0".to_string(),
                vec!["GPL-3.0".to_string()]
            ),
        ];
        let report = check_compliance(&deps, "", PolicyTable::default_table());
        let mut extraction = empty_extraction();
        extraction.errors.push(
            ExtractionError::new(
                ErrorSource::Gradle,
                ExtractionErrorKind::CommandFailed,
                "gradle crashed".to_string()
            )
        );
        assert_eq!(decide_verdict(&report, &extraction), Verdict::Fail);
    }

    #[test]
    fn test_read_documentation_finds_readme() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "uses LGPL libraries").unwrap();
        let (text, source) = read_documentation(dir.path(), None);
        assert_eq!(text, "uses LGPL libraries");
        assert_eq!(source.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_read_documentation_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (text, source) = read_documentation(dir.path(), None);
        assert!(text.is_empty());
        assert!(source.is_none());
    }

    #[test]
    fn test_csv_output_marks_status() {
        let mut extraction = empty_extraction();
        extraction.dependencies.push(
            Dependency::with_licenses(
                "junit:junit".to_string(),
                "4.13.2".to_string(),
                vec!["MIT".to_string()]
            )
        );
        extraction.dependencies.push(
            Dependency::with_licenses(
                "some.gpl:library".to_string(),
                "1.0.0".to_string(),
                vec!["GPL-3.0".to_string()]
            )
        );
        let report = check_compliance(
            &extraction.dependencies,
            "",
            PolicyTable::default_table()
        );

        let csv = render_csv(&extraction, &report);
        assert!(csv.contains("\"junit:junit\",\"4.13.2\",\"MIT\",\"ok\""));
        assert!(csv.contains("\"some.gpl:library\",\"1.0.0\",\"GPL-3.0\",\"prohibited-violation\""));
    }

    #[test]
    fn test_json_output_carries_verdict() {
        let rendered = render_json(&empty_extraction(), &clean_report(), Verdict::Pass);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["verdict"], "PASS");
        assert_eq!(value["compliant"], true);
    }
}
