use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dependency::{ Dependency, ErrorSource, ExtractionError, ExtractionErrorKind };
use crate::exec;
use crate::parsers::{ exec_error, ParserOutcome };

/// Where the license plugin leaves its aggregated third-party report.
pub const THIRD_PARTY_REPORT: &str = "target/generated-sources/license/THIRD-PARTY.txt";

// (License Name) ... group:artifact:version ( - URL)
static REPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\((?P<licenses>[^)]*)\)\s*(?P<rest>.+)$").unwrap()
});
static COORDINATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<group>[A-Za-z0-9_.\-]+):(?P<artifact>[A-Za-z0-9_.\-]+):(?P<version>[A-Za-z0-9_.\-]+)"
    ).unwrap()
});

pub fn detect(root: &Path) -> bool {
    root.join("pom.xml").is_file()
}

/// Run the third-party license report and parse it; fall back to a plain
/// dependency listing (no license info) when the report is absent.
pub fn extract(root: &Path, timeout: Duration) -> ParserOutcome {
    let mut outcome = ParserOutcome::new();

    // Exit status is deliberately ignored here: a partially failing build can
    // still leave a usable report behind, and the file is what matters.
    if let Err(e) = exec::run_command(
        "mvn",
        &["-q", "-DskipTests", "license:add-third-party"],
        root,
        timeout
    ) {
        outcome.errors.push(exec_error(ErrorSource::Maven, e));
        return outcome;
    }

    match exec::resolve_inside(root, THIRD_PARTY_REPORT) {
        Some(report_path) => {
            match fs::read_to_string(&report_path) {
                Ok(content) => {
                    outcome.dependencies = parse_third_party_report(&content);
                }
                Err(e) => {
                    outcome.errors.push(
                        ExtractionError::new(
                            ErrorSource::Maven,
                            ExtractionErrorKind::ReportUnreadable,
                            format!("could not read {}: {}", THIRD_PARTY_REPORT, e)
                        )
                    );
                }
            }
        }
        None => {
            fallback_dependency_list(root, timeout, &mut outcome);
        }
    }

    outcome
}

fn fallback_dependency_list(root: &Path, timeout: Duration, outcome: &mut ParserOutcome) {
    match exec::run_command(
        "mvn",
        &["-q", "dependency:list", "-DoutputAbsoluteArtifactFilename=false"],
        root,
        timeout
    ) {
        Ok(output) if output.success => {
            outcome.dependencies = parse_dependency_list(&output.stdout);
            outcome.warnings.push(
                ExtractionError::new(
                    ErrorSource::Maven,
                    ExtractionErrorKind::Degraded,
                    "third-party report unavailable; dependency listing carries no license info".to_string()
                )
            );
        }
        Ok(_) => {
            outcome.errors.push(
                ExtractionError::new(
                    ErrorSource::Maven,
                    ExtractionErrorKind::CommandFailed,
                    "mvn dependency:list exited with a failure status".to_string()
                )
            );
        }
        Err(e) => {
            outcome.errors.push(exec_error(ErrorSource::Maven, e));
        }
    }
}

/// Parse the aggregated third-party report. Line format:
/// `(License A|License B) group:artifact:version - URL`; the license field
/// is pipe-separated for multi-licensed artifacts. Lines without resolvable
/// coordinates are dropped.
pub fn parse_third_party_report(content: &str) -> Vec<Dependency> {
    let mut dependencies = Vec::new();

    for line in content.lines() {
        let captures = match REPORT_LINE.captures(line) {
            Some(c) => c,
            None => {
                continue;
            }
        };

        let rest = captures.name("rest").map(|m| m.as_str()).unwrap_or("");
        let coords = match COORDINATES.captures(rest) {
            Some(c) => c,
            None => {
                continue;
            }
        };

        let name = format!(
            "{}:{}",
            coords.name("group").unwrap().as_str(),
            coords.name("artifact").unwrap().as_str()
        );
        let version = coords.name("version").unwrap().as_str().to_string();

        let licenses: Vec<String> = captures
            .name("licenses")
            .map(|m| m.as_str())
            .unwrap_or("")
            .split('|')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("unknown license"))
            .collect();

        let dependency = if licenses.is_empty() {
            Dependency::new(name, version)
        } else {
            Dependency::with_licenses(name, version, licenses)
        };
        if dependency.is_valid() {
            dependencies.push(dependency);
        }
    }

    dependencies
}

/// Parse `mvn dependency:list` output. Accepts the 4-, 5-, and 6-segment
/// coordinate forms (`group:artifact:packaging[:classifier]:version[:scope]`).
pub fn parse_dependency_list(stdout: &str) -> Vec<Dependency> {
    let mut dependencies = Vec::new();

    for line in stdout.lines() {
        let trimmed = line.trim().trim_start_matches("[INFO]").trim();
        if trimmed.is_empty() || trimmed.contains(' ') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            continue;
        }

        let (name, version) = match parts.len() {
            // group:artifact:packaging:version
            // group:artifact:packaging:version:scope
            4 | 5 => (format!("{}:{}", parts[0], parts[1]), parts[3].to_string()),
            // group:artifact:packaging:classifier:version:scope
            6 => (format!("{}:{}", parts[0], parts[1]), parts[4].to_string()),
            _ => {
                continue;
            }
        };

        let dependency = Dependency::new(name, version);
        if
            dependency.is_valid() &&
            !dependencies.iter().any(|d: &Dependency| d.key() == dependency.key())
        {
            dependencies.push(dependency);
        }
    }

    dependencies
}
