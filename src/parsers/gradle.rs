use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::dependency::{ Dependency, ErrorSource, ExtractionError, ExtractionErrorKind };
use crate::exec;
use crate::parsers::{ exec_error, ParserOutcome };
use crate::spdx;

/// Where the license report plugin writes its JSON output.
pub const LICENSE_REPORT: &str = "build/reports/dependency-license/index.json";

pub fn detect(root: &Path) -> bool {
    root.join("build.gradle").is_file() || root.join("build.gradle.kts").is_file()
}

/// Prefer the JSON license report, generating it when missing; fall back to
/// the textual dependency tree (no license info) when the report cannot be
/// produced.
pub fn extract(root: &Path, timeout: Duration) -> ParserOutcome {
    let mut outcome = ParserOutcome::new();

    if exec::resolve_inside(root, LICENSE_REPORT).is_none() {
        if let Err(e) = exec::run_command(&gradle_program(root), &["generateLicenseReport", "-q"], root, timeout) {
            outcome.errors.push(exec_error(ErrorSource::Gradle, e));
            return outcome;
        }
    }

    match exec::resolve_inside(root, LICENSE_REPORT) {
        Some(report_path) => {
            match fs::read_to_string(&report_path) {
                Ok(content) => {
                    match parse_license_report(&content) {
                        Ok(deps) => {
                            outcome.dependencies = deps;
                        }
                        Err(e) => {
                            outcome.errors.push(
                                ExtractionError::new(
                                    ErrorSource::Gradle,
                                    ExtractionErrorKind::ReportUnreadable,
                                    format!("could not parse {}: {}", LICENSE_REPORT, e)
                                )
                            );
                        }
                    }
                }
                Err(e) => {
                    outcome.errors.push(
                        ExtractionError::new(
                            ErrorSource::Gradle,
                            ExtractionErrorKind::ReportUnreadable,
                            format!("could not read {}: {}", LICENSE_REPORT, e)
                        )
                    );
                }
            }
        }
        None => {
            fallback_dependency_tree(root, timeout, &mut outcome);
        }
    }

    outcome
}

fn gradle_program(root: &Path) -> String {
    let wrapper = root.join("gradlew");
    if wrapper.is_file() {
        wrapper.to_string_lossy().into_owned()
    } else {
        "gradle".to_string()
    }
}

fn fallback_dependency_tree(root: &Path, timeout: Duration, outcome: &mut ParserOutcome) {
    match exec::run_command(&gradle_program(root), &["dependencies", "-q"], root, timeout) {
        Ok(output) if output.success => {
            outcome.dependencies = parse_dependency_tree(&output.stdout);
            outcome.warnings.push(
                ExtractionError::new(
                    ErrorSource::Gradle,
                    ExtractionErrorKind::Degraded,
                    "license report unavailable; dependency tree carries no license info".to_string()
                )
            );
        }
        Ok(_) => {
            outcome.errors.push(
                ExtractionError::new(
                    ErrorSource::Gradle,
                    ExtractionErrorKind::CommandFailed,
                    "gradle dependencies exited with a failure status".to_string()
                )
            );
        }
        Err(e) => {
            outcome.errors.push(exec_error(ErrorSource::Gradle, e));
        }
    }
}

// The report plugin has produced a few field spellings over its lifetime;
// accept both the group/name/version shape and the moduleName/moduleVersion
// one, and both `name` and `license` keys inside license entries.
#[derive(Deserialize)]
struct LicenseReport {
    #[serde(default)]
    dependencies: Vec<ReportDependency>,
}

#[derive(Deserialize)]
struct ReportDependency {
    group: Option<String>,
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "moduleName")]
    module_name: Option<String>,
    #[serde(rename = "moduleVersion")]
    module_version: Option<String>,
    #[serde(rename = "moduleLicense")]
    module_license: Option<String>,
    #[serde(default)]
    licenses: Vec<ReportLicense>,
}

#[derive(Deserialize)]
struct ReportLicense {
    name: Option<String>,
    license: Option<String>,
}

/// Validating decode of the JSON license report into canonical records.
/// Entries missing a resolvable name or version are dropped, never emitted
/// half-typed.
pub fn parse_license_report(content: &str) -> Result<Vec<Dependency>, serde_json::Error> {
    let report: LicenseReport = serde_json::from_str(content)?;
    let mut dependencies = Vec::new();

    for entry in report.dependencies {
        let name = match (&entry.module_name, &entry.group, &entry.name) {
            (Some(module), _, _) if !module.is_empty() => module.clone(),
            (None, Some(group), Some(name)) if !group.is_empty() => {
                format!("{}:{}", group, name)
            }
            (None, None, Some(name)) => name.clone(),
            _ => {
                continue;
            }
        };
        let version = match entry.version.or(entry.module_version) {
            Some(v) if !v.is_empty() => v,
            _ => {
                continue;
            }
        };

        let mut licenses: Vec<String> = Vec::new();
        for license in &entry.licenses {
            let raw = license.name.as_deref().or(license.license.as_deref());
            if let Some(raw) = raw {
                licenses.extend(spdx::split_expression(raw));
            }
        }
        if let Some(raw) = &entry.module_license {
            licenses.extend(spdx::split_expression(raw));
        }
        licenses.dedup();

        let dependency = if licenses.is_empty() {
            Dependency::new(name, version)
        } else {
            Dependency::with_licenses(name, version, licenses)
        };
        if dependency.is_valid() {
            dependencies.push(dependency);
        }
    }

    Ok(dependencies)
}

/// Parse `gradle dependencies` tree output. Handles `+---`/`\---` nodes,
/// `->` version resolution arrows, and the `(*)`/`(c)`/`(n)` repeat markers.
pub fn parse_dependency_tree(stdout: &str) -> Vec<Dependency> {
    let mut dependencies: Vec<Dependency> = Vec::new();

    for line in stdout.lines() {
        let node = match line.find("--- ") {
            Some(pos) => line[pos + 4..].trim(),
            None => {
                continue;
            }
        };

        let node = node
            .trim_end_matches("(*)")
            .trim_end_matches("(c)")
            .trim_end_matches("(n)")
            .trim();

        // Subproject nodes carry no coordinates.
        if node.starts_with("project ") || node.is_empty() {
            continue;
        }

        let (coordinate, resolved) = match node.split_once(" -> ") {
            Some((left, right)) => (left.trim(), Some(right.trim())),
            None => (node, None),
        };

        let parts: Vec<&str> = coordinate.split(':').collect();
        let dependency = match (parts.len(), resolved) {
            // group:name:declared -> resolved
            (3, Some(version)) | (2, Some(version)) => {
                Dependency::new(format!("{}:{}", parts[0], parts[1]), version.to_string())
            }
            (3, None) => {
                Dependency::new(format!("{}:{}", parts[0], parts[1]), parts[2].to_string())
            }
            _ => {
                continue;
            }
        };

        if dependency.is_valid() && !dependencies.iter().any(|d| d.key() == dependency.key()) {
            dependencies.push(dependency);
        }
    }

    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_group_name_version_shape() {
        let json = r#"{
            "dependencies": [
                {
                    "group": "org.apache.commons",
                    "name": "commons-lang3",
                    "version": "3.12.0",
                    "licenses": [{ "name": "Apache License, Version 2.0" }]
                }
            ]
        }"#;
        let deps = parse_license_report(json).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "org.apache.commons:commons-lang3");
        assert_eq!(deps[0].licenses, Some(vec!["Apache License, Version 2.0".to_string()]));
    }

    #[test]
    fn test_report_module_name_shape() {
        let json = r#"{
            "dependencies": [
                {
                    "moduleName": "ch.qos.logback:logback-classic",
                    "moduleVersion": "1.2.11",
                    "moduleLicense": "Eclipse Public License - v 1.0"
                }
            ]
        }"#;
        let deps = parse_license_report(json).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "ch.qos.logback:logback-classic");
        assert_eq!(deps[0].version, "1.2.11");
        assert_eq!(deps[0].licenses, Some(vec!["Eclipse Public License - v 1.0".to_string()]));
    }

    #[test]
    fn test_report_license_key_variant_and_spdx_split() {
        let json = r#"{
            "dependencies": [
                {
                    "group": "com.example",
                    "name": "dual",
                    "version": "1.0.0",
                    "licenses": [{ "license": "MIT OR Apache-2.0" }]
                }
            ]
        }"#;
        let deps = parse_license_report(json).unwrap();
        assert_eq!(
            deps[0].licenses,
            Some(vec!["MIT".to_string(), "Apache-2.0".to_string()])
        );
    }

    #[test]
    fn test_report_drops_incomplete_entries() {
        let json = r#"{
            "dependencies": [
                { "group": "com.example", "name": "no-version", "licenses": [] },
                { "version": "1.0.0", "licenses": [] },
                { "group": "com.example", "name": "ok", "version": "2.0.0" }
            ]
        }"#;
        let deps = parse_license_report(json).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "com.example:ok");
        assert!(deps[0].licenses.is_none());
    }

    #[test]
    fn test_tree_parsing() {
        let tree = "\
runtimeClasspath - Runtime classpath of source set 'main'.
+--- org.apache.commons:commons-lang3:3.12.0
+--- com.fasterxml.jackson.core:jackson-databind:2.13.0 -> 2.13.4
|    +--- com.fasterxml.jackson.core:jackson-core:2.13.4
|    \\--- com.fasterxml.jackson.core:jackson-annotations:2.13.4 (*)
\\--- project :shared
";
        let deps = parse_dependency_tree(tree);
        assert_eq!(deps.len(), 4);
        assert_eq!(deps[0].name, "org.apache.commons:commons-lang3");
        assert_eq!(deps[0].version, "3.12.0");
        assert_eq!(deps[1].version, "2.13.4");
        assert!(deps.iter().all(|d| d.licenses.is_none()));
    }

    #[test]
    fn test_tree_constraint_arrow_without_declared_version() {
        let tree = "+--- org.slf4j:slf4j-api -> 1.7.36\n";
        let deps = parse_dependency_tree(tree);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "org.slf4j:slf4j-api");
        assert_eq!(deps[0].version, "1.7.36");
    }

    #[test]
    fn test_tree_deduplicates_repeats() {
        let tree = "\
+--- org.slf4j:slf4j-api:1.7.36
\\--- org.slf4j:slf4j-api:1.7.36 (*)
";
        let deps = parse_dependency_tree(tree);
        assert_eq!(deps.len(), 1);
    }
}
