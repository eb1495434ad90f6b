use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::dependency::{ Dependency, ErrorSource, ExtractionError, ExtractionErrorKind };
use crate::exec;
use crate::npm_registry::RegistryClient;
use crate::parsers::{ self, Ecosystem, ParserOutcome };

pub struct ExtractOptions {
    pub offline: bool,
    pub timeout: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            offline: false,
            timeout: exec::DEFAULT_TIMEOUT,
        }
    }
}

/// The orchestrator's aggregate answer. `errors` means an ecosystem's
/// extraction failed outright; `warnings` means a degraded path still
/// produced usable records.
#[derive(Debug, Default, Serialize)]
pub struct ExtractionResult {
    pub dependencies: Vec<Dependency>,
    pub errors: Vec<ExtractionError>,
    pub warnings: Vec<ExtractionError>,
}

impl ExtractionResult {
    fn new() -> Self {
        ExtractionResult::default()
    }

    fn absorb(&mut self, outcome: ParserOutcome) {
        self.dependencies.extend(outcome.dependencies);
        self.warnings.extend(outcome.warnings);
        self.errors.extend(outcome.errors);
    }
}

/// Extract canonical dependency records from every build ecosystem present
/// under the project root. Total function: faults of any kind come back as
/// structured errors, never as a panic or an `Err`.
pub fn extract_dependencies(root_path: &str, options: &ExtractOptions) -> ExtractionResult {
    let mut result = ExtractionResult::new();

    let root = match exec::resolve_project_root(root_path) {
        Ok(root) => root,
        Err(e) => {
            result.errors.push(
                ExtractionError::new(
                    ErrorSource::Orchestrator,
                    ExtractionErrorKind::InvalidPath,
                    e.to_string()
                )
            );
            return result;
        }
    };

    let detected: Vec<Ecosystem> = Ecosystem::ALL
        .iter()
        .copied()
        .filter(|eco| eco.detect(&root))
        .collect();

    if detected.is_empty() {
        // Not a failure: nothing recognizable to scan is a manual-review signal.
        result.warnings.push(
            ExtractionError::new(
                ErrorSource::Orchestrator,
                ExtractionErrorKind::Degraded,
                "no recognized build system (pom.xml, build.gradle, package.json) found".to_string()
            )
        );
        return result;
    }

    let registry = if options.offline || !detected.contains(&Ecosystem::Npm) {
        None
    } else {
        match RegistryClient::new() {
            Ok(client) => Some(client),
            Err(e) => {
                result.warnings.push(
                    ExtractionError::new(
                        ErrorSource::Npm,
                        ExtractionErrorKind::Degraded,
                        format!("npm registry client unavailable: {}", e)
                    )
                );
                None
            }
        }
    };

    let outcomes = run_parsers(&root, &detected, registry.as_ref(), options.timeout);
    for (ecosystem, outcome) in outcomes {
        match outcome {
            Ok(outcome) => result.absorb(outcome),
            Err(()) => {
                result.errors.push(
                    ExtractionError::new(
                        ErrorSource::Orchestrator,
                        ExtractionErrorKind::Internal,
                        format!("{} extraction aborted unexpectedly", ecosystem.name())
                    )
                );
            }
        }
    }

    result.dependencies = merge_dependencies(result.dependencies);
    result
}

/// Run each detected parser on its own thread; a panicking parser is
/// contained at join and reported as an orchestrator-sourced fault.
fn run_parsers(
    root: &Path,
    detected: &[Ecosystem],
    registry: Option<&RegistryClient>,
    timeout: Duration
) -> Vec<(Ecosystem, Result<ParserOutcome, ()>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = detected
            .iter()
            .map(|&ecosystem| {
                let handle = scope.spawn(move || {
                    match ecosystem {
                        Ecosystem::Maven => parsers::maven::extract(root, timeout),
                        Ecosystem::Gradle => parsers::gradle::extract(root, timeout),
                        Ecosystem::Npm => parsers::npm::extract(root, registry),
                    }
                });
                (ecosystem, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(ecosystem, handle)| (ecosystem, handle.join().map_err(|_| ())))
            .collect()
    })
}

/// Deduplicate by `(name, version)`. On collision the record carrying
/// license info wins, regardless of which ecosystem produced it or in what
/// order; otherwise first-seen order is kept.
pub fn merge_dependencies(dependencies: Vec<Dependency>) -> Vec<Dependency> {
    let mut merged: Vec<Dependency> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for dependency in dependencies.into_iter().filter(|d| d.is_valid()) {
        match index.get(&dependency.key()) {
            Some(&slot) => {
                if !merged[slot].has_license_info() && dependency.has_license_info() {
                    merged[slot] = dependency;
                }
            }
            None => {
                index.insert(dependency.key(), merged.len());
                merged.push(dependency);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_root_is_an_error_not_a_panic() {
        let result = extract_dependencies("/no/such/project", &ExtractOptions::default());
        assert!(result.dependencies.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].source, ErrorSource::Orchestrator);
        assert_eq!(result.errors[0].kind, ExtractionErrorKind::InvalidPath);
    }

    #[test]
    fn test_no_build_system_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_dependencies(
            dir.path().to_str().unwrap(),
            &ExtractOptions::default()
        );
        assert!(result.dependencies.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].source, ErrorSource::Orchestrator);
    }

    #[test]
    fn test_merge_prefers_license_bearing_record() {
        let bare = Dependency::new("junit:junit".to_string(), "4.13.2".to_string());
        let licensed = Dependency::with_licenses(
            "junit:junit".to_string(),
            "4.13.2".to_string(),
            vec!["EPL-1.0".to_string()]
        );

        // License-bearing record second.
        let merged = merge_dependencies(vec![bare.clone(), licensed.clone()]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].has_license_info());

        // License-bearing record first.
        let merged = merge_dependencies(vec![licensed, bare]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].has_license_info());
    }

    #[test]
    fn test_merge_keeps_distinct_versions() {
        let merged = merge_dependencies(
            vec![
                Dependency::new("a".to_string(), "1.0.0".to_string()),
                Dependency::new("a".to_string(), "2.0.0".to_string())
            ]
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_drops_invalid_records() {
        let merged = merge_dependencies(
            vec![
                Dependency::new("".to_string(), "1.0.0".to_string()),
                Dependency::new("ok".to_string(), "".to_string()),
                Dependency::new("ok".to_string(), "1.0.0".to_string())
            ]
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "ok");
    }

    #[test]
    fn test_merge_does_not_replace_license_with_license() {
        let first = Dependency::with_licenses(
            "a".to_string(),
            "1.0.0".to_string(),
            vec!["MIT".to_string()]
        );
        let second = Dependency::with_licenses(
            "a".to_string(),
            "1.0.0".to_string(),
            vec!["GPL-3.0".to_string()]
        );
        let merged = merge_dependencies(vec![first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].licenses, Some(vec!["MIT".to_string()]));
    }
}
