use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::dependency::{ Dependency, ErrorSource, ExtractionError, ExtractionErrorKind };
use crate::exec;
use crate::npm_registry::{ clean_version_spec, RegistryClient };
use crate::parsers::ParserOutcome;

pub fn detect(root: &Path) -> bool {
    root.join("package.json").is_file()
}

/// Enumerate the full transitive dependency set with licenses.
///
/// Primary path: the lockfile pins `(name, version)` for the whole tree and
/// the registry answers license questions; without a lockfile the registry
/// is walked breadth-first from the declared dependencies. Without registry
/// access the result degrades to license-less records, flagged as a warning
/// rather than silently dropped.
pub fn extract(root: &Path, registry: Option<&RegistryClient>) -> ParserOutcome {
    let mut outcome = ParserOutcome::new();
    let root = &root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let manifest = match read_json(&root.join("package.json")) {
        Ok(json) => json,
        Err(message) => {
            outcome.errors.push(
                ExtractionError::new(
                    ErrorSource::Npm,
                    ExtractionErrorKind::ReportUnreadable,
                    format!("package.json: {}", message)
                )
            );
            return outcome;
        }
    };
    let direct = direct_dependencies(&manifest);

    let lock_pairs = match exec::resolve_inside(root, "package-lock.json") {
        Some(lock_path) => {
            match read_json(&lock_path) {
                Ok(lock) => Some(parse_lock(&lock)),
                Err(message) => {
                    outcome.warnings.push(
                        ExtractionError::new(
                            ErrorSource::Npm,
                            ExtractionErrorKind::Degraded,
                            format!("package-lock.json unreadable, ignoring it: {}", message)
                        )
                    );
                    None
                }
            }
        }
        None => None,
    };

    match (lock_pairs, registry) {
        (Some(pairs), Some(client)) => {
            outcome.dependencies = client.resolve_licenses(&pairs);
        }
        (Some(pairs), None) => {
            outcome.dependencies = pairs
                .into_iter()
                .map(|(name, version)| Dependency::new(name, version))
                .collect();
            outcome.warnings.push(degraded_warning("registry lookups disabled; lockfile entries carry no license info"));
        }
        (None, Some(client)) => {
            outcome.dependencies = client.walk_transitive(direct);
        }
        (None, None) => {
            outcome.dependencies = direct
                .into_iter()
                .map(|(name, spec)| Dependency::new(name, clean_version_spec(&spec)))
                .collect();
            outcome.warnings.push(degraded_warning("no lockfile and registry lookups disabled; direct dependencies only, no license info"));
        }
    }

    outcome.dependencies.retain(|d| d.is_valid());
    outcome
}

fn degraded_warning(message: &str) -> ExtractionError {
    ExtractionError::new(ErrorSource::Npm, ExtractionErrorKind::Degraded, message.to_string())
}

fn read_json(path: &Path) -> Result<Value, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

/// Direct dependency declarations, runtime and dev alike.
pub fn direct_dependencies(manifest: &Value) -> Vec<(String, String)> {
    let mut declared = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(map) = manifest.get(section).and_then(|d| d.as_object()) {
            for (name, spec) in map {
                if let Some(spec_str) = spec.as_str() {
                    declared.push((name.clone(), spec_str.to_string()));
                }
            }
        }
    }
    declared
}

/// Enumerate the full transitive `(name, version)` set from a lockfile.
/// Understands both the v1 nested `dependencies` shape and the v2+ flat
/// `packages` map.
pub fn parse_lock(lock: &Value) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    if let Some(packages) = lock.get("packages").and_then(|p| p.as_object()) {
        for (path, data) in packages {
            // The empty key is the root project itself.
            if path.is_empty() {
                continue;
            }
            if data.get("link").and_then(|l| l.as_bool()).unwrap_or(false) {
                continue;
            }
            let name = match data.get("name").and_then(|n| n.as_str()) {
                Some(n) => n.to_string(),
                None => {
                    match path.rsplit_once("node_modules/") {
                        Some((_, n)) => n.to_string(),
                        None => {
                            continue;
                        }
                    }
                }
            };
            let version = match data.get("version").and_then(|v| v.as_str()) {
                Some(v) => v.to_string(),
                None => {
                    continue;
                }
            };
            if seen.insert(format!("{}@{}", name, version)) {
                pairs.push((name, version));
            }
        }
        return pairs;
    }

    if let Some(dependencies) = lock.get("dependencies").and_then(|d| d.as_object()) {
        collect_v1(dependencies, &mut seen, &mut pairs);
    }
    pairs
}

fn collect_v1(
    dependencies: &serde_json::Map<String, Value>,
    seen: &mut HashSet<String>,
    pairs: &mut Vec<(String, String)>
) {
    for (name, data) in dependencies {
        if let Some(version) = data.get("version").and_then(|v| v.as_str()) {
            if seen.insert(format!("{}@{}", name, version)) {
                pairs.push((name.clone(), version.to_string()));
            }
        }
        if let Some(nested) = data.get("dependencies").and_then(|d| d.as_object()) {
            collect_v1(nested, seen, pairs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_dependencies() {
        let manifest = json!({
            "dependencies": { "lodash": "^4.17.21" },
            "devDependencies": { "jest": "~29.0.0" }
        });
        let direct = direct_dependencies(&manifest);
        assert_eq!(direct.len(), 2);
        assert!(direct.contains(&("lodash".to_string(), "^4.17.21".to_string())));
        assert!(direct.contains(&("jest".to_string(), "~29.0.0".to_string())));
    }

    #[test]
    fn test_parse_lock_v2_packages_shape() {
        let lock = json!({
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "my-app", "version": "1.0.0" },
                "node_modules/lodash": { "version": "4.17.21" },
                "node_modules/@babel/core": { "version": "7.20.0" },
                "node_modules/a/node_modules/b": { "version": "2.0.0" },
                "node_modules/linked": { "link": true }
            }
        });
        let pairs = parse_lock(&lock);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("lodash".to_string(), "4.17.21".to_string())));
        assert!(pairs.contains(&("@babel/core".to_string(), "7.20.0".to_string())));
        assert!(pairs.contains(&("b".to_string(), "2.0.0".to_string())));
    }

    #[test]
    fn test_parse_lock_v1_nested_shape() {
        let lock = json!({
            "lockfileVersion": 1,
            "dependencies": {
                "express": {
                    "version": "4.18.2",
                    "dependencies": {
                        "accepts": { "version": "1.3.8" }
                    }
                }
            }
        });
        let pairs = parse_lock(&lock);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("express".to_string(), "4.18.2".to_string())));
        assert!(pairs.contains(&("accepts".to_string(), "1.3.8".to_string())));
    }

    #[test]
    fn test_extract_without_registry_or_lock_degrades_to_direct_list() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "dependencies": { "lodash": "^4.17.21" } }"#
        ).unwrap();

        let outcome = extract(dir.path(), None);
        assert_eq!(outcome.dependencies.len(), 1);
        assert_eq!(outcome.dependencies[0].name, "lodash");
        assert_eq!(outcome.dependencies[0].version, "4.17.21");
        assert!(outcome.dependencies[0].licenses.is_none());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_extract_with_lock_but_no_registry_warns_degraded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(
            dir.path().join("package-lock.json"),
            r#"{ "packages": { "": {}, "node_modules/ms": { "version": "2.1.3" } } }"#
        ).unwrap();

        let outcome = extract(dir.path(), None);
        assert_eq!(outcome.dependencies.len(), 1);
        assert_eq!(outcome.dependencies[0].name, "ms");
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_extract_invalid_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "not json").unwrap();

        let outcome = extract(dir.path(), None);
        assert!(outcome.dependencies.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}
