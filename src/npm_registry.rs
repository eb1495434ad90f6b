use std::collections::{ HashMap, HashSet, VecDeque };
use std::error::Error;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use urlencoding::encode;

use crate::dependency::Dependency;
use crate::spdx;

/// Bounded fan-out for registry lookups; unbounded parallelism is disallowed.
pub const REGISTRY_FAN_OUT: usize = 10;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One registry document reduced to what extraction needs.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub licenses: Option<Vec<String>>,
    pub dependencies: Vec<(String, String)>,
}

/// Blocking npm registry client with a per-lookup memoization cache.
///
/// The cache is owned by the client and guarded by a mutex; lookups are
/// idempotent so last-write-wins is fine under the bounded fan-out.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    cache: Mutex<HashMap<String, Option<PackageRecord>>>,
}

impl RegistryClient {
    pub fn new() -> Result<RegistryClient, Box<dyn Error>> {
        RegistryClient::with_base(DEFAULT_REGISTRY)
    }

    pub fn with_base(base_url: &str) -> Result<RegistryClient, Box<dyn Error>> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("compliance-scanner/0.1")
            .build()?;

        Ok(RegistryClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Memoized lookup keyed by `name@versionSpec`. Network, HTTP, and parse
    /// failures all come back as None; they never abort a worker pool.
    pub fn lookup(&self, name: &str, version_spec: &str) -> Option<PackageRecord> {
        let key = format!("{}@{}", name, version_spec);

        {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get(&key) {
                return cached.clone();
            }
        }

        let record = self.fetch(name, version_spec);

        let mut cache = self.cache.lock().unwrap();
        cache.insert(key, record.clone());
        record
    }

    /// Seed the cache directly. Exists for tests and for pre-resolved data.
    #[cfg(test)]
    pub fn prime_cache(&self, name: &str, version_spec: &str, record: Option<PackageRecord>) {
        let key = format!("{}@{}", name, version_spec);
        self.cache.lock().unwrap().insert(key, record);
    }

    fn fetch(&self, name: &str, version_spec: &str) -> Option<PackageRecord> {
        let url = format!("{}/{}", self.base_url, encode_package_name(name));

        let response = self.client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let document: Value = response.json().ok()?;

        let wanted = clean_version_spec(version_spec);
        let versions = document.get("versions").and_then(|v| v.as_object());

        // Exact version first, then whatever the latest dist-tag points at.
        let version_data = versions.and_then(|map| {
            map.get(&wanted).or_else(|| {
                document
                    .get("dist-tags")
                    .and_then(|t| t.get("latest"))
                    .and_then(|l| l.as_str())
                    .and_then(|latest| map.get(latest))
            })
        });

        let resolved_version = version_data
            .and_then(|d| d.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or(&wanted)
            .to_string();

        let licenses = version_data
            .and_then(extract_licenses)
            .or_else(|| extract_licenses(&document));

        let mut dependencies = Vec::new();
        if let Some(deps) = version_data
            .and_then(|d| d.get("dependencies"))
            .and_then(|d| d.as_object())
        {
            for (dep_name, spec) in deps {
                if let Some(spec_str) = spec.as_str() {
                    dependencies.push((dep_name.clone(), spec_str.to_string()));
                }
            }
        }

        Some(PackageRecord {
            name: name.to_string(),
            version: resolved_version,
            licenses,
            dependencies,
        })
    }

    /// Resolve licenses for a known `(name, version)` list with a bounded
    /// worker pool. Output order matches input order; packages the registry
    /// cannot answer for keep `licenses = None`.
    pub fn resolve_licenses(&self, pairs: &[(String, String)]) -> Vec<Dependency> {
        let queue: Mutex<VecDeque<usize>> = Mutex::new((0..pairs.len()).collect());
        let results: Mutex<Vec<Option<Vec<String>>>> = Mutex::new(vec![None; pairs.len()]);

        let workers = REGISTRY_FAN_OUT.min(pairs.len().max(1));
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = {
                            let mut q = queue.lock().unwrap();
                            match q.pop_front() {
                                Some(i) => i,
                                None => {
                                    break;
                                }
                            }
                        };

                        let (name, version) = &pairs[index];
                        let licenses = self
                            .lookup(name, version)
                            .and_then(|record| record.licenses);
                        results.lock().unwrap()[index] = licenses;
                    }
                });
            }
        });

        let resolved = results.into_inner().unwrap();
        pairs
            .iter()
            .zip(resolved)
            .map(|((name, version), licenses)| {
                match licenses {
                    Some(list) => Dependency::with_licenses(name.clone(), version.clone(), list),
                    None => Dependency::new(name.clone(), version.clone()),
                }
            })
            .collect()
    }

    /// Breadth-first walk of the transitive closure starting from declared
    /// dependencies, discovering edges from registry documents. Used when no
    /// lockfile pins the full set.
    pub fn walk_transitive(&self, seeds: Vec<(String, String)>) -> Vec<Dependency> {
        struct WalkState {
            queue: VecDeque<(String, String)>,
            in_flight: usize,
            seen: HashSet<String>,
        }

        let state = Mutex::new(WalkState {
            seen: seeds.iter().map(|(n, v)| format!("{}@{}", n, clean_version_spec(v))).collect(),
            queue: seeds.into_iter().collect(),
            in_flight: 0,
        });
        let results: Mutex<HashMap<String, Dependency>> = Mutex::new(HashMap::new());

        let workers = REGISTRY_FAN_OUT;
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let item = {
                            let mut s = state.lock().unwrap();
                            match s.queue.pop_front() {
                                Some(item) => {
                                    s.in_flight += 1;
                                    Some(item)
                                }
                                None if s.in_flight == 0 => {
                                    break;
                                }
                                None => None,
                            }
                        };

                        let (name, spec) = match item {
                            Some(pair) => pair,
                            None => {
                                // Another worker may still enqueue discoveries.
                                thread::sleep(Duration::from_millis(5));
                                continue;
                            }
                        };

                        let record = self.lookup(&name, &spec);

                        let mut s = state.lock().unwrap();
                        match record {
                            Some(record) => {
                                for (dep_name, dep_spec) in &record.dependencies {
                                    let key = format!(
                                        "{}@{}",
                                        dep_name,
                                        clean_version_spec(dep_spec)
                                    );
                                    if s.seen.insert(key) {
                                        s.queue.push_back((dep_name.clone(), dep_spec.clone()));
                                    }
                                }
                                let dep = match record.licenses {
                                    Some(list) => Dependency::with_licenses(
                                        record.name,
                                        record.version,
                                        list
                                    ),
                                    None => Dependency::new(record.name, record.version),
                                };
                                results.lock().unwrap().entry(dep.key()).or_insert(dep);
                            }
                            None => {
                                let dep = Dependency::new(name, clean_version_spec(&spec));
                                results.lock().unwrap().entry(dep.key()).or_insert(dep);
                            }
                        }
                        s.in_flight -= 1;
                    }
                });
            }
        });

        let mut collected: Vec<Dependency> = results.into_inner().unwrap().into_values().collect();
        collected.sort_by(|a, b| a.key().cmp(&b.key()));
        collected
    }
}

/// Scoped packages need the @ and / encoded by hand; everything else goes
/// through normal percent-encoding.
pub fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('@', "%40").replace('/', "%2F")
    } else {
        encode(name).to_string()
    }
}

/// Strip range specifiers from a version spec: "^4.17.21" -> "4.17.21".
pub fn clean_version_spec(spec: &str) -> String {
    let stripped = spec
        .trim()
        .trim_start_matches(|c: char| matches!(c, '^' | '~' | '>' | '<' | '=' | ' '));
    // Complex ranges keep only the first bound.
    let first = stripped.split_whitespace().next().unwrap_or("");
    if first.is_empty() || first == "*" {
        "latest".to_string()
    } else {
        first.to_string()
    }
}

/// Pull atomic license names out of a registry document fragment. Handles the
/// `license` string, `license` object, and legacy `licenses` array shapes.
fn extract_licenses(data: &Value) -> Option<Vec<String>> {
    if let Some(license) = data.get("license") {
        if let Some(s) = license.as_str() {
            let split = spdx::split_expression(s);
            if !split.is_empty() {
                return Some(split);
            }
        }
        if let Some(obj) = license.as_object() {
            if let Some(t) = obj.get("type").and_then(|t| t.as_str()) {
                let split = spdx::split_expression(t);
                if !split.is_empty() {
                    return Some(split);
                }
            }
        }
    }

    if let Some(array) = data.get("licenses").and_then(|l| l.as_array()) {
        let mut names = Vec::new();
        for entry in array {
            if let Some(t) = entry.get("type").and_then(|t| t.as_str()) {
                names.extend(spdx::split_expression(t));
            }
        }
        if !names.is_empty() {
            return Some(names);
        }
    }

    None
}
