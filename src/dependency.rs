use serde::{ Serialize, Deserialize };

/// One resolved third-party package reference in canonical form.
///
/// `licenses` is a disjunction: the dependency is compliant if ANY listed
/// license is compliant. `None` means no license information was available
/// at extraction time, which is a different situation from carrying a
/// license the policy table does not know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub licenses: Option<Vec<String>>,
}

impl Dependency {
    pub fn new(name: String, version: String) -> Self {
        Dependency {
            name,
            version,
            licenses: None,
        }
    }

    pub fn with_licenses(name: String, version: String, licenses: Vec<String>) -> Self {
        Dependency {
            name,
            version,
            licenses: if licenses.is_empty() {
                None
            } else {
                Some(licenses)
            },
        }
    }

    /// Records with an empty name or version never reach the evaluator.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.version.trim().is_empty()
    }

    pub fn has_license_info(&self) -> bool {
        match &self.licenses {
            Some(list) => !list.is_empty(),
            None => false,
        }
    }

    /// Deduplication key across ecosystems.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Which component produced an extraction error or warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSource {
    Maven,
    Gradle,
    Npm,
    Orchestrator,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSource::Maven => "maven",
            ErrorSource::Gradle => "gradle",
            ErrorSource::Npm => "npm",
            ErrorSource::Orchestrator => "orchestrator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionErrorKind {
    /// The build tool could not be started or crashed.
    CommandFailed,
    /// The build tool exceeded its execution timeout.
    Timeout,
    /// The build tool produced more output than the bounded buffer allows.
    OutputOverflow,
    /// The project root or a report artifact resolved outside the project.
    InvalidPath,
    /// A report artifact existed but could not be read or parsed.
    ReportUnreadable,
    /// A fallback extraction path produced usable but incomplete data.
    Degraded,
    /// An unexpected internal fault was caught at the orchestrator boundary.
    Internal,
}

/// A structured extraction fault. Fatal faults land in `errors`, degraded
/// but usable outcomes land in `warnings`; the two lists never mix.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionError {
    pub source: ErrorSource,
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(source: ErrorSource, kind: ExtractionErrorKind, message: String) -> Self {
        ExtractionError { source, kind, message }
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source.as_str(), self.message)
    }
}
