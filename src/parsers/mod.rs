use std::path::Path;

use crate::dependency::{ ErrorSource, ExtractionError, ExtractionErrorKind };
use crate::exec::ExecError;

pub mod maven;
pub mod gradle;
pub mod npm;

/// Build ecosystems the scanner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Maven,
    Gradle,
    Npm,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 3] = [Ecosystem::Maven, Ecosystem::Gradle, Ecosystem::Npm];

    /// Presence of the ecosystem's marker file(s) in the project root.
    pub fn detect(&self, root: &Path) -> bool {
        match self {
            Ecosystem::Maven => maven::detect(root),
            Ecosystem::Gradle => gradle::detect(root),
            Ecosystem::Npm => npm::detect(root),
        }
    }

    pub fn source(&self) -> ErrorSource {
        match self {
            Ecosystem::Maven => ErrorSource::Maven,
            Ecosystem::Gradle => ErrorSource::Gradle,
            Ecosystem::Npm => ErrorSource::Npm,
        }
    }

    pub fn name(&self) -> &'static str {
        self.source().as_str()
    }
}

/// What one parser hands back: canonical records plus its own fatal errors
/// and degraded-path warnings, kept apart.
#[derive(Debug, Default)]
pub struct ParserOutcome {
    pub dependencies: Vec<crate::dependency::Dependency>,
    pub warnings: Vec<ExtractionError>,
    pub errors: Vec<ExtractionError>,
}

impl ParserOutcome {
    pub fn new() -> Self {
        ParserOutcome::default()
    }
}

/// Map a command execution fault onto the extraction error taxonomy.
pub(crate) fn exec_error(source: ErrorSource, error: ExecError) -> ExtractionError {
    let kind = match &error {
        ExecError::SpawnFailed(_) | ExecError::Io(_) => ExtractionErrorKind::CommandFailed,
        ExecError::Timeout(_) => ExtractionErrorKind::Timeout,
        ExecError::OutputOverflow(_) => ExtractionErrorKind::OutputOverflow,
        ExecError::InvalidPath(_) => ExtractionErrorKind::InvalidPath,
    };
    ExtractionError::new(source, kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detection_per_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        assert!(!Ecosystem::Maven.detect(root));
        assert!(!Ecosystem::Gradle.detect(root));
        assert!(!Ecosystem::Npm.detect(root));

        fs::write(root.join("pom.xml"), "<project/>").unwrap();
        fs::write(root.join("build.gradle.kts"), "plugins {}").unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();

        assert!(Ecosystem::Maven.detect(root));
        assert!(Ecosystem::Gradle.detect(root));
        assert!(Ecosystem::Npm.detect(root));
    }

    #[test]
    fn test_exec_error_mapping() {
        let mapped = exec_error(
            ErrorSource::Maven,
            ExecError::Timeout(std::time::Duration::from_secs(1))
        );
        assert_eq!(mapped.kind, ExtractionErrorKind::Timeout);
        assert_eq!(mapped.source, ErrorSource::Maven);

        let mapped = exec_error(ErrorSource::Gradle, ExecError::OutputOverflow(100));
        assert_eq!(mapped.kind, ExtractionErrorKind::OutputOverflow);
    }
}
