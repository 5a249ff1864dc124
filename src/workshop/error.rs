//! Error types for app discovery and lookups.

use super::classify::StepKind;
use crate::package::PackageError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single directory could not become an [`App`](super::App).
///
/// These never abort a catalog scan; the directory is left out and the
/// error is logged.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("`{0}` is not a {1} directory")]
    InvalidStepDir(PathBuf, StepKind),

    #[error("`{0}` is not inside a numbered exercise directory")]
    InvalidExerciseDir(PathBuf),

    #[error("`{0}` contains the reserved name delimiter `__sep__`")]
    ReservedDelimiter(PathBuf),

    #[error("`{0}` is outside the workshop root")]
    OutsideWorkshop(PathBuf),

    #[error("dev server port for `{0}` is out of range")]
    PortOutOfRange(PathBuf),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("IO error in `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Lookup misses, surfaced as 404 by the HTTP layer.
#[derive(Debug, Error)]
pub enum NotFound {
    #[error("no app named `{0}`")]
    App(String),

    #[error("no exercise number {0}")]
    Exercise(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::InvalidStepDir(PathBuf::from("/w/exercises/01.a/x"), StepKind::Problem);
        assert_eq!(err.to_string(), "`/w/exercises/01.a/x` is not a problem directory");

        let err = NotFound::Exercise(4);
        assert_eq!(err.to_string(), "no exercise number 4");
    }
}
