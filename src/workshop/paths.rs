//! Workshop layout and app identity.
//!
//! An app's name is its path relative to the workshop root with separators
//! replaced by [`NAME_DELIMITER`], so it fits in a single URL segment:
//!
//! ```text
//! <root>/exercises/01.intro/02.solution  ──►  exercises__sep__01.intro__sep__02.solution
//! <root>/playground                      ──►  playground
//! ```

use super::error::BuildError;
use std::path::{Component, Path, PathBuf};

/// Token standing in for `/` in app names.
pub const NAME_DELIMITER: &str = "__sep__";

/// Fixed directory layout of a workshop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkshopPaths {
    pub root: PathBuf,
    pub exercises: PathBuf,
    pub examples: PathBuf,
    pub playground: PathBuf,
    /// `<root>/node_modules/.cache/kcdshop`
    pub cache_dir: PathBuf,
}

impl WorkshopPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            exercises: root.join("exercises"),
            examples: root.join("examples"),
            playground: root.join("playground"),
            cache_dir: root.join("node_modules").join(".cache").join("kcdshop"),
        }
    }

    /// Where the playground's source app name is persisted.
    pub fn playground_pointer(&self) -> PathBuf {
        self.cache_dir.join("playground.json")
    }

    /// Stable identifier for the directory at `full_path`.
    ///
    /// Refuses paths outside the root and paths whose segments already
    /// contain the delimiter, since those names would not map back to a
    /// unique path.
    pub fn name_from_path(&self, full_path: &Path) -> Result<String, BuildError> {
        Ok(self.segments(full_path)?.join(NAME_DELIMITER))
    }

    /// Inverse of [`name_from_path`](Self::name_from_path).
    pub fn path_from_name(&self, name: &str) -> PathBuf {
        name.split(NAME_DELIMITER)
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// `/`-joined path relative to the root.
    pub fn relative_path(&self, full_path: &Path) -> Result<String, BuildError> {
        Ok(self.segments(full_path)?.join("/"))
    }

    fn segments<'a>(&self, full_path: &'a Path) -> Result<Vec<&'a str>, BuildError> {
        let outside = || BuildError::OutsideWorkshop(full_path.to_path_buf());
        let relative = full_path.strip_prefix(&self.root).map_err(|_| outside())?;

        let segments = relative
            .components()
            .map(|component| match component {
                Component::Normal(segment) => segment.to_str().ok_or_else(outside),
                _ => Err(outside()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(outside());
        }
        if segments.iter().any(|segment| segment.contains(NAME_DELIMITER)) {
            return Err(BuildError::ReservedDelimiter(full_path.to_path_buf()));
        }
        Ok(segments)
    }
}
