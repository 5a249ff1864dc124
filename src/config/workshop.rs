//! Workshop metadata from the root `package.json`.
//!
//! ```json
//! {
//!   "name": "react-fundamentals",
//!   "kcdshop": {
//!     "title": "React Fundamentals",
//!     "subtitle": "Learn the basics",
//!     "githubRoot": "https://github.com/acme/react-fundamentals/blob/main"
//!   }
//! }
//! ```

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize)]
struct RootPackage {
    #[serde(default)]
    kcdshop: WorkshopMeta,
}

/// The `kcdshop` property of the workshop's `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub github_root: Option<String>,
}

impl WorkshopMeta {
    /// Read metadata from `<root>/package.json`.
    ///
    /// A workshop without `package.json` has empty metadata; a malformed one
    /// is an error.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join("package.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|err| ConfigError::Io(path.clone(), err))?;
        let package: RootPackage =
            serde_json::from_str(&content).map_err(|err| ConfigError::Json(path, err))?;
        Ok(package.kcdshop)
    }

    /// The workshop title. Required: there is no sensible fallback.
    pub fn title(&self, root: &Path) -> Result<&str, ConfigError> {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingWorkshopTitle(package_path(root)))
    }
}

fn package_path(root: &Path) -> PathBuf {
    root.join("package.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_workshop_meta() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name":"w","kcdshop":{"title":"React Hooks","githubRoot":"https://x"}}"#,
        )
        .unwrap();

        let meta = WorkshopMeta::load(dir.path()).unwrap();
        assert_eq!(meta.title(dir.path()).unwrap(), "React Hooks");
        assert_eq!(meta.github_root.as_deref(), Some("https://x"));
        assert!(meta.subtitle.is_none());
    }

    #[test]
    fn test_missing_title_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"w"}"#).unwrap();

        let meta = WorkshopMeta::load(dir.path()).unwrap();
        let err = meta.title(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingWorkshopTitle(_)));
    }

    #[test]
    fn test_malformed_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{ nope").unwrap();

        assert!(matches!(
            WorkshopMeta::load(dir.path()),
            Err(ConfigError::Json(..))
        ));
    }

    #[test]
    fn test_no_package_json() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(WorkshopMeta::load(dir.path()).unwrap(), WorkshopMeta::default());
    }
}
