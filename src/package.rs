//! `package.json` reader.
//!
//! Apps describe their dev server and tests through `package.json`
//! properties addressed with dotted paths such as `scripts.dev` or
//! `kcdshop.scripts.test`.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("no package.json in `{0}`")]
    Missing(PathBuf),

    #[error("could not read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed package.json `{0}`")]
    Malformed(PathBuf, #[source] serde_json::Error),
}

pub fn package_path(dir: &Path) -> PathBuf {
    dir.join("package.json")
}

/// Parse `<dir>/package.json`.
pub async fn read_package(dir: &Path) -> Result<Value, PackageError> {
    let path = package_path(dir);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PackageError::Missing(dir.to_path_buf()));
        }
        Err(err) => return Err(PackageError::Io(path, err)),
    };
    serde_json::from_str(&content).map_err(|err| PackageError::Malformed(path, err))
}

/// Look up a dotted property path inside a parsed package.
pub fn property<'a>(package: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(package, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

/// Read one dotted property from `<dir>/package.json`.
pub async fn read_property(dir: &Path, dotted: &str) -> Result<Option<Value>, PackageError> {
    let package = read_package(dir).await?;
    Ok(property(&package, dotted).cloned())
}

/// Non-empty string property, or `None`. A missing `package.json` counts as
/// an absent property; a malformed one is an error.
pub async fn string_property(dir: &Path, dotted: &str) -> Result<Option<String>, PackageError> {
    match read_property(dir, dotted).await {
        Ok(value) => Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)),
        Err(PackageError::Missing(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
