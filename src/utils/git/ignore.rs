//! `.gitignore` matching.
//!
//! [`GitIgnore`] stacks the ignore files of several directories; each
//! [`IgnoreMatcher`] matches paths relative to the directory its
//! `.gitignore` came from.

use gix::{bstr::ByteSlice, glob::wildmatch};
use std::{
    fs,
    path::{Path, PathBuf},
};

// Bits of gix::ignore::search::pattern::Mode (the type itself is private).
const MODE_NO_SUB_DIR: u32 = 1 << 0;
const MODE_MUST_MATCH_DIR: u32 = 1 << 2;
const MODE_NEGATIVE: u32 = 1 << 3;
const MODE_ABSOLUTE: u32 = 1 << 4;

/// Patterns of a single `.gitignore` file.
#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<(gix::bstr::BString, u32)>,
}

impl IgnoreMatcher {
    pub fn new(gitignore: &[u8]) -> Self {
        let patterns = gix::ignore::parse(gitignore)
            .map(|(pattern, _, _)| (pattern.text, pattern.mode.bits()))
            .collect();
        Self { patterns }
    }

    /// Whether `path` (`/`-separated, relative to the `.gitignore`) is ignored.
    ///
    /// Last matching pattern wins; `!` patterns un-ignore.
    pub fn matches(&self, path: &str, is_dir: bool) -> bool {
        let mut is_ignored = false;
        for (text, mode) in &self.patterns {
            // "build/" never matches a file named "build"
            if mode & MODE_MUST_MATCH_DIR != 0 && !is_dir {
                continue;
            }

            let is_absolute = mode & MODE_ABSOLUTE != 0;
            let has_internal_slash = mode & MODE_NO_SUB_DIR == 0;

            // Slash-free, unanchored patterns match the basename.
            let match_path = if !has_internal_slash && !is_absolute {
                path.rsplit_once('/').map_or(path, |(_, name)| name)
            } else {
                path
            };

            if wildmatch(
                text.as_bstr(),
                match_path.into(),
                wildmatch::Mode::NO_MATCH_SLASH_LITERAL,
            ) {
                is_ignored = mode & MODE_NEGATIVE == 0;
            }
        }
        is_ignored
    }

    fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// `.gitignore` files of several base directories, applied together.
#[derive(Debug, Default)]
pub struct GitIgnore {
    layers: Vec<(PathBuf, IgnoreMatcher)>,
}

impl GitIgnore {
    /// Read `<base>/.gitignore` for every base that has one.
    pub fn load(bases: &[&Path]) -> std::io::Result<Self> {
        let mut layers = Vec::new();
        for base in bases {
            let path = base.join(".gitignore");
            let content = match fs::read(&path) {
                Ok(content) => content,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            let matcher = IgnoreMatcher::new(&content);
            if !matcher.is_empty() {
                layers.push((base.to_path_buf(), matcher));
            }
        }
        Ok(Self { layers })
    }

    /// Whether any layer whose base contains `path` ignores it.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.layers.iter().any(|(base, matcher)| {
            path.strip_prefix(base)
                .ok()
                .and_then(|relative| relative.to_str())
                .filter(|relative| !relative.is_empty())
                .is_some_and(|relative| matcher.matches(&relative.replace('\\', "/"), is_dir))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_matcher() {
        let gitignore = b"dist/**\n*.log\n.DS_Store\n!important.log\nbuild/\n/root_only";
        let matcher = IgnoreMatcher::new(gitignore);

        assert!(matcher.matches("dist/assets/index.js", false));
        assert!(matcher.matches("error.log", false));
        assert!(matcher.matches("src/error.log", false));
        assert!(matcher.matches(".DS_Store", false));
        assert!(!matcher.matches("important.log", false));

        assert!(matcher.matches("build", true));
        assert!(!matcher.matches("build", false));

        assert!(matcher.matches("root_only", false));
        assert!(!matcher.matches("src/root_only", false));

        assert!(!matcher.matches("src/app.tsx", false));
    }

    #[test]
    fn test_ignore_matcher_precedence() {
        let matcher = IgnoreMatcher::new(b"*.log\n!important.log\nimportant.log");
        assert!(matcher.matches("important.log", false));
    }

    #[test]
    fn test_ignore_matcher_comments_and_anchors() {
        let matcher = IgnoreMatcher::new(b"# comment\n*.tmp\n/TODO\ndocs/*.md");

        assert!(!matcher.matches("# comment", false));
        assert!(matcher.matches("dir/file.tmp", false));
        assert!(matcher.matches("TODO", false));
        assert!(!matcher.matches("src/TODO", false));
        assert!(matcher.matches("docs/intro.md", false));
        assert!(!matcher.matches("docs/other/intro.md", false));
    }

    #[test]
    fn test_layers_are_relative_to_their_base() {
        let root = tempfile::tempdir().unwrap();
        let app = root.path().join("exercises/01.intro/01.problem");
        fs::create_dir_all(&app).unwrap();
        fs::write(root.path().join(".gitignore"), "node_modules\n*.log\n").unwrap();
        fs::write(app.join(".gitignore"), "/generated\n").unwrap();

        let ignore = GitIgnore::load(&[root.path(), &app]).unwrap();

        assert!(ignore.is_ignored(&app.join("debug.log"), false));
        assert!(ignore.is_ignored(&app.join("node_modules"), true));
        assert!(ignore.is_ignored(&app.join("generated"), true));
        // Anchored to the app, not the root.
        assert!(!ignore.is_ignored(&root.path().join("generated"), true));
        assert!(!ignore.is_ignored(&app.join("src/index.tsx"), false));
        // The base itself is never ignored.
        assert!(!ignore.is_ignored(&app, true));
    }

    #[test]
    fn test_missing_gitignore_ignores_nothing() {
        let root = tempfile::tempdir().unwrap();
        let ignore = GitIgnore::load(&[root.path()]).unwrap();
        assert!(!ignore.is_ignored(&root.path().join("anything"), false));
    }
}
