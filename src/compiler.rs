//! Instruction compiler.
//!
//! The engine only needs `compile(path) -> {code, title, embeds}`; anything
//! that can turn an `.mdx` file into that shape can stand in via
//! [`InstructionsCompiler`]. [`MarkdownCompiler`] is the built-in one: it
//! does not evaluate JSX, it extracts what the catalog needs and hands the
//! body through as code.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::{fs, path::Path, sync::LazyLock};

/// Result of compiling one instructions file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledMdx {
    pub code: String,
    pub title: Option<String>,
    pub epic_video_embeds: Vec<String>,
}

/// Compiles instructions files. Called from blocking worker threads.
pub trait InstructionsCompiler: Send + Sync {
    fn compile(&self, path: &Path) -> Result<CompiledMdx>;
}

static EPIC_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<EpicVideo\s+[^>]*url=["']([^"']+)["']"#).expect("embed pattern is valid")
});

/// Front-matter + heading based compiler for `.md`/`.mdx` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownCompiler;

impl InstructionsCompiler for MarkdownCompiler {
    fn compile(&self, path: &Path) -> Result<CompiledMdx> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(compile_source(&source))
    }
}

fn compile_source(source: &str) -> CompiledMdx {
    let (front_matter, body) = split_front_matter(source);

    let title = front_matter
        .and_then(front_matter_title)
        .or_else(|| first_heading(body));

    let epic_video_embeds = EPIC_VIDEO
        .captures_iter(body)
        .map(|caps| caps[1].to_owned())
        .collect();

    CompiledMdx {
        code: body.trim_start().to_owned(),
        title,
        epic_video_embeds,
    }
}

/// Split a leading `---` block off the source.
fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    else {
        return (None, source);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    // Unterminated block: treat everything as body.
    (None, source)
}

fn front_matter_title(front_matter: &str) -> Option<String> {
    front_matter.lines().find_map(|line| {
        let value = line.strip_prefix("title:")?.trim();
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_owned())
    })
}

fn first_heading(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let heading = line.strip_prefix("# ")?.trim();
        (!heading.is_empty()).then(|| heading.to_owned())
    })
}
