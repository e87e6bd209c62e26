//! Loads the retrieval corpus from the filesystem.
//!
//! Walks `corpus.root`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus the built-in `.git`, `target` and
//! `node_modules` excludes), and turns each UTF-8 file into one
//! [`Passage`]. Passages are sorted by relative path.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use agentic_rag_core::index::{InMemoryCorpus, Passage};

use crate::config::CorpusConfig;

/// Load the configured corpus. No root means an empty corpus.
pub fn load_corpus(config: &CorpusConfig) -> Result<InMemoryCorpus> {
    let Some(root) = config.root.as_ref() else {
        tracing::info!("no corpus root configured, starting with an empty corpus");
        return Ok(InMemoryCorpus::default());
    };
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut passages = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        if let Some(passage) = file_to_passage(path, &rel_str) {
            passages.push(passage);
        }
    }

    passages.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(root = %root.display(), passages = passages.len(), "corpus loaded");

    Ok(InMemoryCorpus::new(passages))
}

fn file_to_passage(path: &Path, relative_path: &str) -> Option<Passage> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };
    if body.trim().is_empty() {
        return None;
    }

    let title = markdown_title(&body).unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative_path.to_string())
    });

    Some(Passage::new(relative_path, relative_path, body).with_title(title))
}

/// First `# Heading` line of a markdown document.
fn markdown_title(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
