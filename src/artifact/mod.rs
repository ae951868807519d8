pub mod types;

pub use types::{artifact_filename, CollectionResult};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::pr::PullRequestRecord;
use crate::scope::DirectoryScope;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render a resolved PR into its filename and markdown document.
///
/// The whole-repository scope keeps the diff byte-for-byte; a directory scope
/// keeps only the changed files and file patches under that directory, in
/// their original order. Identical inputs always give identical output.
#[instrument(skip(record), fields(pr = record.number, scope = %scope))]
pub fn compose(record: &PullRequestRecord, scope: &DirectoryScope) -> CollectionResult {
    let included_files: Vec<String> = record
        .changed_files
        .iter()
        .filter(|path| scope.contains(path))
        .cloned()
        .collect();

    let diff_body = match scope {
        DirectoryScope::WholeRepository => record.diff.clone(),
        DirectoryScope::Directory(_) => record
            .patches
            .iter()
            .filter(|patch| scope.contains(&patch.path))
            .map(|patch| patch.text.as_str())
            .collect(),
    };
    debug!(files = included_files.len(), diff_bytes = diff_body.len(), "scoped record");

    let body = render_markdown(record, scope, &included_files, &diff_body);
    CollectionResult {
        filename: artifact_filename(record.number, &record.title),
        body,
        included_files,
    }
}

fn render_markdown(
    record: &PullRequestRecord,
    scope: &DirectoryScope,
    files: &[String],
    diff_body: &str,
) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", record.title));

    md.push_str("## Metadata\n\n");
    md.push_str(&format!("- Number: {}\n", record.number));
    md.push_str(&format!("- Title: {}\n", record.title));
    md.push_str(&format!("- Author: {}\n", record.author));
    if let Some(state) = &record.state {
        md.push_str(&format!("- State: {}\n", state));
    }
    md.push_str(&format!("- Base: {}\n", record.base_branch));
    md.push_str(&format!("- Head: {}\n", record.head_branch));
    if let Some(url) = &record.url {
        md.push_str(&format!("- URL: {}\n", url));
    }
    if let Some(created) = &record.created_at {
        md.push_str(&format!("- Created: {}\n", created));
    }
    if let Some(updated) = &record.updated_at {
        md.push_str(&format!("- Updated: {}\n", updated));
    }
    match scope.directory() {
        Some(dir) => {
            md.push_str(&format!("- Scope: `{}`\n", dir));
        }
        None => md.push_str("- Scope: whole repository\n"),
    }
    md.push('\n');

    md.push_str("## Description\n\n");
    if record.description.trim().is_empty() {
        md.push_str("_No description provided._\n\n");
    } else {
        md.push_str(record.description.trim_end());
        md.push_str("\n\n");
    }

    md.push_str(&format!("## Changed Files ({})\n\n", files.len()));
    if files.is_empty() {
        md.push_str(&format!("{}\n\n", empty_notice(scope)));
    } else {
        for path in files {
            match record.patch_for(path) {
                Some(patch) => match &patch.previous_path {
                    Some(from) => md.push_str(&format!(
                        "- `{}` (renamed from `{}`, +{} -{})\n",
                        path, from, patch.additions, patch.deletions
                    )),
                    None => md.push_str(&format!(
                        "- `{}` ({}, +{} -{})\n",
                        path, patch.change, patch.additions, patch.deletions
                    )),
                },
                None => {
                    md.push_str(&format!("- `{}`\n", path));
                }
            }
        }
        md.push('\n');
    }

    md.push_str("## Diff\n\n");
    if diff_body.trim().is_empty() {
        md.push_str(&format!("{}\n", empty_notice(scope)));
    } else {
        let fence = "`".repeat(longest_backtick_run(diff_body).max(2) + 1);
        md.push_str(&format!("{}diff\n", fence));
        md.push_str(diff_body);
        if !diff_body.ends_with('\n') {
            md.push('\n');
        }
        md.push_str(&format!("{}\n", fence));
    }
    md
}

fn empty_notice(scope: &DirectoryScope) -> String {
    match scope.directory() {
        Some(dir) => format!("_No changes fall under `{}`._", dir),
        None => "_No files changed._".to_string(),
    }
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Where the artifact lands: `output` itself, or `output/<filename>` when
/// `output` is a directory (existing, or spelled with a trailing separator).
pub fn output_path(output: &Path, filename: &str) -> PathBuf {
    let text = output.to_string_lossy();
    if output.is_dir() || text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        output.join(filename)
    } else {
        output.to_path_buf()
    }
}

/// Write the document, creating parent directories. Re-running overwrites.
#[instrument(skip(result), fields(filename = %result.filename))]
pub fn write(result: &CollectionResult, output: &Path) -> Result<PathBuf, ArtifactError> {
    let path = output_path(output, &result.filename);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ArtifactError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, &result.body).map_err(|source| ArtifactError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), bytes = result.body.len(), "wrote artifact");
    Ok(path)
}
