use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Invalid scope '{scope}': {reason}")]
    InvalidScope { scope: String, reason: String },
}

/// Restricts a collection to the files under one repository directory.
///
/// Directory scopes are stored normalised: forward slashes, no `.` segments,
/// no leading or trailing separator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DirectoryScope {
    #[default]
    WholeRepository,
    Directory(String),
}

impl DirectoryScope {
    /// Interpret a user-supplied `--dir` value.
    ///
    /// `None`, empty strings and `.` select the whole repository. Absolute
    /// paths are accepted only when they point inside `repo_root`, and are
    /// rewritten relative to it. Any `..` that would climb above the
    /// repository root is rejected.
    pub fn parse(raw: Option<&str>, repo_root: Option<&Path>) -> Result<Self, ScopeError> {
        let Some(raw) = raw else {
            return Ok(Self::WholeRepository);
        };

        let invalid = |reason: &str| ScopeError::InvalidScope {
            scope: raw.to_string(),
            reason: reason.to_string(),
        };

        let unified = raw.trim().replace('\\', "/");
        let path = Path::new(&unified);

        let relative = if path.has_root() {
            let root = repo_root.ok_or_else(|| invalid("absolute paths need a repository root"))?;
            path.strip_prefix(root)
                .map_err(|_| invalid("path is outside the repository"))?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };

        let mut segments: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| invalid("path is not valid UTF-8"))?;
                    segments.push(part.to_string());
                }
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(invalid("path escapes the repository root"));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("path must be relative to the repository root"));
                }
            }
        }

        if segments.is_empty() {
            Ok(Self::WholeRepository)
        } else {
            Ok(Self::Directory(segments.join("/")))
        }
    }

    /// True when `path` is the scope directory itself or nested under it.
    pub fn contains(&self, path: &str) -> bool {
        match self {
            Self::WholeRepository => true,
            Self::Directory(dir) => match path.strip_prefix(dir.as_str()) {
                Some("") => true,
                Some(rest) => rest.starts_with('/'),
                None => false,
            },
        }
    }

    pub fn directory(&self) -> Option<&str> {
        match self {
            Self::WholeRepository => None,
            Self::Directory(dir) => Some(dir),
        }
    }
}

impl fmt::Display for DirectoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WholeRepository => write!(f, "whole repository"),
            Self::Directory(dir) => write!(f, "{}", dir),
        }
    }
}
