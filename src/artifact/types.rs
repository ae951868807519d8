/// Rendered output of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionResult {
    /// Filesystem-safe name, stable for a given PR number and title
    pub filename: String,
    /// Markdown document
    pub body: String,
    /// Changed files that made it into the document after scoping
    pub included_files: Vec<String>,
}

/// Upper bound on the title part of a filename.
pub const MAX_TITLE_LEN: usize = 80;

/// Lower-case the title and collapse every run of characters outside
/// `[a-z0-9]` into a single `-`, trimmed at both ends and bounded by
/// [`MAX_TITLE_LEN`].
pub fn normalize_title(title: &str) -> String {
    let mut normalized = String::with_capacity(title.len());
    let mut pending_separator = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('-');
            }
            pending_separator = false;
            normalized.push(c);
        } else {
            pending_separator = true;
        }
    }
    // Only ASCII is ever pushed, so byte truncation is char-safe.
    normalized.truncate(MAX_TITLE_LEN);
    normalized.trim_end_matches('-').to_string()
}

/// `{number}-{normalized title}.md`, or `{number}.md` when nothing survives
/// normalisation.
pub fn artifact_filename(number: u64, title: &str) -> String {
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        format!("{}.md", number)
    } else {
        format!("{}-{}.md", number, normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Fix Login Bug!!"), "fix-login-bug");
        assert_eq!(normalize_title("  --Hello,   World--  "), "hello-world");
        assert_eq!(normalize_title("feat(api): v2 / batch"), "feat-api-v2-batch");
        assert_eq!(normalize_title("Ünïcödé"), "n-c-d");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn test_normalize_title_is_bounded() {
        let long = "word ".repeat(50);
        let normalized = normalize_title(&long);
        assert!(normalized.len() <= MAX_TITLE_LEN);
        assert!(!normalized.ends_with('-'));
        assert!(normalized.starts_with("word-word"));
    }

    #[test]
    fn test_artifact_filename() {
        assert_eq!(artifact_filename(42, "Fix Login Bug!!"), "42-fix-login-bug.md");
        assert_eq!(artifact_filename(7, "???"), "7.md");
    }

    #[test]
    fn test_same_title_different_numbers_do_not_collide() {
        assert_ne!(artifact_filename(1, "Update deps"), artifact_filename(2, "Update deps"));
    }

    #[test]
    fn test_filename_has_no_reserved_characters() {
        let name = artifact_filename(3, r#"a/b\c:d*e?f"g<h>i|j"#);
        assert_eq!(name, "3-a-b-c-d-e-f-g-h-i-j.md");
    }
}
