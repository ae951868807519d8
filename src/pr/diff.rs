use super::types::{ChangeKind, FilePatch};
use super::PrError;

/// Split a unified diff into per-file patches.
///
/// Each file section starts with:
///   diff --git a/{path} b/{path}
///
/// New files have `--- /dev/null` (or `new file mode`), deleted files have
/// `+++ /dev/null` (or `deleted file mode`), renames carry `rename from` /
/// `rename to` lines. Paths with special characters arrive C-quoted
/// (`"b/caf\303\251.md"`) and are decoded.
///
/// Hunks start with: @@ -{old_start},{old_count} +{new_start},{new_count} @@
///
/// The counts in the hunk header decide where a hunk ends, so body lines
/// such as `--- foo` are never mistaken for file headers. Every byte of a
/// section is kept in [`FilePatch::text`].
pub fn parse_diff(raw_diff: &str) -> Result<Vec<FilePatch>, PrError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut current: Option<PatchBuilder> = None;
    // Lines still expected in the open hunk: (old side, new side).
    let mut remaining: Option<(usize, usize)> = None;

    for raw_line in raw_diff.split_inclusive('\n') {
        let line = raw_line.trim_end_matches(|c: char| c == '\n' || c == '\r');

        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                files.push(done.finish());
            }
            remaining = None;
            let mut builder = PatchBuilder::from_header(rest)?;
            builder.text.push_str(raw_line);
            current = Some(builder);
            continue;
        }

        let Some(file) = current.as_mut() else {
            // Preamble before the first file section carries no changes.
            continue;
        };
        file.text.push_str(raw_line);

        if let Some((old_left, new_left)) = remaining.as_mut() {
            match line.chars().next() {
                Some('+') => *new_left = new_left.saturating_sub(1),
                Some('-') => *old_left = old_left.saturating_sub(1),
                Some(' ') | None => {
                    *old_left = old_left.saturating_sub(1);
                    *new_left = new_left.saturating_sub(1);
                }
                // "\ No newline at end of file"
                Some('\\') => {}
                Some(_) => {
                    return Err(PrError::IncompleteRecord {
                        reason: format!("malformed diff line in {}: {}", file.path, line),
                    })
                }
            }
            match line.chars().next() {
                Some('+') => file.additions += 1,
                Some('-') => file.deletions += 1,
                _ => {}
            }
            if *old_left == 0 && *new_left == 0 {
                remaining = None;
            }
            continue;
        }

        if line.starts_with("@@") {
            let (old_count, new_count) = parse_hunk_header(line)?;
            if old_count > 0 || new_count > 0 {
                remaining = Some((old_count, new_count));
            }
        } else if let Some(path) = line.strip_prefix("--- ") {
            if path.trim() == "/dev/null" {
                file.is_new = true;
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            let path = unquote_path(path.trim_end()).ok_or_else(|| malformed_path(line))?;
            if path == "/dev/null" {
                file.is_deleted = true;
            } else if let Some(path) = path.strip_prefix("b/") {
                file.path = path.to_string();
            }
        } else if line.starts_with("new file mode") {
            file.is_new = true;
        } else if line.starts_with("deleted file mode") {
            file.is_deleted = true;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            file.previous_path = Some(unquote_path(from).ok_or_else(|| malformed_path(line))?);
        } else if let Some(to) = line.strip_prefix("rename to ") {
            file.path = unquote_path(to).ok_or_else(|| malformed_path(line))?;
            file.is_renamed = true;
        }
    }

    if let Some(done) = current.take() {
        files.push(done.finish());
    }
    Ok(files)
}

/// Ordered, de-duplicated paths of a patch list.
pub fn changed_paths(patches: &[FilePatch]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::with_capacity(patches.len());
    for patch in patches {
        if !paths.contains(&patch.path) {
            paths.push(patch.path.clone());
        }
    }
    paths
}

struct PatchBuilder {
    path: String,
    previous_path: Option<String>,
    is_new: bool,
    is_deleted: bool,
    is_renamed: bool,
    additions: usize,
    deletions: usize,
    text: String,
}

impl PatchBuilder {
    fn from_header(rest: &str) -> Result<Self, PrError> {
        let (a_part, b_part) =
            split_header_paths(rest).ok_or_else(|| PrError::IncompleteRecord {
                reason: format!("malformed diff header: diff --git {}", rest),
            })?;
        let old_path = a_part.strip_prefix("a/").unwrap_or(&a_part);
        let new_path = b_part.strip_prefix("b/").unwrap_or(&b_part);
        Ok(PatchBuilder {
            path: new_path.to_string(),
            previous_path: Some(old_path.to_string()),
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            additions: 0,
            deletions: 0,
            text: String::new(),
        })
    }

    fn finish(self) -> FilePatch {
        let change = if self.is_new {
            ChangeKind::Added
        } else if self.is_deleted {
            ChangeKind::Deleted
        } else if self.is_renamed {
            ChangeKind::Renamed
        } else {
            ChangeKind::Modified
        };
        FilePatch {
            path: self.path,
            previous_path: self.previous_path.filter(|_| change == ChangeKind::Renamed),
            change,
            additions: self.additions,
            deletions: self.deletions,
            text: self.text,
        }
    }
}

/// The `a/...` and `b/...` operands of a `diff --git` header, unquoted.
fn split_header_paths(rest: &str) -> Option<(String, String)> {
    if rest.starts_with('"') {
        let (a_part, tail) = parse_quoted(rest)?;
        let b_raw = tail.strip_prefix(' ')?;
        return Some((a_part, unquote_path(b_raw)?));
    }
    if let Some(index) = rest.find(" \"b/") {
        let b_part = unquote_path(&rest[index + 1..])?;
        return Some((rest[..index].to_string(), b_part));
    }
    let (a_part, b_part) = rest.split_once(" b/")?;
    Some((a_part.to_string(), format!("b/{}", b_part)))
}

/// Decode a path that git may have C-quoted (`"caf\303\251.md"`);
/// unquoted paths come back unchanged.
fn unquote_path(raw: &str) -> Option<String> {
    if !raw.starts_with('"') {
        return Some(raw.to_string());
    }
    let (path, tail) = parse_quoted(raw)?;
    tail.is_empty().then_some(path)
}

/// Parse one quoted token at the start of `raw`, returning it and the rest.
fn parse_quoted(raw: &str) -> Option<(String, &str)> {
    let bytes = raw.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut decoded: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let path = String::from_utf8_lossy(&decoded).into_owned();
                return Some((path, &raw[i + 1..]));
            }
            b'\\' => {
                let escaped = *bytes.get(i + 1)?;
                i += 2;
                let byte = match escaped {
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b't' => b'\t',
                    b'n' => b'\n',
                    b'v' => 0x0b,
                    b'f' => 0x0c,
                    b'r' => b'\r',
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'0'..=b'7' => {
                        let digits = bytes.get(i - 1..i + 2)?;
                        if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                            return None;
                        }
                        i += 2;
                        digits
                            .iter()
                            .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'))
                            .try_into()
                            .ok()?
                    }
                    _ => return None,
                };
                decoded.push(byte);
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }
    None
}

fn malformed_path(line: &str) -> PrError {
    PrError::IncompleteRecord {
        reason: format!("malformed path in diff: {}", line),
    }
}

/// Old and new line counts of a hunk header.
fn parse_hunk_header(line: &str) -> Result<(usize, usize), PrError> {
    let malformed = || PrError::IncompleteRecord {
        reason: format!("invalid hunk header: {}", line),
    };
    let header = line.trim().strip_prefix("@@").ok_or_else(malformed)?.trim();
    // Anything after the closing "@@" is function context.
    let header = header.split("@@").next().ok_or_else(malformed)?.trim();
    let mut parts = header.split_whitespace();
    let old_part = parts.next().ok_or_else(malformed)?;
    let new_part = parts.next().ok_or_else(malformed)?;

    let old_count = range_count(old_part, '-').ok_or_else(malformed)?;
    let new_count = range_count(new_part, '+').ok_or_else(malformed)?;

    Ok((old_count, new_count))
}

/// Count of a `-start,count` / `+start` range; an omitted count means 1.
fn range_count(part: &str, prefix: char) -> Option<usize> {
    let range = part.strip_prefix(prefix)?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    start_str.parse::<usize>().ok()?;
    count_str.parse::<usize>().ok()
}
