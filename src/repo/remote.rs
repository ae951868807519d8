use std::fmt;

use super::RepoError;

const GITHUB_HOST: &str = "github.com";

/// Owner/name pair identifying a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse a git remote URL into a [`RepoSlug`].
///
/// Accepts scp-like SSH (`git@github.com:owner/repo.git`), `ssh://` and
/// `https://` forms. Only github.com remotes are supported.
pub fn parse_github_remote(url: &str) -> Result<RepoSlug, RepoError> {
    let unsupported = || RepoError::UnsupportedRemote {
        url: url.to_string(),
    };

    let trimmed = url.trim();
    let (host, path) = if let Some(rest) = trimmed.strip_prefix("git@") {
        // scp-like syntax: git@host:owner/repo.git
        rest.split_once(':').ok_or_else(unsupported)?
    } else {
        let parsed = reqwest::Url::parse(trimmed).map_err(|_| unsupported())?;
        if !matches!(parsed.scheme(), "https" | "http" | "ssh" | "git") {
            return Err(unsupported());
        }
        let host = parsed.host_str().ok_or_else(unsupported)?;
        if host != GITHUB_HOST {
            return Err(unsupported());
        }
        return slug_from_path(parsed.path()).ok_or_else(unsupported);
    };

    if host != GITHUB_HOST {
        return Err(unsupported());
    }
    slug_from_path(path).ok_or_else(unsupported)
}

fn slug_from_path(path: &str) -> Option<RepoSlug> {
    let mut segments = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(RepoSlug {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scp_like_ssh_remote() {
        let slug = parse_github_remote("git@github.com:octo/cat.git").unwrap();
        assert_eq!(slug.owner, "octo");
        assert_eq!(slug.name, "cat");
    }

    #[test]
    fn test_parse_https_remote() {
        let slug = parse_github_remote("https://github.com/owner/repo.git").unwrap();
        assert_eq!(slug.to_string(), "owner/repo");

        let slug = parse_github_remote("https://github.com/owner/repo").unwrap();
        assert_eq!(slug.name, "repo");
    }

    #[test]
    fn test_parse_ssh_scheme_remote() {
        let slug = parse_github_remote("ssh://git@github.com/owner/repo.git").unwrap();
        assert_eq!(slug.to_string(), "owner/repo");
    }

    #[test]
    fn test_rejects_other_hosts_and_malformed_urls() {
        assert!(matches!(
            parse_github_remote("git@gitlab.com:owner/repo.git"),
            Err(RepoError::UnsupportedRemote { .. })
        ));
        assert!(parse_github_remote("https://example.com/owner/repo").is_err());
        assert!(parse_github_remote("https://github.com/owner").is_err());
        assert!(parse_github_remote("not a url").is_err());
    }
}
