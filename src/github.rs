//! GitHub URL translation.
//!
//! Turns a `github.com/{owner}/{repo}/blob/{branch}/{path}` file URL into the
//! `raw.githubusercontent.com` URL that serves the file's bytes directly.
//! Already-raw URLs are accepted as-is; `tree` (directory) URLs and anything
//! else are rejected.  Pure string work, no network access.

use thiserror::Error;
use url::Url;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid GitHub URL: {0}")]
    InvalidFormat(String),
}

impl ParseError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

// ---------------------------------------------------------------------------
// Reference type
// ---------------------------------------------------------------------------

/// A single file inside a GitHub repository.
///
/// All four fields are non-empty; `path` names a file, never a directory
/// (directory URLs are rejected at parse time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubReference {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl GitHubReference {
    /// The raw-content URL serving this file's bytes without HTML wrapping.
    pub fn raw_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner, self.repo, self.branch, self.path,
        )
    }

    /// Base name of the file, used as the remote file name.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a GitHub file URL into a [`GitHubReference`].
///
/// Accepts the `https://github.com/{owner}/{repo}/blob/{branch}/{path...}`
/// form as well as an already-raw
/// `https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path...}` URL.
pub fn parse(input: &str) -> Result<GitHubReference, ParseError> {
    let url = Url::parse(input.trim())
        .map_err(|e| ParseError::invalid(format!("not a valid URL: {e}")))?;

    match url.host_str() {
        Some("github.com") | Some("www.github.com") => parse_blob_url(&url),
        Some("raw.githubusercontent.com") => parse_raw_url(&url),
        Some(other) => Err(ParseError::invalid(format!(
            "host {other:?} is not GitHub"
        ))),
        None => Err(ParseError::invalid("URL has no host")),
    }
}

/// Parse the `github.com/{owner}/{repo}/blob/{branch}/{path...}` form.
fn parse_blob_url(url: &Url) -> Result<GitHubReference, ParseError> {
    let segments = path_segments(url)?;

    // A file URL has at least owner/repo/blob/branch/file.
    if segments.len() < 5 {
        return Err(match segments.get(2).map(String::as_str) {
            Some("tree") => ParseError::invalid("directory URL, expected file URL"),
            Some("blob") => ParseError::invalid("blob URL is missing a file path"),
            _ => ParseError::invalid("missing /blob/ segment, expected a link to a single file"),
        });
    }

    match segments[2].as_str() {
        "blob" => {}
        "tree" => return Err(ParseError::invalid("directory URL, expected file URL")),
        other => {
            return Err(ParseError::invalid(format!(
                "expected /blob/ segment, found /{other}/"
            )))
        }
    }

    Ok(GitHubReference {
        owner: segments[0].clone(),
        repo: segments[1].clone(),
        branch: segments[3].clone(),
        path: segments[4..].join("/"),
    })
}

/// Parse the `raw.githubusercontent.com/{owner}/{repo}/{branch}/{path...}` form.
fn parse_raw_url(url: &Url) -> Result<GitHubReference, ParseError> {
    let segments = path_segments(url)?;

    if segments.len() < 4 {
        return Err(ParseError::invalid(
            "raw URL must name owner, repository, branch, and file path",
        ));
    }

    Ok(GitHubReference {
        owner: segments[0].clone(),
        repo: segments[1].clone(),
        branch: segments[2].clone(),
        path: segments[3..].join("/"),
    })
}

/// Split the URL path into segments, rejecting empty ones.
///
/// A trailing slash or a doubled slash produces an empty segment; both
/// indicate a malformed or directory URL rather than a file URL.
fn path_segments(url: &Url) -> Result<Vec<String>, ParseError> {
    let segments: Vec<String> = url
        .path_segments()
        .ok_or_else(|| ParseError::invalid("URL has no path"))?
        .map(|s| s.to_string())
        .collect();

    if segments.is_empty() {
        return Err(ParseError::invalid("URL has no path"));
    }
    if segments.iter().any(String::is_empty) {
        return Err(ParseError::invalid("URL contains an empty path segment"));
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ── Blob URL translation ────────────────────────────────────────────

    #[test]
    fn blob_url_translates_to_raw() {
        let r = parse("https://github.com/octocat/Hello-World/blob/master/README.md").unwrap();
        assert_eq!(r.owner, "octocat");
        assert_eq!(r.repo, "Hello-World");
        assert_eq!(r.branch, "master");
        assert_eq!(r.path, "README.md");
        assert_eq!(
            r.raw_url(),
            "https://raw.githubusercontent.com/octocat/Hello-World/master/README.md"
        );
    }

    #[test]
    fn nested_path_is_preserved() {
        let r = parse("https://github.com/acme/widgets/blob/main/src/deep/nested/mod.rs").unwrap();
        assert_eq!(r.path, "src/deep/nested/mod.rs");
        assert_eq!(
            r.raw_url(),
            "https://raw.githubusercontent.com/acme/widgets/main/src/deep/nested/mod.rs"
        );
        assert_eq!(r.file_name(), "mod.rs");
    }

    #[test]
    fn www_host_is_accepted() {
        let r = parse("https://www.github.com/acme/widgets/blob/main/a.txt").unwrap();
        assert_eq!(r.owner, "acme");
    }

    #[test]
    fn file_name_is_last_segment() {
        let r = parse("https://github.com/o/r/blob/b/dir/file.bin").unwrap();
        assert_eq!(r.file_name(), "file.bin");
    }

    // ── Raw URL passthrough ─────────────────────────────────────────────

    #[test]
    fn raw_url_is_accepted_directly() {
        let r = parse("https://raw.githubusercontent.com/octocat/Hello-World/master/README.md")
            .unwrap();
        assert_eq!(r.branch, "master");
        assert_eq!(
            r.raw_url(),
            "https://raw.githubusercontent.com/octocat/Hello-World/master/README.md"
        );
    }

    #[test]
    fn raw_url_without_file_path_is_rejected() {
        assert!(parse("https://raw.githubusercontent.com/octocat/Hello-World/master").is_err());
    }

    // ── Rejections ──────────────────────────────────────────────────────

    #[test]
    fn tree_url_is_rejected_as_directory() {
        let err = parse("https://github.com/octocat/Hello-World/tree/master").unwrap_err();
        let ParseError::InvalidFormat(msg) = err;
        assert!(msg.contains("directory URL, expected file URL"), "{msg}");
    }

    #[test]
    fn tree_url_with_subdir_is_rejected_as_directory() {
        let err = parse("https://github.com/octocat/Hello-World/tree/master/src").unwrap_err();
        let ParseError::InvalidFormat(msg) = err;
        assert!(msg.contains("directory URL, expected file URL"), "{msg}");
    }

    #[test]
    fn repo_root_url_is_rejected() {
        assert!(parse("https://github.com/octocat/Hello-World").is_err());
    }

    #[test]
    fn trailing_slash_empty_segment_is_rejected() {
        assert!(parse("https://github.com/octocat/Hello-World/blob/master/").is_err());
    }

    #[test]
    fn doubled_slash_empty_segment_is_rejected() {
        assert!(parse("https://github.com/octocat//blob/master/README.md").is_err());
    }

    #[test]
    fn non_github_host_is_rejected() {
        assert!(parse("https://gitlab.com/octocat/Hello-World/blob/master/README.md").is_err());
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(parse("not a url at all").is_err());
    }

    #[test]
    fn unknown_middle_segment_is_rejected() {
        assert!(parse("https://github.com/o/r/commits/master/README.md").is_err());
    }
}
