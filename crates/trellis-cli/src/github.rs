//! GitHub remote detection and token resolution.

use secrecy::SecretString;

/// Extracts `owner/repo` from a GitHub remote URL.
///
/// Understands the common fetch URL shapes:
/// `git@github.com:owner/repo.git`, `ssh://git@github.com/owner/repo.git`,
/// and `https://github.com/owner/repo`.
pub fn parse_github_repo(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

/// Resolves a GitHub token from the environment: `GITHUB_TOKEN` first,
/// then `GH_TOKEN`.
pub fn resolve_token() -> Option<SecretString> {
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Some(SecretString::new(value));
            }
        }
    }
    None
}
