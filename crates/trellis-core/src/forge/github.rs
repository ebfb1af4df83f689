//! GitHub forge provider over the REST API.
//!
//! Authentication is token-based: the caller resolves a token (usually
//! from `GITHUB_TOKEN`/`GH_TOKEN`) and hands it over as a [`SecretString`]
//! so it never shows up in debug output.

use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::types::{
    ChangeId, ChangeMetadata, ChangeState, ChangeTemplate, EditChangeOptions, FindChangeItem,
    FindChangesOptions, SubmitChangeRequest, SubmittedChange,
};
use super::{ForgeError, ForgeRepository};
use crate::cancel::Cancel;

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "trellis/forge-github";

/// Paths probed for a pull request template, in order of preference.
const TEMPLATE_PATHS: &[&str] = &[
    ".github/PULL_REQUEST_TEMPLATE.md",
    "PULL_REQUEST_TEMPLATE.md",
    "docs/PULL_REQUEST_TEMPLATE.md",
];

/// How long a single template probe may take. Templates are fetched
/// opportunistically while the user fills the submit form, so a slow
/// forge must not hold things up.
const TEMPLATE_TIMEOUT: Duration = Duration::from_secs(1);

/// GitHub implementation of [`ForgeRepository`].
pub struct GitHubForge {
    owner: String,
    repo: String,
    api_base_url: String,
    token: SecretString,
    http_client: reqwest::blocking::Client,
}

impl GitHubForge {
    /// Creates a provider for `owner/repo` against the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository identifier is malformed.
    pub fn new(repo: &str, token: SecretString) -> Result<Self, ForgeError> {
        Self::with_api_base_url(repo, token, "https://api.github.com")
    }

    /// Creates a provider with an explicit API base URL (GitHub
    /// Enterprise, test servers).
    ///
    /// # Errors
    ///
    /// Returns an error if the repository identifier or base URL is
    /// malformed.
    pub fn with_api_base_url(
        repo: &str,
        token: SecretString,
        api_base_url: impl Into<String>,
    ) -> Result<Self, ForgeError> {
        let (owner, name) = repo.split_once('/').ok_or_else(|| {
            ForgeError::Configuration(format!("repository must be owner/repo, got {repo:?}"))
        })?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(ForgeError::Configuration(format!(
                "repository must be owner/repo, got {repo:?}"
            )));
        }

        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(ForgeError::Configuration(
                "api_base_url must not be empty".to_string(),
            ));
        }

        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ForgeError::Transport(err.to_string()))?;

        Ok(Self {
            owner: owner.to_string(),
            repo: name.to_string(),
            api_base_url,
            token,
            http_client,
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), endpoint)
    }

    fn request(
        &self,
        cancel: &Cancel,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::blocking::Response, ForgeError> {
        cancel.bail()?;
        let mut builder = self
            .http_client
            .request(method, self.build_url(endpoint))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(self.token.expose_secret());

        if let Some(payload) = body {
            builder = builder.json(&payload);
        }

        builder.send().map_err(ForgeError::from)
    }

    fn parse_json_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(ForgeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<T>().map_err(ForgeError::from)
    }

    fn parse_empty_response(response: reqwest::blocking::Response) -> Result<(), ForgeError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            Err(ForgeError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn pull_number(id: &ChangeId) -> Result<u64, ForgeError> {
        id.0.parse().map_err(|_| {
            ForgeError::Parse(format!("GitHub change id must be a PR number, got {id}"))
        })
    }

    fn change_from_pull(pull: PullEntry) -> Result<FindChangeItem, ForgeError> {
        let head_hash = pull
            .head
            .sha
            .parse()
            .map_err(|_| ForgeError::Parse(format!("bad head sha {:?}", pull.head.sha)))?;
        Ok(FindChangeItem {
            id: ChangeId(pull.number.to_string()),
            url: pull.html_url,
            subject: pull.title,
            state: state_from_rest(&pull.state, pull.merged_at.as_deref()),
            head_hash,
            base_name: pull.base.branch,
            draft: pull.draft,
        })
    }
}

fn state_from_rest(state: &str, merged_at: Option<&str>) -> ChangeState {
    match (state, merged_at) {
        ("open", _) => ChangeState::Open,
        (_, Some(_)) => ChangeState::Merged,
        _ => ChangeState::Closed,
    }
}

#[derive(Debug, Deserialize)]
struct PullRef {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullEntry {
    number: u64,
    title: String,
    state: String,
    html_url: String,
    #[serde(default)]
    draft: bool,
    merged_at: Option<String>,
    head: PullRef,
    base: PullRef,
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    number: u64,
    html_url: String,
}

impl ForgeRepository for GitHubForge {
    fn forge_id(&self) -> &'static str {
        "github"
    }

    fn find_changes_by_branch(
        &self,
        cancel: &Cancel,
        branch: &str,
        opts: &FindChangesOptions,
    ) -> Result<Vec<FindChangeItem>, ForgeError> {
        // GitHub filters by head as "owner:branch".
        let mut endpoint = format!(
            "/repos/{}/{}/pulls?head={}:{branch}",
            self.owner, self.repo, self.owner,
        );
        if let Some(state) = opts.state {
            endpoint.push_str(&format!("&state={}", state.as_str()));
        }
        if let Some(limit) = opts.limit {
            endpoint.push_str(&format!("&per_page={limit}"));
        }

        let response = self.request(cancel, Method::GET, &endpoint, None)?;
        let pulls: Vec<PullEntry> = Self::parse_json_response(response)?;
        pulls.into_iter().map(Self::change_from_pull).collect()
    }

    fn find_change_by_id(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<FindChangeItem, ForgeError> {
        let number = Self::pull_number(id)?;
        let endpoint = format!("/repos/{}/{}/pulls/{number}", self.owner, self.repo);
        let response = self.request(cancel, Method::GET, &endpoint, None)?;
        let pull: PullEntry = Self::parse_json_response(response)?;
        Self::change_from_pull(pull)
    }

    fn submit_change(
        &self,
        cancel: &Cancel,
        req: &SubmitChangeRequest,
    ) -> Result<SubmittedChange, ForgeError> {
        let endpoint = format!("/repos/{}/{}/pulls", self.owner, self.repo);
        let response = self.request(
            cancel,
            Method::POST,
            &endpoint,
            Some(json!({
                "title": req.subject.as_str(),
                "body": req.body.as_str(),
                "head": req.head.as_str(),
                "base": req.base.as_str(),
                "draft": req.draft,
            })),
        )?;
        let created: CreatedPull = Self::parse_json_response(response)?;
        Ok(SubmittedChange {
            id: ChangeId(created.number.to_string()),
            url: created.html_url,
        })
    }

    fn edit_change(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
        opts: &EditChangeOptions,
    ) -> Result<(), ForgeError> {
        let number = Self::pull_number(id)?;
        let endpoint = format!("/repos/{}/{}/pulls/{number}", self.owner, self.repo);

        let mut payload = serde_json::Map::new();
        if let Some(base) = &opts.base {
            payload.insert("base".to_string(), json!(base));
        }
        if let Some(draft) = opts.draft {
            payload.insert("draft".to_string(), json!(draft));
        }
        if payload.is_empty() {
            return Ok(());
        }

        let response = self.request(
            cancel,
            Method::PATCH,
            &endpoint,
            Some(serde_json::Value::Object(payload)),
        )?;
        Self::parse_empty_response(response)
    }

    fn list_change_templates(&self, cancel: &Cancel) -> Result<Vec<ChangeTemplate>, ForgeError> {
        for path in TEMPLATE_PATHS {
            cancel.bail()?;
            let endpoint = format!("/repos/{}/{}/contents/{path}", self.owner, self.repo);
            let response = self
                .http_client
                .request(Method::GET, self.build_url(&endpoint))
                // Raw media type skips the base64 detour.
                .header("Accept", "application/vnd.github.raw")
                .header("User-Agent", USER_AGENT)
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
                .bearer_auth(self.token.expose_secret())
                .timeout(TEMPLATE_TIMEOUT)
                .send()
                .map_err(ForgeError::from)?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }
            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .unwrap_or_else(|_| "unable to read response body".to_string());
                return Err(ForgeError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            let body = response.text().map_err(ForgeError::from)?;
            return Ok(vec![ChangeTemplate {
                filename: (*path).to_string(),
                body,
            }]);
        }
        Ok(Vec::new())
    }

    fn new_change_metadata(
        &self,
        _cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<ChangeMetadata, ForgeError> {
        Ok(ChangeMetadata::GitHub {
            number: Self::pull_number(id)?,
        })
    }

    fn marshal_change_metadata(
        &self,
        meta: &ChangeMetadata,
    ) -> Result<serde_json::Value, ForgeError> {
        match meta {
            ChangeMetadata::GitHub { number } => Ok(json!({ "number": number })),
            ChangeMetadata::Unknown { data, .. } => Ok(data.clone()),
        }
    }

    fn unmarshal_change_metadata(
        &self,
        data: &serde_json::Value,
    ) -> Result<ChangeMetadata, ForgeError> {
        let number = data
            .get("number")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ForgeError::Parse(format!("not GitHub change metadata: {data}")))?;
        Ok(ChangeMetadata::GitHub { number })
    }
}
