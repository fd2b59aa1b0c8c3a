//! GitHub REST API access.
//!
//! [`GitHubApi`] is the seam between resolution logic and the network. Each
//! lookup answers with [`Lookup::Found`] or [`Lookup::NotFound`]; only genuine
//! failures (transport, auth, rate limit, malformed payloads) surface as
//! [`ClientError`]. Optional fields in GitHub's JSON are checked once, here,
//! when wire structs are converted into the public types.

use crate::cache::{CachedResponse, ResponseCache};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Number of tags fetched when falling back from releases.
pub const TAG_PAGE_SIZE: u8 = 10;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2022-11-28";

/// Hourly core limits GitHub grants with and without a token.
const AUTHENTICATED_LIMIT: u64 = 5000;
const UNAUTHENTICATED_LIMIT: u64 = 60;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("GitHub API rate limit exhausted (resets at {})", format_reset(*.reset))]
    RateLimited { reset: i64 },

    #[error("GitHub API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Incomplete { url: String, reason: &'static str },

    #[error("invalid API URL '{0}'")]
    InvalidUrl(String),
}

impl ClientError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                url: err.url().map(Url::to_string).unwrap_or_default(),
            }
        } else {
            ClientError::Transport(err)
        }
    }

    /// Whether the caller's deadline expired before the request completed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/// Outcome of a lookup that completed without a transport or API error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tag,
    Tree,
    Blob,
    #[serde(other)]
    Other,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Other => "other",
        }
    }
}

/// The object a ref or annotated tag points at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitObject {
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
}

/// A ref name qualified by namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefPath<'a> {
    Tag(&'a str),
    Branch(&'a str),
}

impl RefPath<'_> {
    pub fn namespace(&self) -> &'static str {
        match self {
            RefPath::Tag(_) => "tags",
            RefPath::Branch(_) => "heads",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RefPath::Tag(name) | RefPath::Branch(name) => name,
        }
    }
}

impl std::fmt::Display for RefPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "refs/{}/{}", self.namespace(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub default_branch: Option<String>,
}

/// Core API rate-limit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp at which the window resets.
    pub reset: i64,
}

impl RateLimit {
    pub fn reset_local(&self) -> String {
        format_reset(self.reset)
    }

    pub fn tier(&self) -> Option<&'static str> {
        if self.limit >= AUTHENTICATED_LIMIT {
            Some("authenticated")
        } else if self.limit <= UNAUTHENTICATED_LIMIT {
            Some("unauthenticated")
        } else {
            None
        }
    }
}

fn format_reset(reset: i64) -> String {
    chrono::DateTime::from_timestamp(reset, 0)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S %Z").to_string())
        .unwrap_or_else(|| reset.to_string())
}

/// Remote operations needed to resolve and discover refs.
pub trait GitHubApi {
    /// Looks up a commit by full SHA, returning its canonical SHA.
    fn commit(&self, owner: &str, repo: &str, sha: &str) -> Result<Lookup<String>, ClientError>;

    /// Looks up a single ref (`refs/tags/<name>` or `refs/heads/<name>`).
    fn git_ref(
        &self,
        owner: &str,
        repo: &str,
        reference: RefPath<'_>,
    ) -> Result<Lookup<GitObject>, ClientError>;

    /// Fetches an annotated tag object and returns what it points at.
    fn tag_object(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Lookup<GitObject>, ClientError>;

    fn latest_release(&self, owner: &str, repo: &str) -> Result<Lookup<Release>, ClientError>;

    /// Lists tags newest first. A missing repository yields an empty list.
    fn list_tags(
        &self,
        owner: &str,
        repo: &str,
        per_page: u8,
    ) -> Result<Vec<TagSummary>, ClientError>;

    fn repository(&self, owner: &str, repo: &str) -> Result<Lookup<Repository>, ClientError>;
}

// Wire shapes. Every field GitHub may omit is optional here and nowhere else.

#[derive(Deserialize)]
struct WireObjectHolder {
    object: Option<GitObject>,
}

#[derive(Deserialize)]
struct WireCommit {
    sha: Option<String>,
}

#[derive(Deserialize)]
struct WireRelease {
    tag_name: Option<String>,
}

#[derive(Deserialize)]
struct WireTag {
    name: Option<String>,
    commit: Option<WireCommit>,
}

#[derive(Deserialize)]
struct WireRepository {
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct WireRateLimits {
    resources: WireResources,
}

#[derive(Deserialize)]
struct WireResources {
    core: RateLimit,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: Option<String>,
}

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Response cache location; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            cache_dir: ResponseCache::default_dir(),
        }
    }
}

/// Blocking GitHub client with optional ETag response cache.
pub struct HttpClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    cache: Option<ResponseCache>,
    rate_limit: Cell<Option<RateLimit>>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| ClientError::InvalidUrl(config.base_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("actlock/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Transport)?;

        let cache = config.cache_dir.and_then(|dir| match ResponseCache::open(&dir) {
            Ok(cache) => Some(cache),
            Err(err) => {
                debug!(error = %err, "response cache disabled");
                None
            }
        });

        let token = config.token.filter(|t| !t.trim().is_empty());

        Ok(Self {
            http,
            base_url,
            token,
            cache,
            rate_limit: Cell::new(None),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Rate-limit state from the most recent response, if any was received.
    pub fn last_rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit.get()
    }

    /// Queries the current core rate limit. Never served from cache.
    pub fn rate_limit(&self) -> Result<RateLimit, ClientError> {
        let url = self.endpoint(["rate_limit"])?;
        let body: WireRateLimits = match self.send(url.clone(), None)? {
            Response::Fresh { body, .. } => decode(&url, &body)?,
            Response::NotModified | Response::NotFound => {
                return Err(ClientError::Incomplete {
                    url: url.to_string(),
                    reason: "rate limit endpoint returned no data",
                });
            }
        };
        self.rate_limit.set(Some(body.resources.core));
        Ok(body.resources.core)
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_endpoint<'a>(
        &self,
        owner: &'a str,
        repo: &'a str,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ClientError> {
        self.endpoint(["repos", owner, repo].into_iter().chain(rest))
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Lookup<T>, ClientError> {
        let key = self
            .cache
            .as_ref()
            .map(|_| ResponseCache::key(url.as_str(), self.is_authenticated()));
        let cached = match (&self.cache, &key) {
            (Some(cache), Some(key)) => cache.get(key),
            _ => None,
        };

        match self.send(url.clone(), cached.as_ref().map(|c| c.etag.as_str()))? {
            Response::NotFound => Ok(Lookup::NotFound),
            Response::NotModified => match cached {
                Some(entry) => {
                    trace!(%url, "served from cache");
                    decode(&url, &entry.body).map(Lookup::Found)
                }
                None => Err(ClientError::Incomplete {
                    url: url.to_string(),
                    reason: "304 Not Modified without a cached response",
                }),
            },
            Response::Fresh { body, etag } => {
                let value = decode(&url, &body)?;
                if let (Some(cache), Some(key), Some(etag)) = (&self.cache, &key, etag) {
                    if let Err(err) = cache.put(key, &CachedResponse { etag, body }) {
                        debug!(error = %err, "failed to store cached response");
                    }
                }
                Ok(Lookup::Found(value))
            }
        }
    }

    fn send(&self, url: Url, etag: Option<&str>) -> Result<Response, ClientError> {
        debug!(%url, "GET");
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().map_err(ClientError::from_reqwest)?;
        let rate = rate_limit_from_headers(response.headers());
        if rate.is_some() {
            self.rate_limit.set(rate);
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Response::NotFound);
        }
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Response::NotModified);
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().map_err(ClientError::from_reqwest)?;

        if !status.is_success() {
            return Err(status_error(status, rate, &body));
        }
        Ok(Response::Fresh { body, etag })
    }
}

enum Response {
    Fresh { body: String, etag: Option<String> },
    NotModified,
    NotFound,
}

fn decode<T: DeserializeOwned>(url: &Url, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Extracts `x-ratelimit-*` headers, if all three are present.
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimit> {
    Some(RateLimit {
        limit: header_number(headers, "x-ratelimit-limit")?,
        remaining: header_number(headers, "x-ratelimit-remaining")?,
        reset: header_number(headers, "x-ratelimit-reset")?,
    })
}

/// Maps a non-success, non-404 status into a [`ClientError`].
pub fn status_error(status: StatusCode, rate: Option<RateLimit>, body: &str) -> ClientError {
    if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
        if let Some(rate) = rate.filter(|r| r.remaining == 0) {
            return ClientError::RateLimited { reset: rate.reset };
        }
    }
    let message = serde_json::from_str::<WireErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

impl GitHubApi for HttpClient {
    fn commit(&self, owner: &str, repo: &str, sha: &str) -> Result<Lookup<String>, ClientError> {
        let url = self.repo_endpoint(owner, repo, ["git", "commits", sha])?;
        let lookup: Lookup<WireCommit> = self.get_json(url.clone())?;
        match lookup {
            Lookup::NotFound => Ok(Lookup::NotFound),
            Lookup::Found(WireCommit { sha: Some(sha) }) => Ok(Lookup::Found(sha)),
            Lookup::Found(_) => Err(ClientError::Incomplete {
                url: url.to_string(),
                reason: "commit without sha",
            }),
        }
    }

    fn git_ref(
        &self,
        owner: &str,
        repo: &str,
        reference: RefPath<'_>,
    ) -> Result<Lookup<GitObject>, ClientError> {
        let url = self.repo_endpoint(
            owner,
            repo,
            ["git", "ref", reference.namespace()]
                .into_iter()
                .chain(reference.name().split('/')),
        )?;
        let lookup: Lookup<WireObjectHolder> = self.get_json(url.clone())?;
        object_of(lookup, &url)
    }

    fn tag_object(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Lookup<GitObject>, ClientError> {
        let url = self.repo_endpoint(owner, repo, ["git", "tags", sha])?;
        let lookup: Lookup<WireObjectHolder> = self.get_json(url.clone())?;
        object_of(lookup, &url)
    }

    fn latest_release(&self, owner: &str, repo: &str) -> Result<Lookup<Release>, ClientError> {
        let url = self.repo_endpoint(owner, repo, ["releases", "latest"])?;
        let lookup: Lookup<WireRelease> = self.get_json(url)?;
        Ok(match lookup {
            Lookup::Found(WireRelease {
                tag_name: Some(tag_name),
            }) if !tag_name.is_empty() => Lookup::Found(Release { tag_name }),
            _ => Lookup::NotFound,
        })
    }

    fn list_tags(
        &self,
        owner: &str,
        repo: &str,
        per_page: u8,
    ) -> Result<Vec<TagSummary>, ClientError> {
        let mut url = self.repo_endpoint(owner, repo, ["tags"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string());
        let lookup: Lookup<Vec<WireTag>> = self.get_json(url)?;
        let tags = lookup.found().unwrap_or_default();
        Ok(tags
            .into_iter()
            .filter_map(|tag| {
                Some(TagSummary {
                    name: tag.name?,
                    sha: tag.commit?.sha?,
                })
            })
            .collect())
    }

    fn repository(&self, owner: &str, repo: &str) -> Result<Lookup<Repository>, ClientError> {
        let url = self.repo_endpoint(owner, repo, std::iter::empty())?;
        let lookup: Lookup<WireRepository> = self.get_json(url)?;
        Ok(lookup.map(|wire| Repository {
            default_branch: wire.default_branch.filter(|b| !b.is_empty()),
        }))
    }
}

fn object_of(lookup: Lookup<WireObjectHolder>, url: &Url) -> Result<Lookup<GitObject>, ClientError> {
    match lookup {
        Lookup::NotFound => Ok(Lookup::NotFound),
        Lookup::Found(WireObjectHolder {
            object: Some(object),
        }) => Ok(Lookup::Found(object)),
        Lookup::Found(_) => Err(ClientError::Incomplete {
            url: url.to_string(),
            reason: "ref found but object is missing",
        }),
    }
}
