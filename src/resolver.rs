//! Resolution of textual refs into commit SHAs.
//!
//! A ref written in a workflow may be a full commit SHA, a tag (lightweight or
//! annotated) or a branch, and nothing in its text says which. [`Resolver::resolve`]
//! tries each interpretation in a fixed order:
//!
//! 1. **Commit**: only for 40-character hex refs, confirmed by a commit lookup
//! 2. **Tag**: `refs/tags/<ref>`, peeling annotated tags to their commit
//! 3. **Branch**: `refs/heads/<ref>`
//!
//! "Not found" at any step is expected and silently falls through. Any other
//! failure is logged and also falls through, so one flaky lookup does not
//! prevent a later strategy from succeeding. A ref or tag pointing at
//! something other than a commit fails its step rather than pinning the wrong
//! object.

use crate::github::{ClientError, GitHubApi, Lookup, ObjectKind, RefPath, TAG_PAGE_SIZE};
use crate::reference::is_full_sha;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("owner, repo and ref must not be empty")]
    InvalidInput,

    #[error("reference '{reference}' not found as a commit, tag or branch in {owner}/{repo}")]
    ReferenceNotFound {
        reference: String,
        owner: String,
        repo: String,
    },

    #[error("{path} in {owner}/{repo} points to a {kind}, expected a commit")]
    UnexpectedObject {
        owner: String,
        repo: String,
        path: String,
        kind: &'static str,
    },

    #[error("tag '{tag}' in {owner}/{repo} points to missing tag object {sha}")]
    MissingTagObject {
        owner: String,
        repo: String,
        tag: String,
        sha: String,
    },

    #[error("no release or tag found for {owner}/{repo}")]
    NoVersionFound { owner: String, repo: String },

    #[error("could not determine default branch for {owner}/{repo}")]
    NoDefaultBranch { owner: String, repo: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Result of a single resolution strategy.
#[derive(Debug)]
enum Step {
    Found(String),
    NotFound,
    Failed(ResolveError),
}

/// Newest published version of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestVersion {
    pub name: String,
    pub sha: String,
}

pub struct Resolver<'a, A: GitHubApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: GitHubApi + ?Sized> Resolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &'a A {
        self.api
    }

    /// Resolves `reference` in `owner/repo` to a commit SHA.
    pub fn resolve(&self, owner: &str, repo: &str, reference: &str) -> Result<String, ResolveError> {
        if owner.is_empty() || repo.is_empty() || reference.is_empty() {
            return Err(ResolveError::InvalidInput);
        }

        let strategies: [(&str, fn(&Self, &str, &str, &str) -> Step); 3] = [
            ("commit", Self::verify_commit),
            ("tag", Self::resolve_tag),
            ("branch", Self::resolve_branch),
        ];

        for (via, strategy) in strategies {
            match strategy(self, owner, repo, reference) {
                Step::Found(sha) => {
                    debug!(owner, repo, reference, via, %sha, "resolved ref");
                    return Ok(sha);
                }
                Step::NotFound => {}
                Step::Failed(err) => {
                    warn!(owner, repo, reference, via, error = %err, "lookup failed, trying next strategy");
                }
            }
        }

        Err(ResolveError::ReferenceNotFound {
            reference: reference.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn verify_commit(&self, owner: &str, repo: &str, reference: &str) -> Step {
        if !is_full_sha(reference) {
            return Step::NotFound;
        }
        match self.api.commit(owner, repo, reference) {
            Ok(Lookup::Found(_)) => Step::Found(reference.to_string()),
            Ok(Lookup::NotFound) => Step::NotFound,
            Err(err) => Step::Failed(err.into()),
        }
    }

    fn resolve_tag(&self, owner: &str, repo: &str, reference: &str) -> Step {
        let path = RefPath::Tag(reference);
        let target = match self.api.git_ref(owner, repo, path) {
            Ok(Lookup::Found(target)) => target,
            Ok(Lookup::NotFound) => return Step::NotFound,
            Err(err) => return Step::Failed(err.into()),
        };

        match target.kind {
            ObjectKind::Commit => Step::Found(target.sha),
            ObjectKind::Tag => self.peel_tag(owner, repo, reference, &target.sha),
            other => Step::Failed(unexpected(owner, repo, path.to_string(), other)),
        }
    }

    /// Follows an annotated tag object to the commit it tags.
    fn peel_tag(&self, owner: &str, repo: &str, tag: &str, tag_sha: &str) -> Step {
        match self.api.tag_object(owner, repo, tag_sha) {
            Ok(Lookup::Found(target)) if target.kind == ObjectKind::Commit => {
                Step::Found(target.sha)
            }
            Ok(Lookup::Found(target)) => Step::Failed(unexpected(
                owner,
                repo,
                format!("annotated tag '{tag}'"),
                target.kind,
            )),
            Ok(Lookup::NotFound) => Step::Failed(ResolveError::MissingTagObject {
                owner: owner.to_string(),
                repo: repo.to_string(),
                tag: tag.to_string(),
                sha: tag_sha.to_string(),
            }),
            Err(err) => Step::Failed(err.into()),
        }
    }

    fn resolve_branch(&self, owner: &str, repo: &str, reference: &str) -> Step {
        let path = RefPath::Branch(reference);
        match self.api.git_ref(owner, repo, path) {
            Ok(Lookup::Found(target)) if target.kind == ObjectKind::Commit => {
                Step::Found(target.sha)
            }
            Ok(Lookup::Found(target)) => {
                Step::Failed(unexpected(owner, repo, path.to_string(), target.kind))
            }
            Ok(Lookup::NotFound) => Step::NotFound,
            Err(err) => Step::Failed(err.into()),
        }
    }

    /// Finds the newest published version of `owner/repo`.
    ///
    /// Prefers the release GitHub marks as latest, resolving its tag through
    /// [`Resolver::resolve`]. Falls back to the first entry of the tag list,
    /// which GitHub returns newest first, using its commit directly.
    ///
    /// The "latest release" flag is set by maintainers and need not be the
    /// highest version number; whatever it names is returned as-is.
    pub fn discover_latest(&self, owner: &str, repo: &str) -> Result<LatestVersion, ResolveError> {
        if owner.is_empty() || repo.is_empty() {
            return Err(ResolveError::InvalidInput);
        }

        match self.api.latest_release(owner, repo) {
            Ok(Lookup::Found(release)) => match self.resolve(owner, repo, &release.tag_name) {
                Ok(sha) => {
                    info!(owner, repo, tag = %release.tag_name, "found latest release");
                    return Ok(LatestVersion {
                        name: release.tag_name,
                        sha,
                    });
                }
                Err(err) => {
                    warn!(owner, repo, tag = %release.tag_name, error = %err, "latest release tag did not resolve, falling back to tags");
                }
            },
            Ok(Lookup::NotFound) => debug!(owner, repo, "no published release"),
            Err(err) => warn!(owner, repo, error = %err, "failed to read latest release, falling back to tags"),
        }

        let tags = self.api.list_tags(owner, repo, TAG_PAGE_SIZE)?;
        tags.into_iter()
            .next()
            .map(|tag| LatestVersion {
                name: tag.name,
                sha: tag.sha,
            })
            .ok_or_else(|| ResolveError::NoVersionFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
    }
}

fn unexpected(owner: &str, repo: &str, path: String, kind: ObjectKind) -> ResolveError {
    ResolveError::UnexpectedObject {
        owner: owner.to_string(),
        repo: repo.to_string(),
        path,
        kind: kind.as_str(),
    }
}
