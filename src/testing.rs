//! In-memory [`GitHubApi`] used by unit tests.
//!
//! Requests are recorded as short signatures (`"ref actions/checkout
//! refs/tags/v4"`) so tests can assert exactly which lookups happened.

use crate::github::{
    ClientError, GitHubApi, GitObject, Lookup, ObjectKind, RefPath, Release, Repository,
    TagSummary,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Status(u16),
    Timeout,
    RateLimited,
}

impl Failure {
    fn error(self) -> ClientError {
        match self {
            Failure::Status(status) => ClientError::Status {
                status,
                message: "injected".to_string(),
            },
            Failure::Timeout => ClientError::Timeout {
                url: "fake://".to_string(),
            },
            Failure::RateLimited => ClientError::RateLimited { reset: 0 },
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    commits: HashSet<(String, String)>,
    refs: HashMap<(String, String), GitObject>,
    tag_objects: HashMap<(String, String), GitObject>,
    releases: HashMap<String, String>,
    tag_lists: HashMap<String, Vec<TagSummary>>,
    repos: HashMap<String, Repository>,
    failures: HashMap<String, Failure>,
    calls: RefCell<Vec<String>>,
}

fn object(sha: &str, kind: ObjectKind) -> GitObject {
    GitObject {
        sha: sha.to_string(),
        kind,
    }
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_commit(mut self, repo: &str, sha: &str) -> Self {
        self.commits.insert((repo.to_string(), sha.to_string()));
        self
    }

    pub(crate) fn with_ref(mut self, repo: &str, path: &str, target: GitObject) -> Self {
        self.refs
            .insert((repo.to_string(), path.to_string()), target);
        self
    }

    pub(crate) fn with_lightweight_tag(self, repo: &str, name: &str, sha: &str) -> Self {
        self.with_ref(repo, &format!("refs/tags/{name}"), object(sha, ObjectKind::Commit))
    }

    pub(crate) fn with_annotated_tag(
        mut self,
        repo: &str,
        name: &str,
        tag_sha: &str,
        target: GitObject,
    ) -> Self {
        self.tag_objects
            .insert((repo.to_string(), tag_sha.to_string()), target);
        self.with_ref(repo, &format!("refs/tags/{name}"), object(tag_sha, ObjectKind::Tag))
    }

    pub(crate) fn with_branch(self, repo: &str, name: &str, sha: &str) -> Self {
        self.with_ref(repo, &format!("refs/heads/{name}"), object(sha, ObjectKind::Commit))
    }

    pub(crate) fn with_release(mut self, repo: &str, tag: &str) -> Self {
        self.releases.insert(repo.to_string(), tag.to_string());
        self
    }

    pub(crate) fn with_tags(mut self, repo: &str, tags: &[(&str, &str)]) -> Self {
        self.tag_lists.insert(
            repo.to_string(),
            tags.iter()
                .map(|(name, sha)| TagSummary {
                    name: name.to_string(),
                    sha: sha.to_string(),
                })
                .collect(),
        );
        self
    }

    pub(crate) fn with_default_branch(mut self, repo: &str, branch: Option<&str>) -> Self {
        self.repos.insert(
            repo.to_string(),
            Repository {
                default_branch: branch.map(str::to_string),
            },
        );
        self
    }

    /// Makes the request with this signature fail.
    pub(crate) fn failing(mut self, signature: &str, failure: Failure) -> Self {
        self.failures.insert(signature.to_string(), failure);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, signature: String) -> Result<(), ClientError> {
        let failure = self.failures.get(&signature).copied();
        self.calls.borrow_mut().push(signature);
        match failure {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }
}

fn key(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

fn lookup<T: Clone>(value: Option<&T>) -> Lookup<T> {
    match value {
        Some(value) => Lookup::Found(value.clone()),
        None => Lookup::NotFound,
    }
}

impl GitHubApi for FakeApi {
    fn commit(&self, owner: &str, repo: &str, sha: &str) -> Result<Lookup<String>, ClientError> {
        let repo = key(owner, repo);
        self.record(format!("commit {repo} {sha}"))?;
        if self.commits.contains(&(repo, sha.to_string())) {
            Ok(Lookup::Found(sha.to_string()))
        } else {
            Ok(Lookup::NotFound)
        }
    }

    fn git_ref(
        &self,
        owner: &str,
        repo: &str,
        reference: RefPath<'_>,
    ) -> Result<Lookup<GitObject>, ClientError> {
        let repo = key(owner, repo);
        let path = reference.to_string();
        self.record(format!("ref {repo} {path}"))?;
        Ok(lookup(self.refs.get(&(repo, path))))
    }

    fn tag_object(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Lookup<GitObject>, ClientError> {
        let repo = key(owner, repo);
        self.record(format!("tag {repo} {sha}"))?;
        Ok(lookup(self.tag_objects.get(&(repo, sha.to_string()))))
    }

    fn latest_release(&self, owner: &str, repo: &str) -> Result<Lookup<Release>, ClientError> {
        let repo = key(owner, repo);
        self.record(format!("release {repo}"))?;
        Ok(lookup(self.releases.get(&repo)).map(|tag_name| Release { tag_name }))
    }

    fn list_tags(
        &self,
        owner: &str,
        repo: &str,
        per_page: u8,
    ) -> Result<Vec<TagSummary>, ClientError> {
        let repo = key(owner, repo);
        self.record(format!("tags {repo}"))?;
        Ok(self
            .tag_lists
            .get(&repo)
            .map(|tags| tags.iter().take(per_page as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn repository(&self, owner: &str, repo: &str) -> Result<Lookup<Repository>, ClientError> {
        let repo = key(owner, repo);
        self.record(format!("repo {repo}"))?;
        Ok(lookup(self.repos.get(&repo)))
    }
}
