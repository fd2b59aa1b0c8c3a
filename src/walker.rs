//! Planning of line edits for a workflow document.
//!
//! The walker visits every `uses:` site in document order, classifies it, and
//! asks the resolver for a commit SHA: the SHA behind the current ref in pin
//! mode, or the SHA of the newest version in update mode. Each successful
//! resolution becomes a replacement for the text after `uses:` on that line.
//!
//! A failure on one site is logged and skips only that site. The single
//! exception is a deadline expiring while looking up a repository's default
//! branch, which aborts the whole document.

use crate::github::{ClientError, GitHubApi, Lookup, Repository};
use crate::reference::{ActionReference, ReferenceKind, RefShape, classify};
use crate::resolver::{ResolveError, Resolver};
use crate::scanner::{Node, UsesSite, uses_sites};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Replace mutable refs with the SHA they currently denote.
    Pin,
    /// Move every reference to the SHA of its newest release or tag.
    Update,
}

/// How the trailing ref comment is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentStyle {
    /// Spaces between the SHA and the `#` marker.
    pub spaces: usize,
}

impl Default for CommentStyle {
    fn default() -> Self {
        Self { spaces: 1 }
    }
}

impl CommentStyle {
    /// `<path>@<sha><spaces>#<label>`
    pub fn render(&self, path: &str, sha: &str, label: &str) -> String {
        format!("{path}@{sha}{}#{label}", " ".repeat(self.spaces))
    }
}

/// Pending replacements keyed by 1-based line number.
///
/// The first replacement recorded for a line wins; YAML anchors and flow
/// collections can surface more than one `uses:` on the same line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEdits(BTreeMap<usize, String>);

impl LineEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `text` for `line` unless the line already has an edit.
    pub fn insert(&mut self, line: usize, text: String) -> bool {
        match self.0.entry(line) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(text);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.0.contains_key(&line)
    }

    pub fn get(&self, line: usize) -> Option<&str> {
        self.0.get(&line).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(usize, String)> for LineEdits {
    fn from_iter<I: IntoIterator<Item = (usize, String)>>(iter: I) -> Self {
        let mut edits = LineEdits::new();
        for (line, text) in iter {
            edits.insert(line, text);
        }
        edits
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("lookup for line {line} was interrupted: {source}")]
    Interrupted {
        line: usize,
        #[source]
        source: ClientError,
    },
}

/// Why a single site produced no edit.
enum Failure {
    Skip(ResolveError),
    Abort(ClientError),
}

impl From<ResolveError> for Failure {
    fn from(err: ResolveError) -> Self {
        Failure::Skip(err)
    }
}

pub struct Walker<'a, A: GitHubApi + ?Sized> {
    resolver: Resolver<'a, A>,
    mode: Mode,
    style: CommentStyle,
}

impl<'a, A: GitHubApi + ?Sized> Walker<'a, A> {
    pub fn new(api: &'a A, mode: Mode, style: CommentStyle) -> Self {
        Self {
            resolver: Resolver::new(api),
            mode,
            style,
        }
    }

    /// Plans edits for every pinnable `uses:` site under `root`.
    ///
    /// The number of edits is `edits.len()`.
    pub fn walk(&self, root: &Node) -> Result<LineEdits, WalkError> {
        let mut edits = LineEdits::new();
        for site in uses_sites(root) {
            self.visit(&site, &mut edits)?;
        }
        Ok(edits)
    }

    fn visit(&self, site: &UsesSite, edits: &mut LineEdits) -> Result<(), WalkError> {
        let line = site.line;
        if edits.contains(line) {
            debug!(line, uses = %site.value, "line already has an edit");
            return Ok(());
        }

        let action = match classify(&site.value) {
            Ok(action) => action,
            Err(err) => {
                warn!(line, uses = %site.value, error = %err, "skipping unparsable uses value");
                return Ok(());
            }
        };
        if !action.is_pinnable() {
            debug!(line, uses = %site.value, kind = ?action.kind, "skipping non-repository reference");
            return Ok(());
        }

        let planned = match self.mode {
            Mode::Pin => self.pin(&action, line),
            Mode::Update => self.update(&action, line),
        };

        match planned {
            Ok(Some(text)) => {
                edits.insert(line, text);
            }
            Ok(None) => {}
            Err(Failure::Skip(err)) => {
                warn!(line, uses = %site.value, error = %err, "skipping reference");
            }
            Err(Failure::Abort(source)) => return Err(WalkError::Interrupted { line, source }),
        }
        Ok(())
    }

    fn pin(&self, action: &ActionReference, line: usize) -> Result<Option<String>, Failure> {
        let path = action.full_path();
        if action.is_pinned() {
            info!(line, action = %path, sha = %action.reference, "already pinned");
            return Ok(None);
        }

        let reference = if action.reference.is_empty() {
            self.default_branch(action)?
        } else {
            action.reference.clone()
        };

        debug!(line, action = %path, reference = %reference, shape = RefShape::of(&reference).as_str(), "resolving");
        let sha = self
            .resolver
            .resolve(&action.owner, action.repo(), &reference)?;
        info!(line, action = %path, reference = %reference, sha = short(&sha), "pinned");
        Ok(Some(self.style.render(&path, &sha, &reference)))
    }

    fn update(&self, action: &ActionReference, line: usize) -> Result<Option<String>, Failure> {
        let path = action.full_path();
        debug!(line, action = %path, current = %action.reference, "finding latest version");

        let latest = self.resolver.discover_latest(&action.owner, action.repo())?;
        if action.reference == latest.sha {
            info!(line, action = %path, latest = %latest.name, sha = short(&latest.sha), "already current");
            return Ok(None);
        }

        info!(line, action = %path, from = %action.reference, to = %latest.name, sha = short(&latest.sha), "updated");
        Ok(Some(self.style.render(&path, &latest.sha, &latest.name)))
    }

    /// Default branch of a reusable workflow's repository, used when the
    /// reference carries an empty ref.
    fn default_branch(&self, action: &ActionReference) -> Result<String, Failure> {
        debug_assert_eq!(action.kind, ReferenceKind::ReusableWorkflow);
        let (owner, repo) = (action.owner.as_str(), action.repo());
        match self.resolver.api().repository(owner, repo) {
            Ok(Lookup::Found(Repository {
                default_branch: Some(branch),
            })) => {
                info!(owner, repo, branch = %branch, "using default branch");
                Ok(branch)
            }
            Ok(_) => Err(Failure::Skip(ResolveError::NoDefaultBranch {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })),
            Err(err) if err.is_timeout() => Err(Failure::Abort(err)),
            Err(err) => Err(Failure::Skip(err.into())),
        }
    }
}

fn short(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}
