//! Parsing of `uses:` values into structured action references.
//!
//! A `uses:` value takes one of four shapes: a remote action
//! (`owner/repo[/path]@ref`), a reusable workflow
//! (`owner/repo/.github/workflows/file.yml@ref`), a container image
//! (`docker://image[:tag]`), or a local path (`./dir`, `../dir`). Only the
//! first two can be pinned; the others are classified so callers can skip them.

use serde::Serialize;
use thiserror::Error;

/// Length of a full Git SHA-1 object id.
pub const SHA_LENGTH: usize = 40;

const MIN_SHORT_SHA_LENGTH: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("empty action reference")]
    EmptyReference,

    #[error("action reference '{0}' is missing an explicit @ref (tag, branch or sha)")]
    MissingRef(String),

    #[error("invalid action reference '{0}', expected 'owner/repo@ref'")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    GitHubAction,
    ReusableWorkflow,
    ContainerImage,
    LocalPath,
    Malformed,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::GitHubAction => "action",
            ReferenceKind::ReusableWorkflow => "workflow",
            ReferenceKind::ContainerImage => "docker",
            ReferenceKind::LocalPath => "local",
            ReferenceKind::Malformed => "malformed",
        }
    }
}

/// Parsed identity of a `uses:` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReference {
    /// Repository owner. Empty for container images and local paths.
    pub owner: String,
    /// Everything between the owner and the `@`. For container images this
    /// holds the image name.
    pub repo_path: String,
    /// Tag, branch or SHA. May be empty only for reusable workflows.
    #[serde(rename = "ref")]
    pub reference: String,
    pub kind: ReferenceKind,
}

impl ActionReference {
    /// Repository name used for API calls: the first segment of `repo_path`.
    pub fn repo(&self) -> &str {
        self.repo_path
            .split_once('/')
            .map_or(self.repo_path.as_str(), |(repo, _)| repo)
    }

    /// `owner/repo_path`, the part of the reference kept verbatim on rewrite.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo_path)
    }

    /// Whether this reference points at a GitHub repository and can be pinned.
    pub fn is_pinnable(&self) -> bool {
        matches!(
            self.kind,
            ReferenceKind::GitHubAction | ReferenceKind::ReusableWorkflow
        ) && !self.owner.is_empty()
            && !self.repo_path.is_empty()
    }

    /// Whether the ref is already a full-length commit SHA.
    pub fn is_pinned(&self) -> bool {
        is_full_sha(&self.reference)
    }

    /// Placeholder for a value that failed to classify.
    pub fn malformed(raw: &str) -> Self {
        Self {
            owner: String::new(),
            repo_path: raw.to_string(),
            reference: String::new(),
            kind: ReferenceKind::Malformed,
        }
    }

    fn local(raw: &str) -> Self {
        Self {
            owner: String::new(),
            repo_path: raw.to_string(),
            reference: String::new(),
            kind: ReferenceKind::LocalPath,
        }
    }
}

/// Classifies a raw `uses:` value.
///
/// Splits on the first `@` and then on the first `/` of what precedes it, so
/// subpaths and refs containing further separators (`release/v1`) survive
/// intact.
pub fn classify(raw: &str) -> Result<ActionReference, ReferenceError> {
    if raw.is_empty() {
        return Err(ReferenceError::EmptyReference);
    }

    if raw.starts_with("./") || raw.starts_with("../") {
        return Ok(ActionReference::local(raw));
    }

    if let Some(image) = raw.strip_prefix("docker://") {
        let (name, tag) = image.split_once(':').unwrap_or((image, "latest"));
        return Ok(ActionReference {
            owner: String::new(),
            repo_path: name.to_string(),
            reference: tag.to_string(),
            kind: ReferenceKind::ContainerImage,
        });
    }

    let (path, reference) = raw
        .split_once('@')
        .ok_or_else(|| ReferenceError::MissingRef(raw.to_string()))?;

    let (owner, repo_path) = path
        .split_once('/')
        .ok_or_else(|| ReferenceError::InvalidFormat(raw.to_string()))?;

    if owner.is_empty() || repo_path.is_empty() {
        return Err(ReferenceError::InvalidFormat(raw.to_string()));
    }

    let kind = if is_workflow_path(repo_path) {
        ReferenceKind::ReusableWorkflow
    } else {
        ReferenceKind::GitHubAction
    };

    if reference.is_empty() && kind == ReferenceKind::GitHubAction {
        return Err(ReferenceError::InvalidFormat(raw.to_string()));
    }

    Ok(ActionReference {
        owner: owner.to_string(),
        repo_path: repo_path.to_string(),
        reference: reference.to_string(),
        kind,
    })
}

fn is_workflow_path(repo_path: &str) -> bool {
    repo_path
        .split('/')
        .any(|segment| segment.ends_with(".yml") || segment.ends_with(".yaml"))
}

/// True if `s` is non-empty and made only of ASCII hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// True if `s` has the shape of a full commit SHA.
pub fn is_full_sha(s: &str) -> bool {
    s.len() == SHA_LENGTH && is_hex(s)
}

/// Rough classification of what a ref text looks like.
///
/// Informational only: resolution always runs the full commit/tag/branch
/// sequence regardless of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefShape {
    Sha,
    ShortSha,
    Version,
    Branch,
    Unknown,
}

impl RefShape {
    pub fn of(reference: &str) -> Self {
        if reference.is_empty() {
            return RefShape::Unknown;
        }
        if is_full_sha(reference) {
            return RefShape::Sha;
        }
        if (MIN_SHORT_SHA_LENGTH..SHA_LENGTH).contains(&reference.len()) && is_hex(reference) {
            return RefShape::ShortSha;
        }
        let mut chars = reference.chars();
        if chars.next() == Some('v')
            && chars.next().is_some_and(|c| c.is_ascii_digit())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return RefShape::Version;
        }
        if reference.chars().all(|c| c.is_ascii_alphanumeric()) {
            return RefShape::Branch;
        }
        RefShape::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefShape::Sha => "sha",
            RefShape::ShortSha => "short-sha",
            RefShape::Version => "version",
            RefShape::Branch => "branch",
            RefShape::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plain_action() {
        let action = classify("actions/checkout@v4").unwrap();
        assert_eq!(action.owner, "actions");
        assert_eq!(action.repo_path, "checkout");
        assert_eq!(action.reference, "v4");
        assert_eq!(action.kind, ReferenceKind::GitHubAction);
        assert!(action.is_pinnable());
        assert!(!action.is_pinned());
    }

    #[test]
    fn keeps_action_subpath_in_repo_path() {
        let action = classify("actions/cache/restore@v4").unwrap();
        assert_eq!(action.repo_path, "cache/restore");
        assert_eq!(action.repo(), "cache");
        assert_eq!(action.full_path(), "actions/cache/restore");
    }

    #[test]
    fn splits_at_first_at_sign() {
        let action = classify("owner/repo@feature@odd").unwrap();
        assert_eq!(action.repo_path, "repo");
        assert_eq!(action.reference, "feature@odd");
    }

    #[test]
    fn keeps_slashes_in_ref() {
        let action = classify("owner/repo@release/v1.2").unwrap();
        assert_eq!(action.reference, "release/v1.2");
    }

    #[test]
    fn classifies_reusable_workflow() {
        let action = classify("owner/repo/.github/workflows/wf.yml@main").unwrap();
        assert_eq!(action.kind, ReferenceKind::ReusableWorkflow);
        assert_eq!(action.owner, "owner");
        assert_eq!(action.repo_path, "repo/.github/workflows/wf.yml");
        assert_eq!(action.reference, "main");
        assert_eq!(action.repo(), "repo");
    }

    #[test]
    fn reusable_workflow_may_have_empty_ref() {
        let action = classify("owner/repo/.github/workflows/wf.yaml@").unwrap();
        assert_eq!(action.kind, ReferenceKind::ReusableWorkflow);
        assert!(action.reference.is_empty());
    }

    #[test]
    fn action_with_empty_ref_is_invalid() {
        assert!(matches!(
            classify("actions/checkout@"),
            Err(ReferenceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn classifies_local_paths() {
        for raw in ["./.github/actions/setup", "../shared/action"] {
            let action = classify(raw).unwrap();
            assert_eq!(action.kind, ReferenceKind::LocalPath);
            assert!(action.owner.is_empty());
            assert!(!action.is_pinnable());
        }
    }

    #[test]
    fn classifies_docker_image_with_tag() {
        let action = classify("docker://alpine:3.19").unwrap();
        assert_eq!(action.kind, ReferenceKind::ContainerImage);
        assert_eq!(action.repo_path, "alpine");
        assert_eq!(action.reference, "3.19");
        assert!(!action.is_pinnable());
    }

    #[test]
    fn docker_image_defaults_to_latest() {
        let action = classify("docker://ghcr.io/owner/image").unwrap();
        assert_eq!(action.repo_path, "ghcr.io/owner/image");
        assert_eq!(action.reference, "latest");
    }

    #[test]
    fn rejects_empty_reference() {
        assert_eq!(classify(""), Err(ReferenceError::EmptyReference));
    }

    #[test]
    fn rejects_missing_ref() {
        assert_eq!(
            classify("actions/checkout"),
            Err(ReferenceError::MissingRef("actions/checkout".to_string()))
        );
    }

    #[test]
    fn rejects_missing_owner() {
        assert!(matches!(
            classify("checkout@v4"),
            Err(ReferenceError::InvalidFormat(_))
        ));
        assert!(matches!(
            classify("/checkout@v4"),
            Err(ReferenceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn detects_pinned_reference() {
        let action = classify("actions/checkout@11bd71901bbe5b1630ceea73d27597364c9af683").unwrap();
        assert!(action.is_pinned());
    }

    #[test]
    fn mixed_case_sha_counts_as_full_sha() {
        assert!(is_full_sha("11BD71901BBE5B1630CEEA73D27597364C9AF683"));
        assert!(!is_full_sha("11bd71901bbe5b1630ceea73d27597364c9af68"));
        assert!(!is_full_sha("zzbd71901bbe5b1630ceea73d27597364c9af683"));
    }

    #[test]
    fn ref_shapes() {
        assert_eq!(
            RefShape::of("11bd71901bbe5b1630ceea73d27597364c9af683"),
            RefShape::Sha
        );
        assert_eq!(RefShape::of("11bd719"), RefShape::ShortSha);
        assert_eq!(RefShape::of("v4"), RefShape::Version);
        assert_eq!(RefShape::of("main"), RefShape::Branch);
        assert_eq!(RefShape::of("vNext"), RefShape::Branch);
        assert_eq!(RefShape::of("v1.2.3"), RefShape::Version);
        assert_eq!(RefShape::of("v2.0.0-rc.1"), RefShape::Version);
        assert_eq!(RefShape::of("v1.2/x"), RefShape::Unknown);
        assert_eq!(RefShape::of("release-1"), RefShape::Unknown);
        assert_eq!(RefShape::of(""), RefShape::Unknown);
    }
}
