//! Per-file processing: read, parse, walk, rewrite, write back.
//!
//! A file is written at most once, after the full new text has been computed
//! in memory. Dry runs compute the same edits and skip the write.

use crate::github::GitHubApi;
use crate::reference::{ActionReference, ReferenceKind, RefShape, classify};
use crate::rewriter::rewrite;
use crate::scanner::{parse_document, uses_sites};
use crate::walker::{CommentStyle, Mode, Walker};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub mode: Mode,
    pub dry_run: bool,
    pub style: CommentStyle,
}

/// Outcome of processing one workflow file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// Edits planned by the walker. Lines skipped by the rewriter still count.
    pub edits: usize,
    pub written: bool,
    /// The file had no content and was not parsed.
    pub empty: bool,
}

/// Pins or updates every `uses:` reference in the file at `path`.
pub fn process_file<A: GitHubApi + ?Sized>(
    api: &A,
    path: &Path,
    options: &Options,
) -> Result<FileReport> {
    let original = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if original.trim().is_empty() {
        debug!(file = %path.display(), "skipping empty file");
        return Ok(FileReport {
            path: path.to_path_buf(),
            edits: 0,
            written: false,
            empty: true,
        });
    }

    let root = parse_document(&original)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let edits = Walker::new(api, options.mode, options.style)
        .walk(&root)
        .with_context(|| format!("Failed to process {}", path.display()))?;

    let mut written = false;
    if !edits.is_empty() && !options.dry_run {
        let updated = rewrite(&original, &edits);
        if updated != original {
            std::fs::write(path, updated)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written = true;
        }
    }

    info!(file = %path.display(), edits = edits.len(), written, "processed workflow");
    Ok(FileReport {
        path: path.to_path_buf(),
        edits: edits.len(),
        written,
        empty: false,
    })
}

/// One `uses:` site as reported by an offline audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    pub line: usize,
    pub uses: String,
    /// `Malformed` when the value could not be classified.
    pub kind: ReferenceKind,
    pub shape: &'static str,
    pub pinned: bool,
}

/// Lists every `uses:` site in the file without touching the network.
pub fn audit_file(path: &Path) -> Result<Vec<SiteReport>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root = parse_document(&source)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(uses_sites(&root)
        .into_iter()
        .map(|site| {
            let action = classify(&site.value)
                .unwrap_or_else(|_| ActionReference::malformed(&site.value));
            SiteReport {
                line: site.line,
                kind: action.kind,
                shape: RefShape::of(&action.reference).as_str(),
                pinned: action.is_pinnable() && action.is_pinned(),
                uses: site.value,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use std::fs;

    const SHA: &str = "11bd71901bbe5b1630ceea73d27597364c9af683";

    fn options(mode: Mode, dry_run: bool) -> Options {
        Options {
            mode,
            dry_run,
            style: CommentStyle::default(),
        }
    }

    #[test]
    fn pins_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        fs::write(&path, "steps:\n  - uses: actions/checkout@v4\n").unwrap();
        let api = FakeApi::new().with_lightweight_tag("actions/checkout", "v4", SHA);

        let report = process_file(&api, &path, &options(Mode::Pin, false)).unwrap();

        assert_eq!(report.edits, 1);
        assert!(report.written);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("steps:\n  - uses: actions/checkout@{SHA} #v4\n")
        );
    }

    #[test]
    fn dry_run_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        let content = "steps:\n  - uses: actions/checkout@v4\n";
        fs::write(&path, content).unwrap();
        let api = FakeApi::new().with_lightweight_tag("actions/checkout", "v4", SHA);

        let report = process_file(&api, &path, &options(Mode::Pin, true)).unwrap();

        assert_eq!(report.edits, 1);
        assert!(!report.written);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn second_pin_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        fs::write(&path, "steps:\n  - uses: actions/checkout@v4\n").unwrap();
        let api = FakeApi::new().with_lightweight_tag("actions/checkout", "v4", SHA);

        process_file(&api, &path, &options(Mode::Pin, false)).unwrap();
        let calls_after_first = api.calls().len();
        let report = process_file(&api, &path, &options(Mode::Pin, false)).unwrap();

        assert_eq!(report.edits, 0);
        assert!(!report.written);
        assert_eq!(api.calls().len(), calls_after_first);
    }

    #[test]
    fn skips_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yml");
        fs::write(&path, "\n  \n").unwrap();

        let report = process_file(&FakeApi::new(), &path, &options(Mode::Pin, false)).unwrap();
        assert!(report.empty);
        assert_eq!(report.edits, 0);
    }

    #[test]
    fn invalid_yaml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "jobs: [unclosed\n").unwrap();

        let err = process_file(&FakeApi::new(), &path, &options(Mode::Pin, false)).unwrap_err();
        assert!(format!("{err}").contains("broken.yml"));
    }

    #[test]
    fn drifted_line_counts_as_edit_but_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        let content = "steps:\n  - uses:\n      a/b@v1\n";
        fs::write(&path, content).unwrap();
        let api = FakeApi::new().with_lightweight_tag("a/b", "v1", SHA);

        let report = process_file(&api, &path, &options(Mode::Pin, false)).unwrap();

        assert_eq!(report.edits, 1);
        assert!(!report.written);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn audit_reports_every_site() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        fs::write(
            &path,
            format!(
                "steps:\n  - uses: actions/checkout@{SHA}\n  - uses: ./local\n  - uses: actions/setup-go@v5.0.2\n  - uses: not-a-reference\n"
            ),
        )
        .unwrap();

        let sites = audit_file(&path).unwrap();
        let summary: Vec<_> = sites
            .iter()
            .map(|s| (s.line, s.kind, s.shape, s.pinned))
            .collect();
        assert_eq!(
            summary,
            vec![
                (2, ReferenceKind::GitHubAction, "sha", true),
                (3, ReferenceKind::LocalPath, "unknown", false),
                (4, ReferenceKind::GitHubAction, "version", false),
                (5, ReferenceKind::Malformed, "unknown", false),
            ]
        );
    }
}
