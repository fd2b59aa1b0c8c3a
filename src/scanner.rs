//! Workflow file scanner.
//!
//! Collects workflow files from `.github/workflows` (or explicit paths),
//! parses each into a minimal YAML syntax tree that keeps the source line of
//! every scalar, and extracts the values attached to `uses:` keys.
//!
//! The tree is built from yaml-rust2's event stream rather than a typed
//! workflow schema: only mapping/sequence structure and scalar positions
//! matter for locating `uses:` occurrences at any nesting depth.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, ScanError};

pub const DEFAULT_WORKFLOW_DIR: &str = ".github/workflows";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid YAML: {0}")]
    Syntax(#[from] ScanError),

    #[error("unbalanced YAML structure near line {line}")]
    Unbalanced { line: usize },
}

/// A scalar value and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub line: usize,
}

/// Generic YAML syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Root of a stream: one child per YAML document.
    Document(Vec<Node>),
    Mapping(Vec<(Node, Node)>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
    Alias { line: usize },
}

/// A `uses:` value found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsesSite {
    pub value: String,
    /// Line of the value, 1-indexed.
    pub line: usize,
}

enum Frame {
    Sequence(Vec<Node>),
    Mapping {
        entries: Vec<(Node, Node)>,
        key: Option<Node>,
    },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    documents: Vec<Node>,
    error: Option<DocumentError>,
}

impl TreeBuilder {
    fn complete(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => self.documents.push(node),
            Some(Frame::Sequence(items)) => items.push(node),
            Some(Frame::Mapping { entries, key }) => match key.take() {
                None => *key = Some(node),
                Some(k) => entries.push((k, node)),
            },
        }
    }

    fn fail(&mut self, line: usize) {
        if self.error.is_none() {
            self.error = Some(DocumentError::Unbalanced { line });
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let line = mark.line();
        match event {
            Event::Scalar(value, ..) => self.complete(Node::Scalar(Scalar { value, line })),
            Event::Alias(..) => self.complete(Node::Alias { line }),
            Event::SequenceStart(..) => self.stack.push(Frame::Sequence(Vec::new())),
            Event::MappingStart(..) => self.stack.push(Frame::Mapping {
                entries: Vec::new(),
                key: None,
            }),
            Event::SequenceEnd => match self.stack.pop() {
                Some(Frame::Sequence(items)) => self.complete(Node::Sequence(items)),
                _ => self.fail(line),
            },
            Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Mapping { entries, key: None }) => {
                    self.complete(Node::Mapping(entries))
                }
                _ => self.fail(line),
            },
            _ => {}
        }
    }
}

/// Parses YAML source (possibly multi-document) into a [`Node::Document`].
pub fn parse_document(source: &str) -> Result<Node, DocumentError> {
    let mut builder = TreeBuilder::default();
    let mut parser = Parser::new_from_str(source);
    parser.load(&mut builder, true)?;

    if let Some(err) = builder.error {
        return Err(err);
    }
    if !builder.stack.is_empty() {
        return Err(DocumentError::Unbalanced {
            line: source.lines().count(),
        });
    }
    Ok(Node::Document(builder.documents))
}

/// Every scalar value attached to a `uses` key, in document order.
///
/// Non-scalar values under `uses` (and everything under other keys) are
/// searched recursively, since steps and jobs nest `uses:` several levels deep.
pub fn uses_sites(node: &Node) -> Vec<UsesSite> {
    let mut sites = Vec::new();
    collect_uses(node, &mut sites);
    sites
}

fn collect_uses(node: &Node, sites: &mut Vec<UsesSite>) {
    match node {
        Node::Document(children) | Node::Sequence(children) => {
            for child in children {
                collect_uses(child, sites);
            }
        }
        Node::Mapping(entries) => {
            for (key, value) in entries {
                match (key, value) {
                    (Node::Scalar(key), Node::Scalar(value)) if key.value == "uses" => {
                        sites.push(UsesSite {
                            value: value.value.clone(),
                            line: value.line,
                        });
                    }
                    _ => collect_uses(value, sites),
                }
            }
        }
        Node::Scalar(_) | Node::Alias { .. } => {}
    }
}

/// Collects workflow files from `paths`.
///
/// Directories are listed one level deep, skipping hidden entries and files
/// without a `.yml`/`.yaml` extension. Explicit file paths are taken as given.
/// File names matching any `exclude` pattern are dropped either way.
pub fn collect_workflow_files(paths: &[PathBuf], exclude: &[glob::Pattern]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if !is_excluded(path, exclude) {
                files.push(path.clone());
            }
            continue;
        }
        if !path.is_dir() {
            anyhow::bail!("Workflows directory not found: {}", path.display());
        }

        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry =
                entry.with_context(|| format!("Error reading workflows directory {}", path.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_yaml(entry.path()) {
                debug!(file = %entry.path().display(), "skipping non-YAML file");
                continue;
            }
            if is_excluded(entry.path(), exclude) {
                debug!(file = %entry.path().display(), "skipping excluded file");
                continue;
            }
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yml" || ext == "yaml")
}

fn is_excluded(path: &Path, exclude: &[glob::Pattern]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    exclude.iter().any(|pattern| pattern.matches(name))
}

/// Rejects paths that climb out of, or resolve outside, the working directory.
pub fn validate_workflow_path(path: &Path) -> Result<()> {
    if path.components().any(|c| c == Component::ParentDir) {
        anyhow::bail!("Workflow path {} contains '..'", path.display());
    }

    let absolute = std::path::absolute(path)
        .with_context(|| format!("Could not get absolute path for {}", path.display()))?;
    let cwd = std::env::current_dir().context("Could not get working directory")?;

    if !absolute.starts_with(&cwd) {
        anyhow::bail!(
            "Workflow path {} resolves outside project root {}",
            path.display(),
            cwd.display()
        );
    }
    Ok(())
}
