//! actlock library for pinning GitHub Actions references to commit SHAs.
//!
//! The core workflow has four phases per workflow file:
//!
//! 1. **Scanning**: Parse the YAML and collect every `uses:` value with its line
//! 2. **Classification**: Split each value into owner, repository path and ref
//! 3. **Resolution**: Ask GitHub which commit the ref (or the newest version) denotes
//! 4. **Rewriting**: Replace the `uses:` lines in place, keeping the old ref as a comment
//!
//! # Example
//!
//! ```no_run
//! use actlock::github::{ClientConfig, HttpClient};
//! use actlock::walker::{CommentStyle, Mode};
//! use actlock::workflow::{self, Options};
//! use std::path::Path;
//!
//! let client = HttpClient::new(ClientConfig::default()).unwrap();
//! let options = Options {
//!     mode: Mode::Pin,
//!     dry_run: true,
//!     style: CommentStyle::default(),
//! };
//! let report = workflow::process_file(&client, Path::new(".github/workflows/ci.yml"), &options).unwrap();
//!
//! println!("{} reference(s) would be pinned", report.edits);
//! ```

pub mod cache;
pub mod github;
pub mod reference;
pub mod resolver;
pub mod rewriter;
pub mod scanner;
pub mod walker;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use github::{ClientConfig, ClientError, GitHubApi, HttpClient, Lookup};
pub use reference::{ActionReference, ReferenceKind, classify};
pub use walker::{CommentStyle, LineEdits, Mode};
pub use workflow::{FileReport, Options};
