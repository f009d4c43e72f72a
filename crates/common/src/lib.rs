//! Refshot Common Library
//!
//! Shared data model for the Refshot runner: test identities, result statuses,
//! the suite/browser result tree and the error type.

pub mod error;
pub mod identity;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use identity::{mk_full_title, short_hash, TestId, TestIdentity};
pub use tree::{
    find_browser, find_node, find_node_mut, find_path, BrowserNode, PathNode, ResultTree, SuiteNode,
};
pub use types::*;

/// Refshot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
