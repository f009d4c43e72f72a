//! Seeding a fresh result tree from a previously saved report
//!
//! The saved tree only donates statuses and browser leaf payloads. Nodes that
//! exist only in the saved tree are ignored, so the shape of the current tree
//! never changes.

use refshot_common::{find_path, BrowserNode, PathNode, SuiteNode, TestResult, TestStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::DATA_FILE_NAME;

/// Saved result tree, read once when the GUI tree is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReuseRecord {
    #[serde(default)]
    pub suites: Vec<ReuseSuite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReuseSuite {
    pub name: String,
    #[serde(default)]
    pub suite_path: Vec<String>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default)]
    pub children: Vec<ReuseSuite>,
    #[serde(default)]
    pub browsers: Vec<BrowserPatch>,
}

/// Fields a saved browser leaf may carry; absent fields leave the current
/// leaf untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserPatch {
    pub name: String,
    #[serde(default)]
    pub result: Option<TestResult>,
    #[serde(default)]
    pub retries: Option<Vec<TestResult>>,
}

impl PathNode for ReuseSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl BrowserPatch {
    pub fn apply(&self, leaf: &mut BrowserNode) {
        if let Some(result) = &self.result {
            leaf.result = result.clone();
        }
        if let Some(retries) = &self.retries {
            leaf.retries = retries.clone();
        }
    }
}

impl ReuseRecord {
    /// Read `<report_path>/data.json`; anything unreadable means nothing to reuse
    pub fn load(report_path: &Path) -> Self {
        let path = report_path.join(DATA_FILE_NAME);
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<ReuseRecord>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(record) => {
                debug!("Loaded reuse data from {}", path.display());
                record
            }
            Err(e) => {
                warn!("Nothing to reuse in {}: {}", report_path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Saved suite at a structural path
    pub fn find(&self, path: &[String]) -> Option<&ReuseSuite> {
        find_path(&self.suites, path)
    }

    fn browser(&self, path: &[String], browser: &str) -> Option<&BrowserPatch> {
        self.find(path)?.browsers.iter().find(|b| b.name == browser)
    }

    /// Status of a suite once something below it was reused: the aggregate of
    /// the merged node when the saved tree knows the suite, its own status
    /// otherwise
    fn reuse_status(&self, suite: &SuiteNode) -> TestStatus {
        match self.find(&suite.suite_path) {
            Some(_) => suite.aggregate_status(),
            None => suite.status,
        }
    }
}

/// Merge saved results into `suites`. Returns whether any leaf was reused.
///
/// The "reused" flag is threaded through each root suite's traversal and is
/// never cleared: once a leaf was reused, every suite visited afterwards in
/// that traversal (ancestors and later siblings alike) recomputes its status.
pub fn apply_reuse(suites: &mut [SuiteNode], reuse: &ReuseRecord) -> bool {
    if reuse.is_empty() {
        return false;
    }

    let mut any = false;
    for suite in suites.iter_mut() {
        any |= reuse_suite(suite, reuse, false);
    }
    any
}

fn reuse_suite(suite: &mut SuiteNode, reuse: &ReuseRecord, reused: bool) -> bool {
    let mut reused = reused;

    for child in suite.children.iter_mut() {
        reused = reuse_suite(child, reuse, reused);
    }

    if !suite.children.is_empty() && reused {
        suite.status = reuse.reuse_status(suite);
    }

    let mut leaf_reused = false;
    for browser in suite.browsers.iter_mut() {
        if let Some(patch) = reuse.browser(&suite.suite_path, &browser.name) {
            patch.apply(browser);
            leaf_reused = true;
        }
    }

    if leaf_reused {
        reused = true;
        suite.status = reuse.reuse_status(suite);
    }

    reused
}
