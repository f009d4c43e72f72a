//! In-memory report model
//!
//! Maps every test/browser pair to its last known result inside a suite tree.
//! Mutations only ever add or replace results; suite statuses along the
//! touched branch are recomputed after each one.

use refshot_common::{
    find_browser, BrowserNode, ImageInfo, Result, ResultTree, SuiteNode, TestIdentity,
    TestResult, TestStatus,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::config::DATA_FILE_NAME;
use crate::engine::{LiveResult, TestDefinition};

/// A result placed at its position in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedResult {
    /// Path of the test node (suite titles followed by the test title)
    pub suite_path: Vec<String>,
    pub browser_id: String,
    pub result: TestResult,
}

impl TestIdentity for FormattedResult {
    fn title_chain(&self) -> Vec<&str> {
        self.suite_path.iter().map(String::as_str).collect()
    }

    fn browser_id(&self) -> &str {
        &self.browser_id
    }
}

/// Report model shared by runs and reference updates
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    suites: Vec<SuiteNode>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a live result with the status it should be recorded under
    pub fn format(&self, result: &LiveResult, status: TestStatus) -> FormattedResult {
        FormattedResult {
            suite_path: result.node_path(),
            browser_id: result.browser_id.clone(),
            result: TestResult {
                status,
                attempt: result.attempt,
                images_info: result.images_info.clone(),
                assert_view_results: Vec::new(),
                meta_info: result.meta_info.clone(),
                error: result.error.clone(),
                skip_reason: None,
            },
        }
    }

    pub fn add_idle(&mut self, test: &TestDefinition) {
        let formatted = self.format(&LiveResult::for_test(test), TestStatus::Idle);
        self.add_test_result(formatted);
    }

    pub fn add_skipped(&mut self, test: &TestDefinition) {
        let mut formatted = self.format(&LiveResult::for_test(test), TestStatus::Skipped);
        formatted.result.skip_reason = test.skip_reason.clone();
        self.add_test_result(formatted);
    }

    /// Record a skip reported during execution
    pub fn add_pending(&mut self, result: &LiveResult) {
        let formatted = self.format(result, TestStatus::Skipped);
        self.add_test_result(formatted);
    }

    pub fn add_running(&mut self, result: &LiveResult) {
        let formatted = self.format(result, TestStatus::Running);
        self.add_test_result(formatted);
    }

    pub fn add_success(&mut self, result: &LiveResult) {
        let formatted = self.format(result, TestStatus::Success);
        self.add_test_result(formatted);
    }

    pub fn add_fail(&mut self, result: &LiveResult) {
        let formatted = self.format(result, TestStatus::Fail);
        self.add_test_result(formatted);
    }

    pub fn add_error(&mut self, result: &LiveResult) {
        let formatted = self.format(result, TestStatus::Error);
        self.add_test_result(formatted);
    }

    /// Record accepted references.
    ///
    /// Images of the stored attempt are replaced by state name; states the
    /// update does not mention are kept.
    pub fn add_updated(&mut self, mut formatted: FormattedResult) {
        formatted.result.status = TestStatus::Updated;
        self.add_test_result(formatted);
    }

    /// Snapshot of the current tree
    pub fn get_result(&self) -> ResultTree {
        ResultTree {
            suites: self.suites.clone(),
            gui: false,
            auto_run: false,
        }
    }

    pub fn get_suites(&self) -> &[SuiteNode] {
        &self.suites
    }

    pub fn suites_mut(&mut self) -> &mut Vec<SuiteNode> {
        &mut self.suites
    }

    /// Leaf holding the latest result of a test
    pub fn find_test_result(&self, suite_path: &[String], browser_id: &str) -> Option<&BrowserNode> {
        find_browser(&self.suites, suite_path, browser_id)
    }

    /// Persist the tree as `<report_path>/data.json`
    pub fn save_data_file(&self, report_path: &Path) -> Result<()> {
        std::fs::create_dir_all(report_path)?;

        let data = serde_json::json!({
            "date": chrono::Utc::now().to_rfc3339(),
            "suites": self.suites,
        });
        let path = report_path.join(DATA_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(&data)?)?;

        info!("Report data written to: {}", path.display());
        Ok(())
    }

    fn add_test_result(&mut self, formatted: FormattedResult) {
        let FormattedResult {
            suite_path,
            browser_id,
            result,
        } = formatted;

        if suite_path.is_empty() {
            return;
        }

        debug!(
            "{} [{}] -> {}",
            refshot_common::mk_full_title(&suite_path),
            browser_id,
            result.status
        );

        let node = ensure_node(&mut self.suites, &suite_path);
        match node.browsers.iter_mut().find(|b| b.name == browser_id) {
            None => node.browsers.push(BrowserNode::new(browser_id, result)),
            Some(browser) => place_result(browser, result),
        }

        if let Some(root) = self.suites.iter_mut().find(|s| s.name == suite_path[0]) {
            refresh_branch(root, &suite_path[1..]);
        }
    }
}

/// Store a result on a leaf, rotating the previous attempt into retries
fn place_result(browser: &mut BrowserNode, mut result: TestResult) {
    let current = &mut browser.result;

    let settled = !matches!(current.status, TestStatus::Idle | TestStatus::Running);
    if result.attempt > current.attempt && settled {
        let previous = std::mem::replace(current, result);
        browser.retries.push(previous);
        return;
    }

    if result.status == TestStatus::Updated {
        result.images_info = merge_images(&current.images_info, result.images_info);
        let mut views = current.assert_view_results.clone();
        for view in result.assert_view_results.drain(..) {
            views.retain(|v| v.state_name != view.state_name);
            views.push(view);
        }
        result.assert_view_results = views;
    }

    *current = result;
}

fn merge_images(existing: &[ImageInfo], updated: Vec<ImageInfo>) -> Vec<ImageInfo> {
    let mut merged = existing.to_vec();
    for image in updated {
        match merged.iter_mut().find(|i| i.state_name == image.state_name) {
            Some(slot) => *slot = image,
            None => merged.push(image),
        }
    }
    merged
}

fn ensure_node<'a>(suites: &'a mut Vec<SuiteNode>, path: &[String]) -> &'a mut SuiteNode {
    let mut level = suites;
    let mut depth = 0;
    loop {
        let prefix = &path[..=depth];
        let index = match level.iter().position(|s| s.name == path[depth]) {
            Some(index) => index,
            None => {
                level.push(SuiteNode::new(prefix.to_vec()));
                level.len() - 1
            }
        };
        if depth + 1 == path.len() {
            return &mut level[index];
        }
        level = &mut level[index].children;
        depth += 1;
    }
}

/// Recompute statuses from the node at `rest` up to `node`
fn refresh_branch(node: &mut SuiteNode, rest: &[String]) {
    if let Some((next, tail)) = rest.split_first() {
        if let Some(child) = node.children.iter_mut().find(|c| &c.name == next) {
            refresh_branch(child, tail);
        }
    }
    node.status = node.aggregate_status();
}
