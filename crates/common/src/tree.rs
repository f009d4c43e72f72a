//! Result tree: suites hold child suites and per-browser result leaves.
//!
//! A test is a suite node whose `suite_path` ends with the test title; its
//! `browsers` are the leaves. Suite statuses are always derived from the
//! descendants through [`TestStatus::aggregate`].

use serde::{Deserialize, Serialize};

use crate::identity::mk_full_title;
use crate::types::{TestResult, TestStatus};

/// Latest result of one test in one browser, plus earlier attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserNode {
    pub name: String,
    #[serde(default)]
    pub result: TestResult,
    #[serde(default)]
    pub retries: Vec<TestResult>,
}

impl BrowserNode {
    pub fn new(name: impl Into<String>, result: TestResult) -> Self {
        Self {
            name: name.into(),
            result,
            retries: Vec::new(),
        }
    }

    pub fn status(&self) -> TestStatus {
        self.result.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteNode {
    pub name: String,
    pub suite_path: Vec<String>,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub children: Vec<SuiteNode>,
    #[serde(default)]
    pub browsers: Vec<BrowserNode>,
}

impl SuiteNode {
    pub fn new(suite_path: Vec<String>) -> Self {
        Self {
            name: suite_path.last().cloned().unwrap_or_default(),
            suite_path,
            status: TestStatus::Idle,
            children: Vec::new(),
            browsers: Vec::new(),
        }
    }

    /// Worst status among direct children and browser leaves
    pub fn aggregate_status(&self) -> TestStatus {
        TestStatus::aggregate(
            self.children
                .iter()
                .map(|c| c.status)
                .chain(self.browsers.iter().map(BrowserNode::status)),
        )
    }

    /// Recompute statuses of the whole subtree bottom-up
    pub fn refresh_statuses(&mut self) {
        for child in &mut self.children {
            child.refresh_statuses();
        }
        self.status = self.aggregate_status();
    }

    pub fn full_title(&self) -> String {
        mk_full_title(&self.suite_path)
    }

    pub fn browser(&self, name: &str) -> Option<&BrowserNode> {
        self.browsers.iter().find(|b| b.name == name)
    }

    /// Every (test node, browser leaf) pair below this node, depth-first
    pub fn leaves(&self) -> Vec<(&SuiteNode, &BrowserNode)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a SuiteNode, &'a BrowserNode)>) {
        for child in &self.children {
            child.collect_leaves(out);
        }
        for browser in &self.browsers {
            out.push((self, browser));
        }
    }
}

/// Snapshot of the report handed to observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTree {
    #[serde(default)]
    pub suites: Vec<SuiteNode>,
    #[serde(default)]
    pub gui: bool,
    #[serde(default)]
    pub auto_run: bool,
}

/// A node addressable by the names along its structural path
pub trait PathNode: Sized {
    fn name(&self) -> &str;
    fn children(&self) -> &[Self];
}

impl PathNode for SuiteNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Walk `path` from `roots`, matching one name per level
pub fn find_path<'a, N: PathNode>(roots: &'a [N], path: &[String]) -> Option<&'a N> {
    let (first, rest) = path.split_first()?;
    let node = roots.iter().find(|n| n.name() == first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_path(node.children(), rest)
    }
}

/// Locate a suite by its structural path
pub fn find_node<'a>(suites: &'a [SuiteNode], path: &[String]) -> Option<&'a SuiteNode> {
    find_path(suites, path)
}

pub fn find_node_mut<'a>(suites: &'a mut [SuiteNode], path: &[String]) -> Option<&'a mut SuiteNode> {
    let (first, rest) = path.split_first()?;
    let node = suites.iter_mut().find(|s| &s.name == first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_node_mut(&mut node.children, rest)
    }
}

/// Locate the browser leaf of a test
pub fn find_browser<'a>(
    suites: &'a [SuiteNode],
    path: &[String],
    browser: &str,
) -> Option<&'a BrowserNode> {
    find_node(suites, path)?.browser(browser)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn sample() -> Vec<SuiteNode> {
        let mut test = SuiteNode::new(path(&["Login", "opens"]));
        test.browsers.push(BrowserNode::new(
            "chrome",
            TestResult::with_status(TestStatus::Fail),
        ));
        test.browsers.push(BrowserNode::new(
            "firefox",
            TestResult::with_status(TestStatus::Success),
        ));
        let mut suite = SuiteNode::new(path(&["Login"]));
        suite.children.push(test);
        vec![suite]
    }

    #[test]
    fn test_find_node_by_path() {
        let suites = sample();
        assert_eq!(find_node(&suites, &path(&["Login"])).unwrap().name, "Login");
        assert_eq!(find_node(&suites, &path(&["Login", "opens"])).unwrap().name, "opens");
        assert!(find_node(&suites, &path(&["Login", "closes"])).is_none());
        assert!(find_node(&suites, &[]).is_none());
    }

    #[test]
    fn test_refresh_statuses() {
        let mut suites = sample();
        suites[0].refresh_statuses();
        assert_eq!(suites[0].status, TestStatus::Fail);
        assert_eq!(suites[0].children[0].status, TestStatus::Fail);
    }

    #[test]
    fn test_leaves_and_browser_lookup() {
        let suites = sample();
        let leaves = suites[0].leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0.full_title(), "Login opens");
        let leaf = find_browser(&suites, &path(&["Login", "opens"]), "firefox").unwrap();
        assert_eq!(leaf.status(), TestStatus::Success);
    }

    #[test]
    fn test_tree_json_shape() {
        let tree = ResultTree {
            suites: sample(),
            gui: true,
            auto_run: false,
        };
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["suites"][0]["suitePath"][0], "Login");
        assert_eq!(json["autoRun"], false);
        let back: ResultTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
