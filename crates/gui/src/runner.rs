//! Selecting which part of the collection a run executes

use refshot_common::{Error, Result, SuiteNode, TestId, TestIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::RunFilter;
use crate::engine::{TestCollection, TestDefinition};

/// One test in one browser, addressed by full title
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSelector {
    pub test_name: String,
    pub browser_name: String,
}

impl TestSelector {
    pub fn new(test_name: impl Into<String>, browser_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            browser_name: browser_name.into(),
        }
    }

    /// Parse `"<full title>@<browser>"`; the last `@` separates the browser
    pub fn parse(s: &str) -> Result<Self> {
        match s.rsplit_once('@') {
            Some((title, browser)) if !title.is_empty() && !browser.is_empty() => {
                Ok(Self::new(title, browser))
            }
            _ => Err(Error::InvalidConfig(format!(
                "test selector '{}' must look like '<full title>@<browser>'",
                s
            ))),
        }
    }

    pub fn test_id(&self) -> TestId {
        TestId::from_full_title(&self.test_name, &self.browser_name)
    }
}

/// Selectors for every browser leaf below a suite
pub fn selectors_for_suite(suite: &SuiteNode) -> Vec<TestSelector> {
    suite
        .leaves()
        .into_iter()
        .map(|(node, browser)| TestSelector::new(node.full_title(), browser.name.clone()))
        .collect()
}

/// Selectors for every leaf whose latest result failed or errored
pub fn failed_selectors(suites: &[SuiteNode]) -> Vec<TestSelector> {
    suites
        .iter()
        .flat_map(|suite| suite.leaves())
        .filter(|(_, browser)| browser.status().is_failed())
        .map(|(node, browser)| TestSelector::new(node.full_title(), browser.name.clone()))
        .collect()
}

/// Which tests of the collection a run covers
#[derive(Debug, Clone, PartialEq)]
pub enum Runner {
    All,
    Specific(HashSet<TestId>),
}

impl Runner {
    /// No selectors means the whole collection
    pub fn create(selectors: &[TestSelector]) -> Self {
        if selectors.is_empty() {
            Runner::All
        } else {
            Runner::Specific(selectors.iter().map(TestSelector::test_id).collect())
        }
    }

    pub fn includes(&self, test: &TestDefinition) -> bool {
        match self {
            Runner::All => true,
            Runner::Specific(ids) => ids.contains(&test.test_id()),
        }
    }

    /// Sub-collection to execute; the global filter caps the selection
    pub fn collection(&self, collection: &TestCollection, filter: &RunFilter) -> TestCollection {
        collection.sub_collection(|t| t.is_runnable() && filter.allows(t) && self.includes(t))
    }
}
