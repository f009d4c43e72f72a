//! Seam to the test discovery and execution engine

use async_trait::async_trait;
use refshot_common::{ImageInfo, MetaInfo, Result, TestIdentity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub use crate::config::RunFilter;

/// A discovered test bound to one browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    /// Ancestor suite titles, root first
    pub parents: Vec<String>,
    pub title: String,
    pub browser_id: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub silent_skip: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl TestDefinition {
    pub fn new(parents: &[&str], title: &str, browser_id: &str) -> Self {
        Self {
            parents: parents.iter().map(|p| p.to_string()).collect(),
            title: title.to_string(),
            browser_id: browser_id.to_string(),
            file: None,
            disabled: false,
            silent_skip: false,
            pending: false,
            skip_reason: None,
        }
    }

    /// Structural path of the test node in the result tree
    pub fn node_path(&self) -> Vec<String> {
        let mut path = self.parents.clone();
        path.push(self.title.clone());
        path
    }

    /// Whether the test takes part in the GUI at all
    pub fn is_runnable(&self) -> bool {
        !self.disabled && !self.silent_skip
    }
}

impl TestIdentity for TestDefinition {
    fn title_chain(&self) -> Vec<&str> {
        self.parents
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.title.as_str()))
            .collect()
    }

    fn browser_id(&self) -> &str {
        &self.browser_id
    }
}

/// All tests of one discovery cycle. Never mutated; a run works on a
/// derived sub-collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCollection {
    tests: Vec<TestDefinition>,
}

impl TestCollection {
    pub fn new(tests: Vec<TestDefinition>) -> Self {
        Self { tests }
    }

    pub fn tests(&self) -> &[TestDefinition] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// New collection holding the tests accepted by `keep`
    pub fn sub_collection<F>(&self, mut keep: F) -> TestCollection
    where
        F: FnMut(&TestDefinition) -> bool,
    {
        TestCollection {
            tests: self.tests.iter().filter(|t| keep(t)).cloned().collect(),
        }
    }
}

/// Payload of a live lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResult {
    pub parents: Vec<String>,
    pub title: String,
    pub browser_id: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub images_info: Vec<ImageInfo>,
    #[serde(default)]
    pub meta_info: MetaInfo,
    #[serde(default)]
    pub error: Option<String>,
}

impl LiveResult {
    pub fn for_test(test: &TestDefinition) -> Self {
        Self {
            parents: test.parents.clone(),
            title: test.title.clone(),
            browser_id: test.browser_id.clone(),
            ..Default::default()
        }
    }

    pub fn node_path(&self) -> Vec<String> {
        let mut path = self.parents.clone();
        path.push(self.title.clone());
        path
    }

    /// Whether any captured state differs from its reference
    pub fn has_diff(&self) -> bool {
        self.images_info.iter().any(ImageInfo::has_diff)
    }
}

impl TestIdentity for LiveResult {
    fn title_chain(&self) -> Vec<&str> {
        self.parents
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.title.as_str()))
            .collect()
    }

    fn browser_id(&self) -> &str {
        &self.browser_id
    }
}

/// Lifecycle events emitted while a collection executes
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunBegin,
    TestBegin(LiveResult),
    TestPass(LiveResult),
    TestFail(LiveResult),
    Retry(LiveResult),
    TestPending(LiveResult),
    RunEnd,
}

/// Sender side handed to the engine for lifecycle events
pub type EventSink = mpsc::UnboundedSender<EngineEvent>;

/// Test discovery and execution engine
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Read the test files and build the collection for this cycle
    async fn discover(&self, files: &[PathBuf], filter: &RunFilter) -> Result<TestCollection>;

    /// Execute a collection, reporting progress on `events`.
    ///
    /// Individual test failures are reported as events; only a failure of the
    /// engine itself is returned as an error.
    async fn execute(
        &self,
        collection: TestCollection,
        filter: &RunFilter,
        events: EventSink,
    ) -> Result<()>;
}
