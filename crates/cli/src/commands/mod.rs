//! CLI Commands

pub mod accept;
pub mod run;
pub mod tree;

use anyhow::Result;
use refshot_common::{SuiteNode, TestStatus};
use refshot_gui::{GuiConfig, ManifestEngine, ToolRunner};
use serde::Serialize;
use std::sync::Arc;

use crate::output::{status_label, TableDisplay};

/// Discover the configured manifests and build the initial tree
pub async fn open_runner(config: GuiConfig) -> Result<ToolRunner> {
    let engine =
        ManifestEngine::new(config.browsers.keys().cloned()).with_sets(config.sets.clone());
    let mut runner = ToolRunner::new(Arc::new(engine), config);
    runner.initialize().await?;
    Ok(runner)
}

/// One test in one browser
#[derive(Serialize)]
pub struct LeafRow {
    pub test: String,
    pub browser: String,
    pub status: TestStatus,
    pub attempt: u32,
    pub retries: usize,
}

impl TableDisplay for LeafRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Browser", "Status", "Attempt", "Retries"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.test.clone(),
            self.browser.clone(),
            status_label(self.status),
            self.attempt.to_string(),
            self.retries.to_string(),
        ]
    }
}

pub fn leaf_rows(suites: &[SuiteNode]) -> Vec<LeafRow> {
    suites
        .iter()
        .flat_map(|suite| suite.leaves())
        .map(|(node, browser)| LeafRow {
            test: node.full_title(),
            browser: browser.name.clone(),
            status: browser.status(),
            attempt: browser.result.attempt,
            retries: browser.retries.len(),
        })
        .collect()
}
