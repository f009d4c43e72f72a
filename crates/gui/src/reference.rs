//! Accepting captured screenshots as new references
//!
//! Tests are processed one after another. Inside a test, every image is
//! written and announced before the next one starts, and the report entry is
//! updated once all of its images were tried. A failed write only loses that
//! image: it is reported against its own test and state while the rest of the
//! batch still goes through.

use async_trait::async_trait;
use refshot_common::{
    AssertViewResult, BrowserNode, Error, ImageInfo, ImageRef, ImageSize, MetaInfo, Result,
    SuiteNode, TestId, TestIdentity, TestResult, TestStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::GuiConfig;
use crate::engine::TestDefinition;
use crate::events::{ClientEvent, EventSource};
use crate::report::{FormattedResult, ReportBuilder};

/// A test whose captured images should become its references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// Path of the test node (suite titles followed by the test title)
    pub suite_path: Vec<String>,
    pub browser_id: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub meta_info: MetaInfo,
    pub images_info: Vec<ImageInfo>,
}

impl TestIdentity for UpdateRequest {
    fn title_chain(&self) -> Vec<&str> {
        self.suite_path.iter().map(String::as_str).collect()
    }

    fn browser_id(&self) -> &str {
        &self.browser_id
    }
}

/// Update requests for every failed leaf that captured images
pub fn accept_requests_for_failed(suites: &[SuiteNode]) -> Vec<UpdateRequest> {
    suites
        .iter()
        .flat_map(|suite| suite.leaves())
        .filter(|(_, browser)| browser.status().is_failed())
        .filter_map(|(node, browser)| {
            let images_info: Vec<ImageInfo> = browser
                .result
                .images_info
                .iter()
                .filter(|i| i.actual_img.is_some())
                .cloned()
                .collect();
            if images_info.is_empty() {
                return None;
            }
            Some(UpdateRequest {
                suite_path: node.suite_path.clone(),
                browser_id: browser.name.clone(),
                attempt: browser.result.attempt,
                meta_info: browser.result.meta_info.clone(),
                images_info,
            })
        })
        .collect()
}

/// Persists reference images
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `actual` as the reference at `reference` and return its size
    async fn write_reference(&self, actual: &ImageRef, reference: &Path) -> Result<ImageSize>;
}

/// Copies actual screenshots onto their reference paths
#[derive(Debug, Clone)]
pub struct FsImageStore {
    /// Base for relative actual image paths (the report directory)
    base: PathBuf,
}

impl FsImageStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn write_reference(&self, actual: &ImageRef, reference: &Path) -> Result<ImageSize> {
        let src = self.resolve(&actual.path);

        if let Some(parent) = reference.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically via temp file next to the target
        let tmp_path = reference.with_extension("png.tmp");
        let written = match fs::copy(&src, &tmp_path).await {
            Ok(_) => fs::rename(&tmp_path, reference).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(e.into());
        }

        if actual.size != ImageSize::default() {
            return Ok(actual.size);
        }
        match image::image_dimensions(reference) {
            Ok((width, height)) => Ok(ImageSize { width, height }),
            Err(e) => {
                debug!("Could not read size of {}: {}", reference.display(), e);
                Ok(actual.size)
            }
        }
    }
}

/// A single image that could not be accepted
#[derive(Debug)]
pub struct ImageFailure {
    pub test_id: TestId,
    pub state_name: String,
    pub error: Error,
}

/// Outcome of one test in a batch
#[derive(Debug)]
pub struct TestUpdate {
    pub test_id: TestId,
    /// Images whose reference was written, in processing order
    pub applied: Vec<AssertViewResult>,
    pub failures: Vec<ImageFailure>,
    /// The test's leaf after the report was updated
    pub node: Option<BrowserNode>,
}

impl TestUpdate {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-test outcomes of a whole batch
#[derive(Debug, Default)]
pub struct UpdateBatch {
    pub tests: Vec<TestUpdate>,
}

impl UpdateBatch {
    pub fn failures(&self) -> impl Iterator<Item = &ImageFailure> {
        self.tests.iter().flat_map(|t| t.failures.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Collapse into a result that fails when any image failed, naming each
    /// failed test and state
    pub fn into_result(self) -> Result<Vec<TestUpdate>> {
        let failed: Vec<(String, String)> = self
            .failures()
            .map(|f| (f.test_id.to_string(), f.state_name.clone()))
            .collect();
        if failed.is_empty() {
            Ok(self.tests)
        } else {
            Err(Error::ReferenceUpdate(failed))
        }
    }
}

/// Everything a reference update touches
pub struct ReferenceUpdater<'a> {
    pub tests: &'a HashMap<TestId, TestDefinition>,
    pub config: &'a GuiConfig,
    pub report: &'a mut ReportBuilder,
    pub events: &'a EventSource,
    pub store: &'a dyn ImageStore,
}

impl ReferenceUpdater<'_> {
    pub async fn update(&mut self, requests: Vec<UpdateRequest>) -> UpdateBatch {
        let mut batch = UpdateBatch::default();
        for request in requests {
            let outcome = self.update_test(request).await;
            batch.tests.push(outcome);
        }
        batch
    }

    async fn update_test(&mut self, request: UpdateRequest) -> TestUpdate {
        let test_id = request.test_id();
        let mut outcome = TestUpdate {
            test_id: test_id.clone(),
            applied: Vec::new(),
            failures: Vec::new(),
            node: None,
        };

        let tests = self.tests;
        let config = self.config;

        let test = match tests.get(&test_id) {
            Some(test) => test,
            None => {
                for image in &request.images_info {
                    outcome.failures.push(ImageFailure {
                        test_id: test_id.clone(),
                        state_name: image.state_name.clone(),
                        error: Error::not_found("test", test_id.to_string()),
                    });
                }
                return outcome;
            }
        };

        let browser = match config.browser(&request.browser_id) {
            Ok(browser) => browser,
            Err(_) => {
                for image in &request.images_info {
                    outcome.failures.push(ImageFailure {
                        test_id: test_id.clone(),
                        state_name: image.state_name.clone(),
                        error: Error::UnknownBrowser(request.browser_id.clone()),
                    });
                }
                return outcome;
            }
        };

        let mut updated_images = Vec::new();
        for image in &request.images_info {
            let state_name = image.state_name.clone();
            let actual = match &image.actual_img {
                Some(actual) => actual.clone(),
                None => {
                    outcome.failures.push(ImageFailure {
                        test_id: test_id.clone(),
                        state_name: state_name.clone(),
                        error: Error::ImageWrite {
                            test_id: test_id.to_string(),
                            state_name,
                            reason: "no captured image".to_string(),
                        },
                    });
                    continue;
                }
            };

            let ref_path = browser.screenshot_path(test, &image.state_name);
            match self.store.write_reference(&actual, &ref_path).await {
                Ok(size) => {
                    let ref_img = ImageRef::new(ref_path, size);
                    info!("Updated reference for {} '{}'", test_id, state_name);

                    outcome.applied.push(AssertViewResult {
                        state_name: state_name.clone(),
                        ref_img: ref_img.clone(),
                        curr_img: actual,
                    });

                    let mut accepted = image.clone();
                    accepted.expected_img = Some(ref_img.clone());
                    accepted.diff_img = None;
                    accepted.status = Some(TestStatus::Updated);
                    updated_images.push(accepted);

                    self.events.publish(ClientEvent::UpdateReference {
                        ref_img,
                        state: state_name,
                    });
                }
                Err(e) => {
                    warn!("Reference update failed for {} '{}': {}", test_id, state_name, e);
                    outcome.failures.push(ImageFailure {
                        test_id: test_id.clone(),
                        state_name: state_name.clone(),
                        error: Error::ImageWrite {
                            test_id: test_id.to_string(),
                            state_name,
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        if outcome.applied.is_empty() {
            return outcome;
        }

        let suite_path = test.node_path();
        self.report.add_updated(FormattedResult {
            suite_path: suite_path.clone(),
            browser_id: request.browser_id.clone(),
            result: TestResult {
                status: TestStatus::Updated,
                attempt: request.attempt,
                images_info: updated_images,
                assert_view_results: outcome.applied.clone(),
                meta_info: request.meta_info.clone(),
                error: None,
                skip_reason: None,
            },
        });

        outcome.node = self
            .report
            .find_test_result(&suite_path, &request.browser_id)
            .cloned();
        outcome
    }
}
