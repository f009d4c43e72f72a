//! Declarative YAML test engine
//!
//! Each manifest file describes one suite chain and the tests inside it,
//! together with a scripted outcome and the screenshots each test captures.
//! The engine replays those scripts, which makes it usable both from the
//! command line and as a deterministic stand-in for a browser farm.

use async_trait::async_trait;
use parking_lot::Mutex;
use refshot_common::{
    Error, ImageInfo, ImageRef, ImageSize, MetaInfo, Result, TestId, TestIdentity, TestStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::engine::{
    EngineEvent, EventSink, LiveResult, RunFilter, TestCollection, TestDefinition, TestEngine,
};

/// One manifest file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteManifest {
    /// Suite titles, root first
    pub suite: Vec<String>,

    /// Browsers every test runs in unless it names its own
    #[serde(default)]
    pub browsers: Vec<String>,

    pub tests: Vec<TestManifest>,
}

/// A test and its scripted behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestManifest {
    pub title: String,

    #[serde(default)]
    pub browsers: Vec<String>,

    #[serde(default)]
    pub pending: bool,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub silent_skip: bool,

    #[serde(default)]
    pub skip_reason: Option<String>,

    #[serde(default)]
    pub outcome: Outcome,

    /// Failed attempts before the final outcome
    #[serde(default)]
    pub retries: u32,

    /// Message reported with an `error` outcome
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub states: Vec<StateManifest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pass,
    /// Screenshots differ from their references
    Fail,
    /// The test crashed before comparing
    Error,
}

/// A captured state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateManifest {
    pub name: String,

    /// Screenshot taken by the test
    pub actual: PathBuf,

    #[serde(default)]
    pub expected: Option<PathBuf>,

    #[serde(default)]
    pub diff: Option<PathBuf>,
}

impl SuiteManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a manifest; image paths are resolved against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut manifest = Self::from_yaml(&content)?;

        if let Some(dir) = path.parent() {
            for state in manifest.tests.iter_mut().flat_map(|t| t.states.iter_mut()) {
                state.actual = dir.join(&state.actual);
                state.expected = state.expected.take().map(|p| dir.join(p));
                state.diff = state.diff.take().map(|p| dir.join(p));
            }
        }
        Ok(manifest)
    }

    /// Load every manifest named by `paths`; directories are walked for
    /// `.yaml`/`.yml` files in name order
    pub fn load_all(paths: &[PathBuf]) -> Result<Vec<(PathBuf, Self)>> {
        let mut manifests = Vec::new();

        for path in paths {
            let files: Vec<PathBuf> = if path.is_dir() {
                walkdir::WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| {
                        e.path()
                            .extension()
                            .map(|ext| ext == "yaml" || ext == "yml")
                            .unwrap_or(false)
                    })
                    .map(|e| e.into_path())
                    .collect()
            } else {
                vec![path.clone()]
            };

            for file in files {
                let manifest = Self::from_file(&file).map_err(|e| {
                    Error::Discovery(format!("{}: {}", file.display(), e))
                })?;
                manifests.push((file, manifest));
            }
        }

        Ok(manifests)
    }
}

impl TestManifest {
    fn definition(&self, suite: &[String], browser_id: &str, file: &Path) -> TestDefinition {
        TestDefinition {
            parents: suite.to_vec(),
            title: self.title.clone(),
            browser_id: browser_id.to_string(),
            file: Some(file.to_path_buf()),
            disabled: self.disabled,
            silent_skip: self.silent_skip,
            pending: self.pending,
            skip_reason: self.skip_reason.clone(),
        }
    }

    /// Result of one attempt ending with `outcome`
    fn live_result(&self, test: &TestDefinition, attempt: u32, outcome: Outcome) -> LiveResult {
        let status = match outcome {
            Outcome::Pass => TestStatus::Success,
            Outcome::Fail => TestStatus::Fail,
            Outcome::Error => TestStatus::Error,
        };

        let mut result = LiveResult::for_test(test);
        result.attempt = attempt;
        result.meta_info = MetaInfo {
            url: self.url.clone(),
            session_id: None,
            file: test.file.as_ref().map(|f| f.display().to_string()),
        };
        result.images_info = self
            .states
            .iter()
            .map(|state| ImageInfo {
                state_name: state.name.clone(),
                status: Some(status),
                actual_img: Some(ImageRef::new(&state.actual, ImageSize::default())),
                expected_img: state
                    .expected
                    .as_ref()
                    .map(|p| ImageRef::new(p, ImageSize::default())),
                diff_img: match outcome {
                    Outcome::Fail => state
                        .diff
                        .as_ref()
                        .map(|p| ImageRef::new(p, ImageSize::default())),
                    _ => None,
                },
            })
            .collect();
        if outcome == Outcome::Error {
            result.error = Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| "test failed".to_string()),
            );
        }
        result
    }
}

/// Test engine replaying YAML manifests
pub struct ManifestEngine {
    /// Browsers used when a manifest names none
    default_browsers: Vec<String>,
    /// Named groups of manifest files or directories
    sets: BTreeMap<String, Vec<PathBuf>>,
    scripts: Mutex<HashMap<TestId, TestManifest>>,
}

impl ManifestEngine {
    pub fn new<I, S>(default_browsers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_browsers: default_browsers.into_iter().map(Into::into).collect(),
            sets: BTreeMap::new(),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sets(mut self, sets: BTreeMap<String, Vec<PathBuf>>) -> Self {
        self.sets = sets;
        self
    }

    /// Roots a manifest must live under, `None` when no set is selected
    fn set_roots(&self, names: &[String]) -> Result<Option<Vec<PathBuf>>> {
        if names.is_empty() {
            return Ok(None);
        }

        let mut roots = Vec::new();
        for name in names {
            let paths = self.sets.get(name).ok_or_else(|| {
                Error::InvalidConfig(format!("unknown test set '{}'", name))
            })?;
            roots.extend(paths.iter().cloned());
        }
        Ok(Some(roots))
    }

    fn emit(events: &EventSink, event: EngineEvent) -> Result<()> {
        events
            .send(event)
            .map_err(|_| Error::Engine("event receiver dropped".to_string()))
    }
}

#[async_trait]
impl TestEngine for ManifestEngine {
    async fn discover(&self, files: &[PathBuf], filter: &RunFilter) -> Result<TestCollection> {
        let roots = self.set_roots(&filter.sets)?;
        let mut manifests = SuiteManifest::load_all(files)?;
        if let Some(roots) = &roots {
            manifests.retain(|(file, _)| roots.iter().any(|root| file.starts_with(root)));
        }

        let mut tests = Vec::new();
        let mut scripts = HashMap::new();

        for (file, manifest) in &manifests {
            for test in &manifest.tests {
                let browsers = [&test.browsers, &manifest.browsers, &self.default_browsers]
                    .into_iter()
                    .find(|b| !b.is_empty())
                    .ok_or_else(|| {
                        Error::Discovery(format!(
                            "{}: no browsers for test '{}'",
                            file.display(),
                            test.title
                        ))
                    })?;

                for browser_id in browsers {
                    let definition = test.definition(&manifest.suite, browser_id, file);
                    if !filter.allows(&definition) {
                        continue;
                    }
                    scripts.insert(definition.test_id(), test.clone());
                    tests.push(definition);
                }
            }
        }

        info!(
            "Discovered {} test(s) in {} manifest(s)",
            tests.len(),
            manifests.len()
        );
        *self.scripts.lock() = scripts;
        Ok(TestCollection::new(tests))
    }

    async fn execute(
        &self,
        collection: TestCollection,
        filter: &RunFilter,
        events: EventSink,
    ) -> Result<()> {
        Self::emit(&events, EngineEvent::RunBegin)?;

        for test in collection.tests() {
            if !filter.allows(test) {
                continue;
            }
            let id = test.test_id();
            let script = self
                .scripts
                .lock()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::not_found("test", id.as_str()))?;

            if test.pending {
                Self::emit(&events, EngineEvent::TestPending(LiveResult::for_test(test)))?;
                continue;
            }

            for attempt in 0..script.retries {
                debug!("{} attempt {} fails", id, attempt);
                let begin = script.live_result(test, attempt, Outcome::Pass);
                Self::emit(&events, EngineEvent::TestBegin(begin))?;
                let failed = script.live_result(test, attempt, Outcome::Fail);
                Self::emit(&events, EngineEvent::Retry(failed))?;
            }

            let attempt = script.retries;
            let begin = script.live_result(test, attempt, Outcome::Pass);
            Self::emit(&events, EngineEvent::TestBegin(begin))?;
            let result = script.live_result(test, attempt, script.outcome);
            let event = match script.outcome {
                Outcome::Pass => EngineEvent::TestPass(result),
                Outcome::Fail | Outcome::Error => EngineEvent::TestFail(result),
            };
            Self::emit(&events, event)?;
        }

        Self::emit(&events, EngineEvent::RunEnd)
    }
}
