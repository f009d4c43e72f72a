//! End-to-end tests of the GUI runner
//!
//! Drives `ToolRunner` with an in-memory engine and a store that can be told
//! to fail for given states.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use refshot_common::{
    Error, ImageInfo, ImageRef, ImageSize, Result, TestId, TestIdentity, TestStatus,
};
use refshot_gui::{
    BrowserConfig, ClientEvent, Connection, EngineEvent, EventSink, FsImageStore, GrepPattern,
    GuiConfig, ImageStore, LiveResult, ManifestEngine, ReportBuilder, RunFilter, TestCollection,
    TestDefinition, TestEngine, TestSelector, ToolRunner, UpdateRequest,
};
use tempfile::TempDir;

/// Engine replaying canned outcomes and recording what it ran
#[derive(Default)]
struct FakeEngine {
    tests: Vec<TestDefinition>,
    /// Images reported by failing tests
    failing: HashMap<TestId, Vec<ImageInfo>>,
    broken: bool,
    executed: Mutex<Vec<TestId>>,
}

impl FakeEngine {
    fn new(tests: Vec<TestDefinition>) -> Self {
        Self {
            tests,
            ..Default::default()
        }
    }

    fn failing(mut self, test: &TestDefinition, images: Vec<ImageInfo>) -> Self {
        self.failing.insert(test.test_id(), images);
        self
    }

    fn executed(&self) -> Vec<TestId> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl TestEngine for FakeEngine {
    async fn discover(&self, _files: &[PathBuf], _filter: &RunFilter) -> Result<TestCollection> {
        Ok(TestCollection::new(self.tests.clone()))
    }

    async fn execute(
        &self,
        collection: TestCollection,
        _filter: &RunFilter,
        events: EventSink,
    ) -> Result<()> {
        if self.broken {
            return Err(Error::Engine("browser farm unreachable".to_string()));
        }

        events.send(EngineEvent::RunBegin).unwrap();
        for test in collection.tests() {
            self.executed.lock().push(test.test_id());
            let mut result = LiveResult::for_test(test);
            events.send(EngineEvent::TestBegin(result.clone())).unwrap();

            match self.failing.get(&test.test_id()) {
                Some(images) => {
                    result.images_info = images.clone();
                    events.send(EngineEvent::TestFail(result)).unwrap();
                }
                None => events.send(EngineEvent::TestPass(result)).unwrap(),
            }
        }
        events.send(EngineEvent::RunEnd).unwrap();
        Ok(())
    }
}

/// Filesystem store refusing to write some states
struct FlakyStore {
    inner: FsImageStore,
    refuse: Vec<String>,
}

#[async_trait]
impl ImageStore for FlakyStore {
    async fn write_reference(&self, actual: &ImageRef, reference: &Path) -> Result<ImageSize> {
        let state = reference
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.refuse.contains(&state) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only reference directory",
            )));
        }
        self.inner.write_reference(actual, reference).await
    }
}

fn path(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn three_tests() -> Vec<TestDefinition> {
    vec![
        TestDefinition::new(&["Login"], "opens", "chrome"),
        TestDefinition::new(&["Login"], "opens", "firefox"),
        TestDefinition::new(&["Search"], "finds", "chrome"),
    ]
}

fn config(dir: &TempDir) -> GuiConfig {
    let mut browsers = BTreeMap::new();
    browsers.insert(
        "chrome".to_string(),
        BrowserConfig::new(dir.path().join("refs")),
    );
    browsers.insert(
        "firefox".to_string(),
        BrowserConfig::new(dir.path().join("refs")),
    );
    GuiConfig {
        report_path: dir.path().join("report"),
        browsers,
        ..Default::default()
    }
}

fn status_of(runner: &ToolRunner, parts: &[&str], browser: &str) -> TestStatus {
    runner
        .report()
        .find_test_result(&path(parts), browser)
        .map(|b| b.status())
        .unwrap_or_else(|| panic!("no result for {:?} in {}", parts, browser))
}

fn png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::new(4, 3).save(&path).unwrap();
    path
}

#[tokio::test]
async fn test_initialize_builds_idle_tree() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    let tree = runner.tree();
    assert!(tree.gui);
    assert_eq!(tree.suites.len(), 2);
    assert!(tree.suites.iter().all(|s| s.status == TestStatus::Idle));
    assert_eq!(status_of(&runner, &["Login", "opens"], "firefox"), TestStatus::Idle);
}

#[tokio::test]
async fn test_grep_narrows_discovered_tree() {
    let dir = TempDir::new().unwrap();
    let manifests = dir.path().join("manifests");
    std::fs::create_dir_all(&manifests).unwrap();
    std::fs::write(
        manifests.join("login.yaml"),
        "suite: [Login]\nbrowsers: [chrome]\ntests:\n  - title: opens\n  - title: closes\n",
    )
    .unwrap();
    std::fs::write(
        manifests.join("search.yaml"),
        "suite: [Search]\nbrowsers: [chrome]\ntests:\n  - title: finds\n",
    )
    .unwrap();

    let mut config = config(&dir);
    config.test_files = vec![manifests];
    config.filter.grep = Some(GrepPattern::new("Login").unwrap());
    let engine = ManifestEngine::new(config.browsers.keys().cloned());
    let mut runner = ToolRunner::new(Arc::new(engine), config);
    runner.initialize().await.unwrap();

    let roots: Vec<_> = runner.tree().suites.iter().map(|s| s.name.clone()).collect();
    assert_eq!(roots, vec!["Login".to_string()]);
    let search = TestDefinition::new(&["Search"], "finds", "chrome");
    assert!(runner.test(&search.test_id()).is_none());
    let opens = TestDefinition::new(&["Login"], "opens", "chrome");
    assert!(runner.test(&opens.test_id()).is_some());
}

#[tokio::test]
async fn test_run_selection_executes_only_selected() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine.clone(), config(&dir));
    runner.initialize().await.unwrap();

    runner
        .run(&[TestSelector::new("Login opens", "chrome")])
        .await
        .unwrap();

    let expected = TestDefinition::new(&["Login"], "opens", "chrome").test_id();
    assert_eq!(engine.executed(), vec![expected]);
    assert_eq!(status_of(&runner, &["Login", "opens"], "chrome"), TestStatus::Success);
    assert_eq!(status_of(&runner, &["Login", "opens"], "firefox"), TestStatus::Idle);
    assert_eq!(status_of(&runner, &["Search", "finds"], "chrome"), TestStatus::Idle);
    assert!(dir.path().join("report/data.json").exists());
}

#[tokio::test]
async fn test_run_without_selection_executes_everything() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine.clone(), config(&dir));
    runner.initialize().await.unwrap();

    runner.run(&[]).await.unwrap();

    assert_eq!(engine.executed().len(), 3);
    assert!(runner
        .tree()
        .suites
        .iter()
        .all(|s| s.status == TestStatus::Success));
}

#[tokio::test]
async fn test_global_filter_caps_selection() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut config = config(&dir);
    config.filter.browsers = vec!["firefox".to_string()];
    let mut runner = ToolRunner::new(engine.clone(), config);
    runner.initialize().await.unwrap();

    runner
        .run(&[TestSelector::new("Login opens", "chrome")])
        .await
        .unwrap();
    assert!(engine.executed().is_empty());

    runner.run(&[]).await.unwrap();
    let firefox = TestDefinition::new(&["Login"], "opens", "firefox").test_id();
    assert_eq!(engine.executed(), vec![firefox]);
}

#[tokio::test]
async fn test_reuse_seeds_previous_results() {
    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("report");

    // A previous session left a failed chrome result behind
    let mut previous = ReportBuilder::new();
    let failed = TestDefinition::new(&["Login"], "opens", "chrome");
    previous.add_idle(&failed);
    previous.add_fail(&LiveResult::for_test(&failed));
    previous.save_data_file(&report_path).unwrap();

    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    assert_eq!(status_of(&runner, &["Login", "opens"], "chrome"), TestStatus::Fail);
    assert_eq!(status_of(&runner, &["Login", "opens"], "firefox"), TestStatus::Idle);

    let tree = runner.tree();
    let login = tree.suites.iter().find(|s| s.name == "Login").unwrap();
    let search = tree.suites.iter().find(|s| s.name == "Search").unwrap();
    assert_eq!(login.status, TestStatus::Fail);
    assert_eq!(search.status, TestStatus::Idle);
}

#[tokio::test]
async fn test_malformed_reuse_data_is_ignored() {
    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("report");
    std::fs::create_dir_all(&report_path).unwrap();
    std::fs::write(report_path.join("data.json"), "{ not json").unwrap();

    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    assert!(runner
        .tree()
        .suites
        .iter()
        .all(|s| s.status == TestStatus::Idle));
}

#[tokio::test]
async fn test_identity_collision_fails_initialize() {
    let dir = TempDir::new().unwrap();
    // Both flatten to "Login form opens"
    let engine = Arc::new(FakeEngine::new(vec![
        TestDefinition::new(&["Login form"], "opens", "chrome"),
        TestDefinition::new(&["Login"], "form opens", "chrome"),
    ]));
    let mut runner = ToolRunner::new(engine, config(&dir));

    let result = runner.initialize().await;
    assert!(matches!(result, Err(Error::IdentityCollision { .. })));
}

#[tokio::test]
async fn test_disabled_and_pending_tests() {
    let dir = TempDir::new().unwrap();
    let mut disabled = TestDefinition::new(&["Login"], "closes", "chrome");
    disabled.disabled = true;
    let mut pending = TestDefinition::new(&["Login"], "remembers", "chrome");
    pending.pending = true;

    let engine = Arc::new(FakeEngine::new(vec![disabled.clone(), pending]));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    assert!(runner.test(&disabled.test_id()).is_none());
    assert_eq!(
        status_of(&runner, &["Login", "remembers"], "chrome"),
        TestStatus::Skipped
    );
}

#[tokio::test]
async fn test_engine_failure_is_returned() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine {
        broken: true,
        ..FakeEngine::new(three_tests())
    });
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    let result = runner.run(&[]).await;
    assert!(matches!(result, Err(Error::Engine(_))));
    assert!(runner.controls().run_all);
}

#[tokio::test]
async fn test_clients_receive_live_events() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new(three_tests()));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    let (connection, mut rx) = Connection::new();
    runner.add_client(connection);

    runner
        .run(&[TestSelector::new("Search finds", "chrome")])
        .await
        .unwrap();
    runner.send_client_event("PING", serde_json::json!({ "n": 1 }));

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name().to_string());
    }
    assert_eq!(names, vec!["BEGIN_STATE", "TEST_RESULT", "END", "PING"]);
}

#[tokio::test]
async fn test_controls_report_work_in_flight() {
    let dir = TempDir::new().unwrap();
    let shots = dir.path().join("shots");
    std::fs::create_dir_all(&shots).unwrap();
    let plain = png(&shots, "plain.png");

    let test = TestDefinition::new(&["Login"], "opens", "chrome");
    let engine = Arc::new(FakeEngine::new(vec![test.clone()]));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();

    let handle = runner.controls_handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    runner.subscribe(move |event: &ClientEvent| {
        let state = handle.snapshot();
        match event {
            ClientEvent::BeginState(_) => sink.lock().push(("running", state.running)),
            ClientEvent::UpdateReference { .. } => {
                sink.lock().push(("processing", state.processing))
            }
            _ => {}
        }
    });

    runner.run(&[]).await.unwrap();
    runner
        .update_reference_images(vec![UpdateRequest {
            suite_path: test.node_path(),
            browser_id: "chrome".to_string(),
            attempt: 0,
            meta_info: Default::default(),
            images_info: vec![ImageInfo::actual(
                "plain",
                ImageRef::new(&plain, ImageSize::default()),
            )],
        }])
        .await
        .into_result()
        .unwrap();

    assert_eq!(*seen.lock(), vec![("running", true), ("processing", true)]);
    let state = runner.controls_handle().snapshot();
    assert!(!state.running);
    assert!(!state.processing);
    assert!(runner.controls().run_all);
}

#[tokio::test]
async fn test_run_failed_retries_only_failures() {
    let dir = TempDir::new().unwrap();
    let tests = three_tests();
    let shot = ImageInfo {
        status: Some(TestStatus::Fail),
        ..ImageInfo::actual("plain", ImageRef::new("plain.png", ImageSize::default()))
    };
    let engine = Arc::new(FakeEngine::new(tests.clone()).failing(&tests[2], vec![shot]));
    let mut runner = ToolRunner::new(engine.clone(), config(&dir));
    runner.initialize().await.unwrap();

    runner.run(&[]).await.unwrap();
    assert_eq!(status_of(&runner, &["Search", "finds"], "chrome"), TestStatus::Fail);
    let controls = runner.controls();
    assert!(controls.retry_failed);
    assert!(controls.accept_opened);

    runner.run_failed().await.unwrap();
    let executed = engine.executed();
    assert_eq!(executed.len(), 4);
    assert_eq!(executed[3], tests[2].test_id());
}

#[tokio::test]
async fn test_reference_update_keeps_going_after_failed_image() {
    let dir = TempDir::new().unwrap();
    let shots = dir.path().join("shots");
    std::fs::create_dir_all(&shots).unwrap();
    let state1 = png(&shots, "state1.png");
    let state2 = png(&shots, "state2.png");

    let test = TestDefinition::new(&["Login"], "opens", "chrome");
    let images = vec![
        ImageInfo::actual("state1", ImageRef::new(&state1, ImageSize::default())),
        ImageInfo::actual("state2", ImageRef::new(&state2, ImageSize::default())),
    ];
    let engine = Arc::new(FakeEngine::new(vec![test.clone()]));
    let store = FlakyStore {
        inner: FsImageStore::new(dir.path().join("report")),
        refuse: vec!["state2".to_string()],
    };
    let mut runner = ToolRunner::new(engine, config(&dir)).with_image_store(Box::new(store));
    runner.initialize().await.unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    runner.subscribe(move |event: &ClientEvent| {
        if let ClientEvent::UpdateReference { state, .. } = event {
            sink.lock().push(state.clone());
        }
    });

    let batch = runner
        .update_reference_images(vec![UpdateRequest {
            suite_path: test.node_path(),
            browser_id: "chrome".to_string(),
            attempt: 0,
            meta_info: Default::default(),
            images_info: images,
        }])
        .await;

    assert_eq!(*updates.lock(), vec!["state1".to_string()]);

    let refs = dir.path().join("refs").join(test.title_hash()).join("chrome");
    assert!(refs.join("state1.png").exists());
    assert!(!refs.join("state2.png").exists());

    let leaf = runner
        .report()
        .find_test_result(&test.node_path(), "chrome")
        .unwrap();
    assert_eq!(leaf.status(), TestStatus::Updated);
    assert_eq!(leaf.result.assert_view_results.len(), 1);
    assert_eq!(leaf.result.assert_view_results[0].ref_img.size.width, 4);

    match batch.into_result() {
        Err(Error::ReferenceUpdate(failed)) => {
            assert_eq!(failed, vec![(test.test_id().to_string(), "state2".to_string())]);
        }
        other => panic!("expected a reference update failure, got {:?}", other.map(|t| t.len())),
    }
}

#[tokio::test]
async fn test_failed_update_leaves_other_tests_untouched() {
    let dir = TempDir::new().unwrap();
    let shots = dir.path().join("shots");
    std::fs::create_dir_all(&shots).unwrap();
    let plain = png(&shots, "plain.png");
    let broken = png(&shots, "broken.png");

    let tests = three_tests();
    let (login, search) = (tests[0].clone(), tests[2].clone());
    let engine = Arc::new(FakeEngine::new(tests));
    let store = FlakyStore {
        inner: FsImageStore::new(dir.path().join("report")),
        refuse: vec!["broken".to_string()],
    };
    let mut runner = ToolRunner::new(engine, config(&dir)).with_image_store(Box::new(store));
    runner.initialize().await.unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    runner.subscribe(move |event: &ClientEvent| {
        if let ClientEvent::UpdateReference { state, .. } = event {
            sink.lock().push(state.clone());
        }
    });

    let request = |test: &TestDefinition, state: &str, actual: &Path| UpdateRequest {
        suite_path: test.node_path(),
        browser_id: test.browser_id.clone(),
        attempt: 0,
        meta_info: Default::default(),
        images_info: vec![ImageInfo::actual(
            state,
            ImageRef::new(actual, ImageSize::default()),
        )],
    };
    let batch = runner
        .update_reference_images(vec![
            request(&login, "plain", &plain),
            request(&search, "broken", &broken),
        ])
        .await;

    assert_eq!(*updates.lock(), vec!["plain".to_string()]);
    assert_eq!(status_of(&runner, &["Login", "opens"], "chrome"), TestStatus::Updated);
    assert_eq!(status_of(&runner, &["Search", "finds"], "chrome"), TestStatus::Idle);
    let leaf = runner
        .report()
        .find_test_result(&search.node_path(), "chrome")
        .unwrap();
    assert!(leaf.result.assert_view_results.is_empty());

    match batch.into_result() {
        Err(Error::ReferenceUpdate(failed)) => {
            assert_eq!(failed, vec![(search.test_id().to_string(), "broken".to_string())]);
        }
        other => panic!("expected a reference update failure, got {:?}", other.map(|t| t.len())),
    }
}

#[tokio::test]
async fn test_accept_failed_promotes_failed_images() {
    let dir = TempDir::new().unwrap();
    let shots = dir.path().join("shots");
    std::fs::create_dir_all(&shots).unwrap();
    let actual = png(&shots, "plain.png");

    let tests = three_tests();
    let shot = ImageInfo {
        status: Some(TestStatus::Fail),
        ..ImageInfo::actual("plain", ImageRef::new(&actual, ImageSize::default()))
    };
    let engine = Arc::new(FakeEngine::new(tests.clone()).failing(&tests[0], vec![shot]));
    let mut runner = ToolRunner::new(engine, config(&dir));
    runner.initialize().await.unwrap();
    runner.run(&[]).await.unwrap();

    let batch = runner.accept_failed().await;
    let updates = batch.into_result().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].is_complete());
    assert_eq!(status_of(&runner, &["Login", "opens"], "chrome"), TestStatus::Updated);
    assert!(!runner.controls().retry_failed);

    runner.finalize().unwrap();
    let saved = std::fs::read_to_string(dir.path().join("report/data.json")).unwrap();
    assert!(saved.contains("\"updated\""));
}
