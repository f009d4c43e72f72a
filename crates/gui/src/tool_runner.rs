//! The GUI runner: owns the collection, the report and the client channel

use refshot_common::{Error, Result, ResultTree, TestId, TestIdentity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::GuiConfig;
use crate::controls::{Controls, SharedControls};
use crate::engine::{TestCollection, TestDefinition, TestEngine};
use crate::events::{ClientEvent, Connection, EventSource, Observer, SubscriptionId};
use crate::reference::{
    accept_requests_for_failed, FsImageStore, ImageStore, ReferenceUpdater, UpdateBatch,
    UpdateRequest,
};
use crate::report::ReportBuilder;
use crate::reuse::{apply_reuse, ReuseRecord};
use crate::runner::{failed_selectors, Runner, TestSelector};
use crate::subscriber::ReportSubscriber;

/// Orchestrates discovery, partial runs and reference updates.
///
/// Only one mutating operation (`run`, `update_reference_images`,
/// `accept_failed`) may be in flight at a time; callers serialize them.
pub struct ToolRunner {
    engine: Arc<dyn TestEngine>,
    config: GuiConfig,
    store: Box<dyn ImageStore>,
    events: EventSource,
    collection: Option<TestCollection>,
    tests: HashMap<TestId, TestDefinition>,
    report: ReportBuilder,
    state: SharedControls,
}

impl ToolRunner {
    pub fn new(engine: Arc<dyn TestEngine>, config: GuiConfig) -> Self {
        let store = Box::new(FsImageStore::new(config.report_path.clone()));
        Self {
            engine,
            state: SharedControls::default(),
            config,
            store,
            events: EventSource::new(),
            collection: None,
            tests: HashMap::new(),
            report: ReportBuilder::new(),
        }
    }

    /// Replace the filesystem image store
    pub fn with_image_store(mut self, store: Box<dyn ImageStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &GuiConfig {
        &self.config
    }

    pub fn collection(&self) -> Option<&TestCollection> {
        self.collection.as_ref()
    }

    pub fn test(&self, id: &TestId) -> Option<&TestDefinition> {
        self.tests.get(id)
    }

    pub fn report(&self) -> &ReportBuilder {
        &self.report
    }

    pub fn events(&self) -> &EventSource {
        &self.events
    }

    /// Discover tests and build the initial tree, seeded from the last report
    pub async fn initialize(&mut self) -> Result<()> {
        let collection = self
            .engine
            .discover(&self.config.test_files, &self.config.filter)
            .await?;

        self.handle_runnable_collection(collection)
    }

    fn handle_runnable_collection(&mut self, collection: TestCollection) -> Result<()> {
        let mut tests: HashMap<TestId, TestDefinition> = HashMap::new();
        let mut report = ReportBuilder::new();

        for test in collection.tests() {
            if !test.is_runnable() {
                continue;
            }

            let id = test.test_id();
            if let Some(existing) = tests.get(&id) {
                return Err(Error::IdentityCollision {
                    id: id.to_string(),
                    first: existing.full_title(),
                    second: test.full_title(),
                });
            }

            if test.pending {
                report.add_skipped(test);
            } else {
                report.add_idle(test);
            }
            tests.insert(id, test.clone());
        }

        let reuse = ReuseRecord::load(&self.config.report_path);
        if apply_reuse(report.suites_mut(), &reuse) {
            debug!("Seeded tree from {}", self.config.report_path.display());
        }

        info!(
            "Registered {} test(s) out of {} discovered",
            tests.len(),
            collection.len()
        );

        self.tests = tests;
        self.report = report;
        self.collection = Some(collection);
        Ok(())
    }

    /// Current tree, flagged for the GUI
    pub fn tree(&self) -> ResultTree {
        let mut tree = self.report.get_result();
        tree.gui = true;
        tree.auto_run = self.config.auto_run;
        tree
    }

    /// Execute the selected tests, or all of them when `selectors` is empty.
    ///
    /// Test failures end up in the report; only a failure of the engine (or
    /// of persisting the report) is returned.
    pub async fn run(&mut self, selectors: &[TestSelector]) -> Result<()> {
        let collection = self
            .collection
            .as_ref()
            .ok_or_else(|| Error::Engine("runner is not initialized".to_string()))?;
        let sub_collection = Runner::create(selectors).collection(collection, &self.config.filter);

        info!("Running {} test(s)", sub_collection.len());
        self.state.update(|state| state.running = true);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = self.engine.clone();
        let filter = self.config.filter.clone();
        let execution = async move { engine.execute(sub_collection, &filter, tx).await };

        let mut subscriber =
            ReportSubscriber::new(&mut self.report, &self.events, &self.config.report_path);
        let handling = async {
            let mut first_error = None;
            while let Some(event) = rx.recv().await {
                if let Err(e) = subscriber.handle(event) {
                    error!("Failed to record engine event: {}", e);
                    first_error.get_or_insert(e);
                }
            }
            first_error
        };

        let (outcome, handling_error) = tokio::join!(execution, handling);
        self.state.update(|state| state.running = false);

        outcome?;
        match handling_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Re-run every test whose latest result failed; no-op when none did
    pub async fn run_failed(&mut self) -> Result<()> {
        let selectors = failed_selectors(self.report.get_suites());
        if selectors.is_empty() {
            info!("No failed tests to retry");
            return Ok(());
        }
        self.run(&selectors).await
    }

    /// Promote captured images to references, test by test
    pub async fn update_reference_images(&mut self, requests: Vec<UpdateRequest>) -> UpdateBatch {
        self.state.update(|state| state.processing = true);

        let mut updater = ReferenceUpdater {
            tests: &self.tests,
            config: &self.config,
            report: &mut self.report,
            events: &self.events,
            store: self.store.as_ref(),
        };
        let batch = updater.update(requests).await;

        self.state.update(|state| state.processing = false);
        batch
    }

    /// Accept the captured images of every failed test
    pub async fn accept_failed(&mut self) -> UpdateBatch {
        let requests = accept_requests_for_failed(self.report.get_suites());
        self.update_reference_images(requests).await
    }

    /// Attach a client connection
    pub fn add_client(&self, connection: Connection) -> SubscriptionId {
        self.events.subscribe(connection)
    }

    pub fn subscribe(&self, observer: impl Observer + 'static) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    /// Relay a named event to every client
    pub fn send_client_event(&self, name: &str, data: serde_json::Value) {
        self.events.publish(ClientEvent::Custom {
            name: name.to_string(),
            data,
        });
    }

    /// Handle observing the running and processing flags from outside
    pub fn controls_handle(&self) -> SharedControls {
        self.state.clone()
    }

    pub fn controls(&self) -> Controls {
        let failed = failed_selectors(self.report.get_suites()).len();
        self.state.controls(self.report.get_suites().len(), failed)
    }

    /// Persist the report
    pub fn finalize(&self) -> Result<()> {
        self.report.save_data_file(&self.config.report_path)
    }

    pub fn stop_server(&mut self) -> Result<()> {
        self.state.update(|state| state.server_stopped = true);
        self.finalize()
    }
}
