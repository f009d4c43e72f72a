//! Refshot GUI Core
//!
//! Orchestration behind the screenshot-testing GUI:
//! - Registers every discovered test under a stable identity
//! - Seeds the result tree from the previous report
//! - Runs all tests or a selection and streams live results to clients
//! - Promotes captured screenshots to reference images
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ToolRunner                                              │
//! │    ├── initialize()      discover + register + reuse     │
//! │    ├── run(selectors)    TestEngine ──► ReportSubscriber │
//! │    │                                    ├── ReportBuilder│
//! │    │                                    └── EventSource ─┼──► clients
//! │    └── update_reference_images(requests)                 │
//! │              └── ReferenceUpdater ──► ImageStore         │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controls;
pub mod engine;
pub mod events;
pub mod manifest;
pub mod reference;
pub mod report;
pub mod reuse;
pub mod runner;
pub mod subscriber;
pub mod tool_runner;

pub use config::{BrowserConfig, GrepPattern, GuiConfig, RunFilter};
pub use controls::{Controls, ControlsState, SharedControls};
pub use engine::{EngineEvent, EventSink, LiveResult, TestCollection, TestDefinition, TestEngine};
pub use events::{ClientEvent, Connection, EventSource, Observer, SubscriptionId};
pub use manifest::ManifestEngine;
pub use reference::{FsImageStore, ImageStore, UpdateBatch, UpdateRequest};
pub use report::{FormattedResult, ReportBuilder};
pub use runner::{Runner, TestSelector};
pub use tool_runner::ToolRunner;
