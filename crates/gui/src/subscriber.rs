//! Turns engine lifecycle events into report mutations and client events

use refshot_common::{Result, TestStatus};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::{EngineEvent, LiveResult};
use crate::events::{ClientEvent, EventSource};
use crate::report::ReportBuilder;

/// Applies lifecycle events of one run to the shared report
pub struct ReportSubscriber<'a> {
    report: &'a mut ReportBuilder,
    events: &'a EventSource,
    report_path: &'a Path,
}

impl<'a> ReportSubscriber<'a> {
    pub fn new(report: &'a mut ReportBuilder, events: &'a EventSource, report_path: &'a Path) -> Self {
        Self {
            report,
            events,
            report_path,
        }
    }

    pub fn handle(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::RunBegin => {
                debug!("Run started");
            }
            EngineEvent::TestBegin(result) => {
                self.report.add_running(&result);
                let formatted = self.report.format(&result, TestStatus::Running);
                self.events.publish(ClientEvent::BeginState(formatted));
            }
            EngineEvent::TestPass(result) => {
                self.report.add_success(&result);
                let formatted = self.report.format(&result, TestStatus::Success);
                self.events.publish(ClientEvent::TestResult(formatted));
            }
            EngineEvent::TestFail(result) => {
                let status = self.record_failure(&result);
                let formatted = self.report.format(&result, status);
                self.events.publish(ClientEvent::TestResult(formatted));
            }
            EngineEvent::Retry(result) => {
                let status = self.record_failure(&result);
                let formatted = self.report.format(&result, status);
                self.events.publish(ClientEvent::Retry(formatted));
            }
            EngineEvent::TestPending(result) => {
                self.report.add_pending(&result);
                let formatted = self.report.format(&result, TestStatus::Skipped);
                self.events.publish(ClientEvent::TestResult(formatted));
            }
            EngineEvent::RunEnd => {
                info!("Run finished");
                self.report.save_data_file(self.report_path)?;
                self.events.publish(ClientEvent::End);
            }
        }
        Ok(())
    }

    /// A failure with an image diff is FAIL, anything else is ERROR
    fn record_failure(&mut self, result: &LiveResult) -> TestStatus {
        if result.has_diff() {
            self.report.add_fail(result);
            TestStatus::Fail
        } else {
            self.report.add_error(result);
            TestStatus::Error
        }
    }
}
