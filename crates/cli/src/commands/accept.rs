//! Accept Command

use anyhow::Result;
use refshot_gui::GuiConfig;

use super::open_runner;
use crate::output::{print_error, print_success, print_warning};

/// Promote the captured images of every failed test to references
pub async fn execute(config: GuiConfig) -> Result<()> {
    let mut runner = open_runner(config).await?;

    if !runner.controls().accept_opened {
        print_warning("No failed tests to accept");
        return Ok(());
    }

    let batch = runner.accept_failed().await;
    for test in &batch.tests {
        for applied in &test.applied {
            print_success(&format!("{} '{}'", test.test_id, applied.state_name));
        }
    }
    for failure in batch.failures() {
        print_error(&format!("{} '{}': {}", failure.test_id, failure.state_name, failure.error));
    }

    runner.finalize()?;
    batch.into_result()?;
    Ok(())
}
