//! Run Command

use anyhow::{bail, Result};
use clap::Args;
use refshot_gui::{GuiConfig, TestSelector};
use tracing::info;

use super::{leaf_rows, open_runner};
use crate::output::{print_list, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Test to run as "<full title>@<browser>"; repeatable, all tests when omitted
    #[arg(long = "test", value_name = "TITLE@BROWSER")]
    pub tests: Vec<String>,

    /// Only re-run tests that failed in the last report
    #[arg(long, conflicts_with = "tests")]
    pub failed: bool,
}

pub async fn execute(args: RunArgs, config: GuiConfig, format: OutputFormat) -> Result<()> {
    let selectors = args
        .tests
        .iter()
        .map(|s| TestSelector::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    let mut runner = open_runner(config).await?;
    if args.failed {
        runner.run_failed().await?;
    } else {
        runner.run(&selectors).await?;
    }

    let rows = leaf_rows(runner.report().get_suites());
    print_list(&rows, format)?;

    let failed = rows.iter().filter(|r| r.status.is_failed()).count();
    info!("Run complete: {} test(s), {} failed", rows.len(), failed);
    if failed > 0 {
        print_warning(&format!("{} test(s) failed", failed));
        bail!("{} test(s) failed", failed);
    }
    print_success("All tests passed");
    Ok(())
}
