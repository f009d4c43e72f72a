//! Tree Command

use anyhow::Result;
use clap::Args;
use refshot_gui::GuiConfig;

use super::{leaf_rows, open_runner};
use crate::output::{print_list, print_value, OutputFormat};

#[derive(Args)]
pub struct TreeArgs {
    /// Print the whole result tree instead of one row per test
    #[arg(long)]
    pub full: bool,
}

pub async fn execute(args: TreeArgs, config: GuiConfig, format: OutputFormat) -> Result<()> {
    let runner = open_runner(config).await?;
    let tree = runner.tree();

    if args.full {
        print_value(&tree, format)
    } else {
        print_list(&leaf_rows(&tree.suites), format)
    }
}
