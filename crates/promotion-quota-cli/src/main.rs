use anyhow::Result;
use clap::Parser;
use promotion_quota_cli::tracing_setup::init_tracing;
use promotion_quota_cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity())?;
    run_cli(cli)
}
