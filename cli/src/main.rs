use anyhow::Result;
use clap::Parser;

mod args;
mod commands;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let workspace = commands::workspace_dir(cli.workspace);
    log::debug!("using workspace {}", workspace.display());
    commands::run(cli.command, workspace).await
}
