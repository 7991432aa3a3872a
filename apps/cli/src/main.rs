//! Leadflow CLI: local lead generation and outreach pipeline.
//!
//! Finds local businesses, writes each one a personalized email with an LLM,
//! and sends it exactly once through a rotation of SMTP accounts.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _log_guard = commands::init_tracing(&cli);
    commands::load_dotenv();
    commands::run(cli).await
}
