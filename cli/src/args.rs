use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use visua11y_core::agents::Provider;

#[derive(Parser, Debug)]
#[command(name = "visua11y")]
#[command(version)]
#[command(about = "Accessibility summaries, page digests and screenshot analysis", long_about = None)]
pub struct Cli {
    /// Workspace directory holding the settings database
    #[arg(long, env = "VISUA11Y_WORKSPACE", global = true)]
    pub workspace: Option<PathBuf>,

    /// Log provider attempts to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarise text in plain language (reads stdin when TEXT is omitted)
    Summarize { text: Option<String> },
    /// Produce a TLDR digest of a page
    Digest(DigestArgs),
    /// Describe the layout of a screenshot image
    Screenshot { path: PathBuf },
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Inspect or change endpoint settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Answer JSON messages, one per line, on stdin/stdout
    Serve,
}

#[derive(Args, Debug)]
pub struct DigestArgs {
    #[arg(long, default_value = "")]
    pub title: String,
    #[arg(long, default_value = "")]
    pub url: String,
    #[arg(long, default_value = "")]
    pub description: String,
    /// File with the page body (stdin when omitted)
    #[arg(long)]
    pub body: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    Set { provider: KeyProvider, key: String },
    Clear { provider: KeyProvider },
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    #[arg(long)]
    pub openai_base_url: Option<String>,
    #[arg(long)]
    pub gemini_base_url: Option<String>,
    #[arg(long)]
    pub local_base_url: Option<String>,
    #[arg(long)]
    pub local_model: Option<String>,
    #[arg(long)]
    pub local_enabled: Option<bool>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyProvider {
    Openai,
    Gemini,
}

impl From<KeyProvider> for Provider {
    fn from(value: KeyProvider) -> Self {
        match value {
            KeyProvider::Openai => Provider::OpenAi,
            KeyProvider::Gemini => Provider::Gemini,
        }
    }
}
