use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use directories::ProjectDirs;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use visua11y_core::agents::config::{self, EngineConfigUpdate};
use visua11y_core::agents::credentials::{
    CredentialAccessor, CredentialStatus, SqliteCredentialStore,
};
use visua11y_core::agents::Provider;
use visua11y_core::api::v1::{self, PageContent};
use visua11y_core::db::{init_db, DbPool};
use visua11y_core::Summarizer;

use crate::args::{Command, ConfigCommand, ConfigSetArgs, DigestArgs, KeysCommand};

pub fn workspace_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Some(proj) = ProjectDirs::from("com", "Visua11y", "Visua11y") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("Visua11y")
    }
}

pub async fn run(command: Command, workspace: PathBuf) -> Result<()> {
    let pool = init_db(workspace).context("failed to open workspace")?;
    match command {
        Command::Summarize { text } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let summarizer = Summarizer::from_workspace(pool)?;
            println!("{}", summarizer.summarize_selection(&text).await);
            Ok(())
        }
        Command::Digest(args) => digest(pool, args).await,
        Command::Screenshot { path } => {
            let data_url = image_data_url(&path)?;
            let summarizer = Summarizer::from_workspace(pool)?;
            let analysis = summarizer.analyze_screenshot(&data_url).await?;
            println!("{analysis}");
            Ok(())
        }
        Command::Keys { command } => keys(pool, command),
        Command::Config { command } => config_command(pool, command),
        Command::Serve => serve(pool).await,
    }
}

async fn digest(pool: DbPool, args: DigestArgs) -> Result<()> {
    let text_content = match &args.body {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => read_stdin()?,
    };
    let page = PageContent {
        title: args.title,
        url: args.url,
        description: args.description,
        text_content,
    };
    let summarizer = Summarizer::from_workspace(pool)?;
    let tldr = summarizer.generate_digest(&page.format()).await?;
    println!("{tldr}");
    Ok(())
}

fn keys(pool: DbPool, command: KeysCommand) -> Result<()> {
    let accessor = CredentialAccessor::new(Arc::new(SqliteCredentialStore::new(pool)));
    match command {
        KeysCommand::Set { provider, key } => {
            let provider = Provider::from(provider);
            accessor.set_credential(provider, &key)?;
            println!("{} key saved", provider.display_name());
        }
        KeysCommand::Clear { provider } => {
            let provider = Provider::from(provider);
            accessor.clear_credential(provider)?;
            println!("{} key removed", provider.display_name());
        }
        KeysCommand::Status => {
            for provider in [Provider::OpenAi, Provider::Gemini] {
                let status = match accessor.status(provider)? {
                    CredentialStatus::Missing => "not configured".to_string(),
                    CredentialStatus::Invalid => "invalid format".to_string(),
                    CredentialStatus::Valid { fingerprint } => format!("valid ({fingerprint})"),
                };
                println!("{:<8} {status}", provider.display_name());
            }
        }
    }
    Ok(())
}

fn config_command(pool: DbPool, command: ConfigCommand) -> Result<()> {
    let conn = pool.get().map_err(|err| anyhow!(err.to_string()))?;
    let config = match command {
        ConfigCommand::Show => config::load_config(&conn)?,
        ConfigCommand::Set(args) => config::update_config(&conn, into_update(args))?,
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn into_update(args: ConfigSetArgs) -> EngineConfigUpdate {
    EngineConfigUpdate {
        openai_base_url: args.openai_base_url,
        gemini_base_url: args.gemini_base_url,
        local_base_url: args.local_base_url,
        local_model: args.local_model,
        local_enabled: args.local_enabled,
        request_timeout_secs: args.timeout_secs,
    }
}

/// JSON-lines message loop. Lines that are not JSON get an error reply and
/// the loop carries on.
async fn serve(pool: DbPool) -> Result<()> {
    let summarizer = Summarizer::from_workspace(pool)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Value>(&line) {
            Ok(message) => serde_json::to_string(&v1::handle_message(&summarizer, &message).await)?,
            Err(err) => serde_json::json!({ "success": false, "error": format!("Invalid message: {err}") })
                .to_string(),
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read stdin")?;
    Ok(buffer)
}

pub fn image_data_url(path: &Path) -> Result<String> {
    let mime = mime_for(path)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("data:{mime};base64,{}", B64_ENGINE.encode(bytes)))
}

fn mime_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        other => bail!("unsupported image type: {other:?}"),
    })
}
