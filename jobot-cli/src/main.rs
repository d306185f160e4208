//! Jobot CLI - Main entry point.

use anyhow::{bail, Context, Result};
use clap::Parser;
use jobot_cli::{ChatSession, ProxyClient, TerminalView, TurnOutcome};
use jobot_common::config::Config;
use jobot_common::logging::init_cli_logging;
use tokio::io::{self, AsyncBufReadExt, BufReader};

/// Jobot - chat with the Jobot gateway from a terminal.
#[derive(Parser, Debug)]
#[command(name = "jobot")]
#[command(version)]
#[command(about = "Terminal chat client for the Jobot gateway.", long_about = None)]
struct Cli {
    /// Chat endpoint URL (default: client.endpoint from config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Session token sent to the gateway as a cookie
    #[arg(long)]
    session_token: Option<String>,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Single message mode (don't enter interactive mode)
    #[arg(short, long)]
    message: Option<String>,

    /// Log level for diagnostics on stderr
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_logging(&cli.log_level);

    let mut config = Config::load_with_env().context("Failed to load configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config.client.endpoint = endpoint;
    }
    if let Some(token) = cli.session_token {
        config.client.session_token = Some(token);
    }
    let stream = config.chat.stream && !cli.no_stream;

    let client = ProxyClient::from_config(&config).context("Failed to create HTTP client")?;
    let view = TerminalView::new();

    if let Some(message) = cli.message {
        let mut session = ChatSession::new(client, view, config.client.system_prompt, stream);
        return match session.submit(&message).await {
            TurnOutcome::Replied => Ok(()),
            TurnOutcome::Failed(err) => Err(err.into()),
            TurnOutcome::Empty | TurnOutcome::Busy => bail!("Nothing was sent"),
        };
    }

    view.banner(client.endpoint(), stream);
    let mut session = ChatSession::new(client, view, config.client.system_prompt, stream);

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        session.view().prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        session.view().clear_prompt();

        match line.trim() {
            "/quit" | "/exit" => break,
            "/history" => session.show_history(),
            _ => {
                session.submit(&line).await;
            }
        }
    }

    tracing::debug!(
        messages = session.conversation().messages().len(),
        "Chat session ended"
    );
    Ok(())
}
