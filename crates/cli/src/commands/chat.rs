use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use skydesk_agent::llm::OpenAiCompatClient;
use skydesk_agent::roster::{airline_roster, TRIAGE_AGENT};
use skydesk_agent::runner::TurnRunner;
use skydesk_agent::tools::ToolRegistry;
use skydesk_agent::transcript::ChatSession;
use skydesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use skydesk_core::TravelerContext;
use tokio::io::AsyncBufReadExt;

use super::CommandResult;

pub fn run(model_override: Option<String>, base_url_override: Option<String>) -> CommandResult {
    let overrides = ConfigOverrides {
        llm_model: model_override,
        llm_base_url: base_url_override,
        ..ConfigOverrides::default()
    };
    let config = match AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    init_logging(&config);

    let config = match ensure_api_key(config) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "credentials", format!("{error:#}"), 2),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(chat_loop(&config)) {
        Ok(()) => CommandResult { exit_code: 0, output: String::new() },
        Err(error) => CommandResult::failure("chat", "chat_loop", format!("{error:#}"), 4),
    }
}

fn init_logging(config: &AppConfig) {
    use skydesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Prompts for the API key when config and environment leave it unset.
/// Gated on a tty so scripted runs fail fast instead of hanging on a read.
fn ensure_api_key(mut config: AppConfig) -> Result<AppConfig> {
    if config.llm.has_api_key() || !config.llm.requires_api_key() {
        return Ok(config);
    }

    if !io::stdin().is_terminal() {
        anyhow::bail!(
            "llm.api_key is not configured; set SKYDESK_LLM_API_KEY or add it to skydesk.toml"
        );
    }

    eprint!("Enter your {} API key: ", config.llm.provider);
    io::stderr().flush().ok();

    let mut entered = String::new();
    io::stdin().read_line(&mut entered).context("failed to read API key from stdin")?;
    let entered = entered.trim();
    if entered.is_empty() {
        anyhow::bail!("no API key entered");
    }

    config.llm.api_key = Some(entered.to_string().into());
    Ok(config)
}

async fn chat_loop(config: &AppConfig) -> Result<()> {
    let client = OpenAiCompatClient::from_config(&config.llm)?;
    let runner = TurnRunner::new(
        Arc::new(client),
        ToolRegistry::airline_default(),
        airline_roster(),
        config.chat.max_steps_per_turn,
    );
    let mut session = ChatSession::new(TRIAGE_AGENT, TravelerContext::demo());

    tracing::info!(
        event_name = "chat.session_started",
        session_id = %session.session_id,
        provider = %config.llm.provider,
        model = %config.llm.model,
        "chat session started"
    );

    println!("{}", config.chat.greeting);
    println!("(type `exit` or press Ctrl-D to quit)");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let user_text = line.trim();
        if user_text.is_empty() {
            continue;
        }
        if matches!(user_text, "exit" | "quit") {
            break;
        }

        match runner.run_turn(&mut session, user_text).await {
            Ok(reply) => println!("{}> {reply}", session.current_agent),
            Err(error) => {
                tracing::error!(
                    event_name = "chat.turn_failed",
                    session_id = %session.session_id,
                    error = %error,
                    "turn failed"
                );
                println!("skydesk> Sorry, something went wrong handling that message: {error}");
            }
        }
    }

    tracing::info!(
        event_name = "chat.session_ended",
        session_id = %session.session_id,
        transcript_messages = session.transcript.len(),
        "chat session ended"
    );

    Ok(())
}
