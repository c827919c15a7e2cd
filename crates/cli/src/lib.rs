pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "skydesk",
    about = "Skydesk airline assistant CLI",
    long_about = "Chat with the airline customer-service assistant and inspect runtime readiness.",
    after_help = "Examples:\n  skydesk chat\n  skydesk config\n  skydesk doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start the interactive customer-service chat loop")]
    Chat {
        #[arg(long, help = "Override the configured model name")]
        model: Option<String>,
        #[arg(long, help = "Override the configured chat-completions base URL")]
        base_url: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credential readiness, and agent wiring checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { model, base_url } => commands::chat::run(model, base_url),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
