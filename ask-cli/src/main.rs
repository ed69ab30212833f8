//! ask-cli - terminal host for ask-ai
//!
//! Streams the answer for a selection to stdout, then keeps the session open
//! for follow-up questions typed on stdin. Ctrl-C cancels the answer being
//! streamed; pressed while idle it exits.

mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use ask_ai::{AskAi, DatabaseManager};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    ask_ai::init_logging_with_default(if cli.verbose { "info" } else { "warn" });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(DatabaseManager::default_path);
    let app = Arc::new(AskAi::open(db_path)?);

    match cli.command {
        Commands::Ask {
            template,
            endpoint,
            context_file,
            cursor_line,
            selection,
        } => {
            commands::ask(
                app,
                commands::AskOptions {
                    template,
                    endpoint,
                    context_file,
                    cursor_line,
                    selection,
                },
            )
            .await
        }
        Commands::Endpoint { action } => commands::endpoint(app.db(), action),
        Commands::Template { action } => commands::template(app.db(), action),
        Commands::Config { action } => commands::config(app.db(), action),
    }
}
