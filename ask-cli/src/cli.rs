//! Command-line arguments for ask-cli

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ask-cli - ask a chat model about a piece of text
#[derive(Parser)]
#[command(name = "ask-cli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings database (default: <data dir>/ask-ai/ask-ai.db)
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Log at info level instead of warn (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask about a selection, then read follow-up questions from stdin
    Ask {
        /// Template name (default: the configured default template)
        #[arg(short, long, value_name = "NAME")]
        template: Option<String>,

        /// Endpoint index (default: the configured default endpoint)
        #[arg(short, long, value_name = "N")]
        endpoint: Option<usize>,

        /// Document the selection comes from; lines around the cursor become the context
        #[arg(long, value_name = "FILE")]
        context_file: Option<PathBuf>,

        /// Zero-based cursor line in the context file
        #[arg(long, value_name = "LINE", requires = "context_file")]
        cursor_line: Option<usize>,

        /// Selected text, or "-" to read it from stdin
        selection: String,
    },

    /// Manage chat endpoints
    Endpoint {
        #[command(subcommand)]
        action: EndpointAction,
    },

    /// Manage prompt templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum EndpointAction {
    /// Add an OpenAI-compatible endpoint
    Add {
        #[arg(long)]
        name: String,

        /// Chat-completions URL, e.g. https://api.moonshot.cn/v1/chat/completions
        #[arg(long)]
        url: String,

        #[arg(long)]
        key: String,

        #[arg(long, default_value = "")]
        model: String,

        /// Minimum milliseconds between two requests to this URL
        #[arg(long, default_value_t = 0)]
        min_interval_ms: u64,

        /// Model used when --model is empty
        #[arg(long)]
        default_model: Option<String>,
    },

    /// List endpoints with their index
    List,

    /// Remove the endpoint at INDEX
    Remove {
        index: usize,
    },
}

#[derive(Subcommand)]
pub enum TemplateAction {
    /// Add a custom template; use {{selection}} and {{context}} as placeholders
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        template: String,
    },

    /// Import templates from a JSON file: [{"name": ..., "template": ...}]
    Import {
        file: PathBuf,
    },

    /// List templates with their index
    List,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a setting, e.g. `config set default_api_index 1`
    Set {
        key: String,
        value: String,
    },

    /// Print the effective settings
    Show,
}
