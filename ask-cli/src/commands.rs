//! Subcommand handlers

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use ask_ai::database::models::{CreateApiEndpoint, CreatePromptTemplate, RequestPolicy};
use ask_ai::{AskAi, ChatError, ChatSink, DatabaseManager, Session, TurnOutcome};

use crate::cli::{ConfigAction, EndpointAction, TemplateAction};

pub struct AskOptions {
    pub template: Option<String>,
    pub endpoint: Option<usize>,
    pub context_file: Option<PathBuf>,
    pub cursor_line: Option<usize>,
    pub selection: String,
}

/// Writes deltas straight to stdout as they arrive
struct StdoutSink;

impl ChatSink for StdoutSink {
    fn on_delta(&mut self, delta: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(delta.as_bytes());
        let _ = out.flush();
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\n{}", message);
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Completed { .. } => println!(),
        TurnOutcome::Aborted { committed, .. } => {
            println!();
            if *committed {
                eprintln!("[interrupted, partial answer kept]");
            } else {
                eprintln!("[interrupted]");
            }
        }
    }
}

/// Line the cursor would be on: the first line containing the start of the selection
fn guess_cursor_line(document: &str, selection: &str) -> usize {
    let needle = selection.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if needle.is_empty() {
        return 0;
    }
    document
        .split('\n')
        .position(|line| line.contains(needle))
        .unwrap_or(0)
}

fn build_session(app: &AskAi, options: &AskOptions, selection: String) -> Result<Session> {
    let mut session = match &options.context_file {
        Some(path) => {
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context file {:?}", path))?;
            let cursor_line = match options.cursor_line {
                Some(line) => line,
                None => {
                    let guessed = guess_cursor_line(&document, &selection);
                    log::debug!("No cursor line given, using line {} of {:?}", guessed, path);
                    guessed
                }
            };
            app.session_from_document(selection, &document, cursor_line)?
        }
        None => app.new_session(selection, ""),
    };

    if let Some(name) = &options.template {
        let template = app
            .db()
            .find_template_by_name(name)?
            .ok_or_else(|| anyhow::anyhow!("No template named '{}' (see `ask-cli template list`)", name))?;
        session = session.with_template(template);
    }
    if let Some(index) = options.endpoint {
        session = session.with_endpoint(index);
    }
    Ok(session)
}

fn spawn_interrupt_handler(app: Arc<AskAi>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let active = app.tasks().active_count();
            if active > 0 {
                log::info!("Interrupt: cancelling {} running request(s)", active);
                app.tasks().cancel_all();
            } else {
                std::process::exit(130);
            }
        }
    });
}

pub async fn ask(app: Arc<AskAi>, options: AskOptions) -> Result<()> {
    let from_stdin = options.selection == "-";
    let selection = if from_stdin {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("Failed to read selection from stdin")?;
        text.trim_end().to_string()
    } else {
        options.selection.clone()
    };

    let mut session = build_session(&app, &options, selection)?;
    spawn_interrupt_handler(app.clone());

    let mut sink = StdoutSink;
    let outcome = app.ask(&mut session, &mut sink).await?;
    print_outcome(&outcome);

    if from_stdin {
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let _ = io::stderr().flush();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/exit" || question == "/quit" {
            break;
        }

        match app.follow_up(&mut session, question, &mut sink).await {
            Ok(outcome) => print_outcome(&outcome),
            // Already shown by the sink; the session stays usable
            Err(e @ ChatError::Transport { .. }) => {
                log::warn!("Follow-up failed, history unchanged: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

pub fn endpoint(db: &DatabaseManager, action: EndpointAction) -> Result<()> {
    match action {
        EndpointAction::Add {
            name,
            url,
            key,
            model,
            min_interval_ms,
            default_model,
        } => {
            let id = db.create_endpoint(&CreateApiEndpoint {
                name: name.clone(),
                url,
                key,
                model,
                policy: RequestPolicy {
                    min_request_interval_ms: min_interval_ms,
                    default_model,
                },
            })?;
            let index = db
                .list_endpoints()?
                .iter()
                .position(|e| e.id == id)
                .unwrap_or(0);
            println!("Added endpoint {} at index {}", name, index);
        }
        EndpointAction::List => {
            let default_index = db.load_all_settings()?.default_api_index;
            let endpoints = db.list_endpoints()?;
            if endpoints.is_empty() {
                println!("No endpoints configured. Add one with `ask-cli endpoint add`.");
            }
            for (index, e) in endpoints.iter().enumerate() {
                let marker = if index == default_index { "*" } else { " " };
                let pacing = match e.policy.min_request_interval_ms {
                    0 => String::new(),
                    ms => format!(" every {}ms", ms),
                };
                println!(
                    "{} {:>2}  {}  {}  model={}  key={}{}",
                    marker,
                    index,
                    e.name,
                    e.url,
                    e.effective_model(),
                    mask_key(&e.key),
                    pacing
                );
            }
        }
        EndpointAction::Remove { index } => {
            let endpoints = db.list_endpoints()?;
            let target = endpoints
                .get(index)
                .ok_or_else(|| anyhow::anyhow!("No endpoint at index {}", index))?;
            db.delete_endpoint(&target.id)?;
            println!("Removed endpoint {}", target.name);
        }
    }
    Ok(())
}

pub fn template(db: &DatabaseManager, action: TemplateAction) -> Result<()> {
    match action {
        TemplateAction::Add { name, template } => {
            db.create_template(&CreatePromptTemplate {
                name: name.clone(),
                template,
                sort_order: None,
            })?;
            println!("Added template {}", name);
        }
        TemplateAction::Import { file } => {
            let imported = db.import_templates_from_file(&file)?;
            println!("Imported {} templates", imported);
        }
        TemplateAction::List => {
            let default_index = db.load_all_settings()?.default_prompt_index;
            for (index, t) in db.list_templates()?.iter().enumerate() {
                let marker = if index == default_index { "*" } else { " " };
                let kind = if t.is_builtin { "built-in" } else { "custom" };
                println!("{} {:>2}  {}  ({})", marker, index, t.name, kind);
            }
        }
    }
    Ok(())
}

pub fn config(db: &DatabaseManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            db.set_setting_checked(&key, &value)?;
            println!("{} = {}", key, value);
        }
        ConfigAction::Show => {
            let settings = db.load_all_settings()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            println!("database: {}", db.db_path().display());
        }
    }
    Ok(())
}
