// Application facade for ask-ai
// Wires the settings store, the chat provider and the per-session task registry

use std::path::PathBuf;
use std::sync::Arc;

use crate::chat::completion::{run_first_turn, run_follow_up, TurnContext};
use crate::chat::{Session, TaskRegistry, TurnOutcome};
use crate::database::models::{AllSettings, ApiEndpoint};
use crate::database::DatabaseManager;
use crate::host::{context_window, ChatSink};
use crate::llm_engine::provider::{ChatError, ChatProvider};
use crate::llm_engine::providers::{OpenAiCompatConfig, OpenAiCompatProvider};

fn settings_error(e: anyhow::Error) -> ChatError {
    ChatError::Settings(format!("{:#}", e))
}

pub struct AskAi {
    /// Settings store, read fresh on every turn
    db: Arc<DatabaseManager>,
    provider: Arc<dyn ChatProvider>,
    tasks: TaskRegistry,
}

impl AskAi {
    /// Open the store at `db_path` and talk to endpoints over HTTP
    pub fn open(db_path: PathBuf) -> anyhow::Result<Self> {
        let db = DatabaseManager::new(db_path)?;
        let settings = db.load_all_settings()?;

        let provider = OpenAiCompatProvider::new(OpenAiCompatConfig {
            idle_timeout_secs: settings.request_timeout_secs,
            ..OpenAiCompatConfig::default()
        })?;

        Ok(Self::with_provider(Arc::new(db), Arc::new(provider)))
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(DatabaseManager::default_path())
    }

    pub fn with_provider(db: Arc<DatabaseManager>, provider: Arc<dyn ChatProvider>) -> Self {
        log::info!("Using chat provider: {}", provider.provider_name());
        Self {
            db,
            provider,
            tasks: TaskRegistry::new(),
        }
    }

    pub fn db(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn db_arc(&self) -> Arc<DatabaseManager> {
        self.db.clone()
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn new_session(&self, selection: impl Into<String>, context: impl Into<String>) -> Session {
        Session::new(selection, context)
    }

    /// Session whose context is taken from the lines around `cursor_line`
    pub fn session_from_document(
        &self,
        selection: impl Into<String>,
        document: &str,
        cursor_line: usize,
    ) -> Result<Session, ChatError> {
        let radius = self.db.load_all_settings().map_err(settings_error)?.context_radius;
        Ok(Session::new(selection, context_window(document, cursor_line, radius)))
    }

    /// First turn of `session`: template + selection
    pub async fn ask(&self, session: &mut Session, sink: &mut dyn ChatSink) -> Result<TurnOutcome, ChatError> {
        let guard = self.tasks.begin(&session.id)?;
        let (settings, endpoint) = self.load_turn_config(session, sink)?;
        let templates = self.db.list_templates().map_err(|e| report(sink, settings_error(e)))?;

        let ctx = TurnContext {
            provider: self.provider.as_ref(),
            endpoint: &endpoint,
            abort_policy: settings.abort_policy,
            cancel: guard.cancel_token(),
        };
        run_first_turn(&ctx, session, &templates, settings.default_prompt_index, sink).await
    }

    /// Later turn of `session` with a typed question
    pub async fn follow_up(
        &self,
        session: &mut Session,
        question: &str,
        sink: &mut dyn ChatSink,
    ) -> Result<TurnOutcome, ChatError> {
        let guard = self.tasks.begin(&session.id)?;
        let (settings, endpoint) = self.load_turn_config(session, sink)?;

        let ctx = TurnContext {
            provider: self.provider.as_ref(),
            endpoint: &endpoint,
            abort_policy: settings.abort_policy,
            cancel: guard.cancel_token(),
        };
        run_follow_up(&ctx, session, question, sink).await
    }

    /// Cancel the in-flight request of a session, if any
    pub fn cancel(&self, session_id: &str) -> bool {
        self.tasks.cancel_session(session_id)
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.tasks.is_session_processing(session_id)
    }

    fn load_turn_config(
        &self,
        session: &Session,
        sink: &mut dyn ChatSink,
    ) -> Result<(AllSettings, ApiEndpoint), ChatError> {
        let settings = self.db.load_all_settings().map_err(|e| report(sink, settings_error(e)))?;
        let endpoint = self
            .db
            .resolve_endpoint(session.endpoint_override)
            .map_err(|e| report(sink, settings_error(e)))?
            .ok_or_else(|| {
                report(sink, ChatError::Configuration {
                    endpoint: "(none)".to_string(),
                    missing: "endpoint",
                })
            })?;
        Ok((settings, endpoint))
    }
}

fn report(sink: &mut dyn ChatSink, error: ChatError) -> ChatError {
    sink.on_error(&error.to_string());
    error
}
