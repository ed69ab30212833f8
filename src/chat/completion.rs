//! Chat completion logic - runs one turn of a session against a provider

use tokio_util::sync::CancellationToken;

use crate::chat::session::Session;
use crate::chat::types::TurnOutcome;
use crate::database::models::{AbortPolicy, ApiEndpoint, PromptTemplate};
use crate::host::ChatSink;
use crate::llm_engine::provider::{ChatError, ChatMessage, ChatProvider};
use crate::llm_engine::stream::StreamEvent;
use crate::templates::resolver::first_turn_prompt;

/// Everything a turn needs besides the session itself
pub struct TurnContext<'a> {
    pub provider: &'a dyn ChatProvider,
    pub endpoint: &'a ApiEndpoint,
    pub abort_policy: AbortPolicy,
    pub cancel: CancellationToken,
}

/// First turn: resolve the template against the selection and send it
pub async fn run_first_turn(
    ctx: &TurnContext<'_>,
    session: &mut Session,
    templates: &[PromptTemplate],
    default_prompt_index: usize,
    sink: &mut dyn ChatSink,
) -> Result<TurnOutcome, ChatError> {
    let prompt = first_turn_prompt(
        session.template.as_ref(),
        templates,
        default_prompt_index,
        &session.selection,
        &session.context,
    );
    run_turn(ctx, session, prompt, sink).await
}

/// Follow-up turn: the typed question is sent as is
pub async fn run_follow_up(
    ctx: &TurnContext<'_>,
    session: &mut Session,
    question: &str,
    sink: &mut dyn ChatSink,
) -> Result<TurnOutcome, ChatError> {
    run_turn(ctx, session, question.to_string(), sink).await
}

fn report(sink: &mut dyn ChatSink, error: ChatError) -> ChatError {
    sink.on_error(&error.to_string());
    error
}

async fn run_turn(
    ctx: &TurnContext<'_>,
    session: &mut Session,
    prompt: String,
    sink: &mut dyn ChatSink,
) -> Result<TurnOutcome, ChatError> {
    if let Some(missing) = ctx.endpoint.missing_field() {
        log::error!("[{}] Endpoint not configured: missing {}", ctx.endpoint.label(), missing);
        return Err(report(sink, ChatError::Configuration {
            endpoint: ctx.endpoint.label().to_string(),
            missing,
        }));
    }

    let mark = session.history().len();
    session.push(ChatMessage::user(prompt));

    log::info!(
        "[{}] Session {} turn {} ({} messages)",
        ctx.endpoint.label(),
        session.id,
        mark / 2 + 1,
        session.history().len()
    );

    let mut stream = match ctx
        .provider
        .open_stream(ctx.endpoint, session.history(), ctx.cancel.clone())
        .await
    {
        Ok(stream) => stream,
        Err(ChatError::Aborted) => {
            log::info!("Session {} cancelled before the response arrived", session.id);
            return Ok(TurnOutcome::Aborted {
                partial: String::new(),
                committed: false,
            });
        }
        Err(e) => {
            session.truncate(mark);
            return Err(report(sink, e));
        }
    };

    let terminal = stream.drain(|delta| sink.on_delta(delta)).await;

    match terminal {
        Some(StreamEvent::Done { answer, signaled }) => {
            session.push(ChatMessage::assistant(answer.clone()));
            Ok(TurnOutcome::Completed { answer, signaled })
        }
        Some(StreamEvent::Aborted { partial }) => {
            let committed = match ctx.abort_policy {
                AbortPolicy::CommitTagged if !partial.is_empty() => {
                    session.push(ChatMessage::interrupted_assistant(partial.clone()));
                    true
                }
                _ => false,
            };
            log::info!(
                "Session {} aborted with {} chars (committed: {})",
                session.id,
                partial.chars().count(),
                committed
            );
            Ok(TurnOutcome::Aborted { partial, committed })
        }
        Some(StreamEvent::Failed(e)) => {
            session.truncate(mark);
            Err(report(sink, e))
        }
        Some(StreamEvent::Delta(_)) | None => {
            session.truncate(mark);
            Err(report(sink, ChatError::transport("stream ended unexpectedly")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BufferSink;
    use crate::llm_engine::provider::{ByteStream, MessageRole};
    use crate::llm_engine::stream::ChatStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use std::sync::Mutex;

    /// Replays canned bodies and records what it was sent
    #[derive(Default)]
    struct ScriptedProvider {
        bodies: Mutex<Vec<Result<Vec<&'static str>, ChatError>>>,
        sent: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn with(bodies: Vec<Result<Vec<&'static str>, ChatError>>) -> Self {
            Self {
                bodies: Mutex::new(bodies.into_iter().rev().collect()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn provider_name(&self) -> &'static str {
            "scripted"
        }

        async fn open_stream(
            &self,
            _endpoint: &ApiEndpoint,
            messages: &[ChatMessage],
            cancel: CancellationToken,
        ) -> Result<ChatStream, ChatError> {
            self.sent.lock().unwrap().push(messages.to_vec());
            let chunks = self.bodies.lock().unwrap().pop().expect("no scripted body left")?;
            let body: ByteStream = Box::pin(stream::iter(
                chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))),
            ));
            Ok(ChatStream::new("scripted", body, cancel))
        }
    }

    const HI: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
    const THERE: &str = "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n";
    const DONE: &str = "data: [DONE]\n\n";

    fn endpoint() -> ApiEndpoint {
        ApiEndpoint::new("test", "http://127.0.0.1:9/v1/chat/completions", "sk-test")
    }

    fn ctx<'a>(provider: &'a ScriptedProvider, endpoint: &'a ApiEndpoint) -> TurnContext<'a> {
        TurnContext {
            provider,
            endpoint,
            abort_policy: AbortPolicy::CommitTagged,
            cancel: CancellationToken::new(),
        }
    }

    fn translate_template() -> PromptTemplate {
        PromptTemplate {
            id: "custom_t".to_string(),
            name: "t".to_string(),
            template: "Translate: {{selection}}\nContext: {{context}}".to_string(),
            is_builtin: false,
            sort_order: 0,
            created_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_first_turn_then_follow_up() {
        let provider = ScriptedProvider::with(vec![Ok(vec![HI, THERE, DONE]), Ok(vec![HI, DONE])]);
        let endpoint = endpoint();
        let ctx = ctx(&provider, &endpoint);
        let mut session = Session::new("cat", "the cat sat");
        let mut sink = BufferSink::new();

        let outcome = run_first_turn(&ctx, &mut session, &[translate_template()], 0, &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed { answer: "Hi there".to_string(), signaled: true });
        assert_eq!(sink.text(), "Hi there");
        assert_eq!(session.history()[0].content, "Translate: cat\nContext: the cat sat");

        run_follow_up(&ctx, &mut session, "why?", &mut sink).await.unwrap();

        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent[1].len(), 3);
        assert_eq!(sent[1][1], ChatMessage::assistant("Hi there"));
        assert_eq!(sent[1][2], ChatMessage::user("why?"));
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[3].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_configuration_error_appends_nothing() {
        let provider = ScriptedProvider::with(vec![]);
        let endpoint = ApiEndpoint::new("empty", "", "");
        let ctx = ctx(&provider, &endpoint);
        let mut session = Session::new("cat", "");
        let mut sink = BufferSink::new();

        let err = run_first_turn(&ctx, &mut session, &[], 0, &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::Configuration { missing: "url", .. }));
        assert!(session.history().is_empty());
        assert!(provider.sent.lock().unwrap().is_empty());
        assert_eq!(sink.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_rolls_back_user_message() {
        let provider = ScriptedProvider::with(vec![
            Ok(vec![HI, DONE]),
            Err(ChatError::http_status(500, "")),
        ]);
        let endpoint = endpoint();
        let ctx = ctx(&provider, &endpoint);
        let mut session = Session::new("cat", "");
        let mut sink = BufferSink::new();

        run_first_turn(&ctx, &mut session, &[], 0, &mut sink).await.unwrap();
        let err = run_follow_up(&ctx, &mut session, "more", &mut sink).await.unwrap_err();

        assert_eq!(err, ChatError::http_status(500, ""));
        assert_eq!(session.history().len(), 2);
        assert_eq!(sink.errors, vec!["HTTP error: 500"]);
    }

    #[tokio::test]
    async fn test_abort_commits_tagged_partial() {
        let provider = ScriptedProvider::with(vec![Ok(vec![HI, THERE, DONE])]);
        let endpoint = endpoint();
        let ctx = ctx(&provider, &endpoint);
        let mut session = Session::new("cat", "");
        let cancel = ctx.cancel.clone();

        struct CancelAfterFirst(CancellationToken, BufferSink);
        impl ChatSink for CancelAfterFirst {
            fn on_delta(&mut self, delta: &str) {
                self.1.on_delta(delta);
                self.0.cancel();
            }
            fn on_error(&mut self, message: &str) {
                self.1.on_error(message);
            }
        }
        let mut sink = CancelAfterFirst(cancel, BufferSink::new());

        let outcome = run_first_turn(&ctx, &mut session, &[], 0, &mut sink).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Aborted { partial: "Hi".to_string(), committed: true });
        assert_eq!(session.history()[1], ChatMessage::interrupted_assistant("Hi"));
    }

    #[tokio::test]
    async fn test_abort_discard_policy() {
        let provider = ScriptedProvider::with(vec![Ok(vec![HI, DONE])]);
        let endpoint = endpoint();
        let mut ctx = ctx(&provider, &endpoint);
        ctx.abort_policy = AbortPolicy::Discard;
        ctx.cancel.cancel();
        let mut session = Session::new("cat", "");
        let mut sink = BufferSink::new();

        let outcome = run_first_turn(&ctx, &mut session, &[], 0, &mut sink).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Aborted { partial: String::new(), committed: false });
        assert_eq!(session.history().len(), 1);
        assert!(sink.deltas.is_empty());
    }

    #[tokio::test]
    async fn test_no_done_still_completes() {
        let provider = ScriptedProvider::with(vec![Ok(vec![HI])]);
        let endpoint = endpoint();
        let ctx = ctx(&provider, &endpoint);
        let mut session = Session::new("cat", "");
        let mut sink = BufferSink::new();

        let outcome = run_first_turn(&ctx, &mut session, &[], 0, &mut sink).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Completed { answer: "Hi".to_string(), signaled: false });
        assert_eq!(session.history()[0].content, "cat");
    }
}
