//! Host-side collaborators
//!
//! The editor (or terminal) hosting a chat supplies plain strings and
//! receives deltas through a [`ChatSink`].

use std::sync::Mutex;

use crate::llm_engine::provider::StreamCallback;

/// Receives the output of one turn
pub trait ChatSink: Send {
    /// Called once per content increment, in arrival order
    fn on_delta(&mut self, delta: &str);

    /// Called with the diagnostic for a configuration or transport error
    fn on_error(&mut self, message: &str);
}

/// Sink that keeps everything in memory
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub deltas: Vec<String>,
    pub errors: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated deltas
    pub fn text(&self) -> String {
        self.deltas.concat()
    }
}

impl ChatSink for BufferSink {
    fn on_delta(&mut self, delta: &str) {
        self.deltas.push(delta.to_string());
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

/// Sink forwarding deltas to a callback; errors go to the log and, when
/// given, to a second callback
pub struct CallbackSink {
    on_delta: StreamCallback,
    on_error: Option<StreamCallback>,
}

impl CallbackSink {
    pub fn new(on_delta: StreamCallback) -> Self {
        Self {
            on_delta,
            on_error: None,
        }
    }

    pub fn with_error_callback(mut self, on_error: StreamCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }
}

impl ChatSink for CallbackSink {
    fn on_delta(&mut self, delta: &str) {
        (self.on_delta)(delta.to_string());
    }

    fn on_error(&mut self, message: &str) {
        log::error!("Chat error: {}", message);
        if let Some(callback) = &self.on_error {
            callback(message.to_string());
        }
    }
}

impl<S: ChatSink> ChatSink for &mut S {
    fn on_delta(&mut self, delta: &str) {
        (**self).on_delta(delta)
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message)
    }
}

/// Sink shared between threads, e.g. a UI thread reading while a task writes
impl<S: ChatSink> ChatSink for std::sync::Arc<Mutex<S>> {
    fn on_delta(&mut self, delta: &str) {
        if let Ok(mut sink) = self.lock() {
            sink.on_delta(delta);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Ok(mut sink) = self.lock() {
            sink.on_error(message);
        }
    }
}

/// Lines `cursor_line - radius ..= cursor_line + radius` of `text`, clamped
/// to the document, each followed by a newline.
pub fn context_window(text: &str, cursor_line: usize, radius: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let start = cursor_line.saturating_sub(radius);
    let end = cursor_line.saturating_add(radius).min(lines.len() - 1);

    if start > end {
        return String::new();
    }

    let mut context = String::new();
    for line in &lines[start..=end] {
        context.push_str(line.strip_suffix('\r').unwrap_or(line));
        context.push('\n');
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const DOC: &str = "one\ntwo\nthree\nfour\nfive\nsix\nseven";

    #[test]
    fn test_context_window_middle() {
        assert_eq!(context_window(DOC, 3, 2), "two\nthree\nfour\nfive\nsix\n");
    }

    #[test]
    fn test_context_window_clamped() {
        assert_eq!(context_window(DOC, 0, 2), "one\ntwo\nthree\n");
        assert_eq!(context_window(DOC, 6, 2), "five\nsix\nseven\n");
        assert_eq!(context_window(DOC, 40, 2), "");
    }

    #[test]
    fn test_context_window_crlf_and_empty() {
        assert_eq!(context_window("a\r\nb", 0, 1), "a\nb\n");
        assert_eq!(context_window("", 0, 2), "\n");
    }

    #[test]
    fn test_buffer_sink() {
        let mut sink = BufferSink::new();
        sink.on_delta("Hi");
        sink.on_delta(" there");
        sink.on_error("HTTP error: 500");

        assert_eq!(sink.text(), "Hi there");
        assert_eq!(sink.errors, vec!["HTTP error: 500"]);
    }

    #[test]
    fn test_callback_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let errors_cb = errors.clone();

        let mut sink = CallbackSink::new(Box::new(move |d| seen_cb.lock().unwrap().push(d)))
            .with_error_callback(Box::new(move |e| errors_cb.lock().unwrap().push(e)));
        sink.on_delta("a");
        sink.on_error("boom");

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
    }

    #[test]
    fn test_shared_sink() {
        let shared = Arc::new(Mutex::new(BufferSink::new()));
        let mut writer = shared.clone();
        writer.on_delta("x");
        assert_eq!(shared.lock().unwrap().text(), "x");
    }
}
