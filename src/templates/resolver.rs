//! Prompt template resolution
//!
//! Templates carry `{{selection}}` and `{{context}}` placeholders. Every
//! occurrence is replaced literally in a single left-to-right pass, so text
//! coming from the document is never itself treated as a placeholder.

use crate::database::models::PromptTemplate;

pub const SELECTION_TOKEN: &str = "{{selection}}";
pub const CONTEXT_TOKEN: &str = "{{context}}";

/// Replace placeholders; a `None` value leaves its placeholder untouched.
/// Returns the output and whether a selection placeholder was seen.
fn substitute(template: &str, selection: Option<&str>, context: Option<&str>) -> (String, bool) {
    let mut out = String::with_capacity(template.len());
    let mut saw_selection = false;
    let mut rest = template;

    while let Some(pos) = rest.find("{{") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with(SELECTION_TOKEN) {
            saw_selection = true;
            out.push_str(selection.unwrap_or(SELECTION_TOKEN));
            rest = &tail[SELECTION_TOKEN.len()..];
        } else if tail.starts_with(CONTEXT_TOKEN) {
            out.push_str(context.unwrap_or(CONTEXT_TOKEN));
            rest = &tail[CONTEXT_TOKEN.len()..];
        } else {
            // Step one brace so "{{{selection}}" still matches at the next byte
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    (out, saw_selection)
}

/// Build the prompt for `template`.
///
/// When the template has no selection placeholder and the selection is not
/// empty, the selection is appended after a newline.
pub fn resolve(template: &str, selection: &str, context: &str) -> String {
    let (mut prompt, saw_selection) = substitute(template, Some(selection), Some(context));
    if !saw_selection && !selection.is_empty() {
        prompt.push('\n');
        prompt.push_str(selection);
    }
    prompt
}

/// Template for a first turn: the explicit one, else the configured default.
/// An out-of-range default falls back to the first template.
pub fn choose_template<'a>(
    explicit: Option<&'a PromptTemplate>,
    templates: &'a [PromptTemplate],
    default_index: usize,
) -> Option<&'a PromptTemplate> {
    if explicit.is_some() {
        return explicit;
    }
    templates.get(default_index).or_else(|| templates.first())
}

/// Prompt sent on the first turn of a session
pub fn first_turn_prompt(
    explicit: Option<&PromptTemplate>,
    templates: &[PromptTemplate],
    default_index: usize,
    selection: &str,
    context: &str,
) -> String {
    match choose_template(explicit, templates, default_index) {
        Some(template) => {
            log::debug!("Resolving first-turn prompt with template '{}'", template.name);
            resolve(&template.template, selection, context)
        }
        None => selection.to_string(),
    }
}

/// Input box contents after applying a template in edit mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilledInput {
    pub text: String,
    /// Byte offset just after the inserted template
    pub cursor: usize,
}

/// Put a resolved template in front of what the user already typed.
///
/// Placeholders are only filled when there is something to fill them with,
/// and no selection is appended.
pub fn prefill_input(template: &str, selection: &str, context: &str, current_input: &str) -> PrefilledInput {
    let selection = (!selection.is_empty()).then_some(selection);
    let context = (!context.is_empty()).then_some(context);
    let (processed, _) = substitute(template, selection, context);

    let cursor = processed.len();
    let mut text = processed;
    text.push_str(current_input);

    PrefilledInput { text, cursor }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, body: &str) -> PromptTemplate {
        PromptTemplate {
            id: format!("custom_{}", name),
            name: name.to_string(),
            template: body.to_string(),
            is_builtin: false,
            sort_order: 0,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_resolve_both_placeholders() {
        let prompt = resolve("Translate: {{selection}}\nContext: {{context}}", "cat", "the cat sat");
        assert_eq!(prompt, "Translate: cat\nContext: the cat sat");
    }

    #[test]
    fn test_resolve_every_occurrence() {
        let prompt = resolve("{{selection}}-{{selection}}-{{selection}}", "x", "");
        assert_eq!(prompt, "x-x-x");
    }

    #[test]
    fn test_resolve_appends_selection_without_placeholder() {
        assert_eq!(resolve("Explain this:", "foo", "ctx"), "Explain this:\nfoo");
        assert_eq!(resolve("Explain {{context}}", "", "ctx"), "Explain ctx");
    }

    #[test]
    fn test_resolve_does_not_rescan_inserted_text() {
        let prompt = resolve("A {{selection}} B {{context}}", "{{context}}", "ctx");
        assert_eq!(prompt, "A {{context}} B ctx");
    }

    #[test]
    fn test_resolve_extra_braces() {
        assert_eq!(resolve("{{{selection}}}", "x", ""), "{x}");
        assert_eq!(resolve("{{other}} {{selection}}", "x", ""), "{{other}} x");
    }

    #[test]
    fn test_resolve_multibyte_text() {
        assert_eq!(resolve("请翻译：{{selection}}", "猫", ""), "请翻译：猫");
    }

    #[test]
    fn test_choose_template() {
        let templates = vec![template("a", "A {{selection}}"), template("b", "B {{selection}}")];
        let explicit = template("c", "C");

        assert_eq!(choose_template(Some(&explicit), &templates, 1).map(|t| t.name.as_str()), Some("c"));
        assert_eq!(choose_template(None, &templates, 1).map(|t| t.name.as_str()), Some("b"));
        assert_eq!(choose_template(None, &templates, 9).map(|t| t.name.as_str()), Some("a"));
        assert!(choose_template(None, &[], 0).is_none());
    }

    #[test]
    fn test_first_turn_prompt_without_templates_is_selection() {
        assert_eq!(first_turn_prompt(None, &[], 0, "hello", "ctx"), "hello");
    }

    #[test]
    fn test_first_turn_prompt_uses_default() {
        let templates = vec![template("a", "Define {{selection}}")];
        assert_eq!(first_turn_prompt(None, &templates, 0, "word", ""), "Define word");
    }

    #[test]
    fn test_prefill_input() {
        let filled = prefill_input("Explain {{selection}} in {{context}}: ", "cat", "", "why?");
        assert_eq!(filled.text, "Explain cat in {{context}}: why?");
        assert_eq!(&filled.text[..filled.cursor], "Explain cat in {{context}}: ");
    }

    #[test]
    fn test_prefill_input_keeps_placeholders_when_empty() {
        let filled = prefill_input("Q: {{selection}}", "", "", "");
        assert_eq!(filled.text, "Q: {{selection}}");
        assert_eq!(filled.cursor, filled.text.len());
    }
}
