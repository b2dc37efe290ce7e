use std::fmt::Write as _;

use crate::action::{Action, ActionKind, RawAction};
use crate::brain::LanguageModel;
use crate::error::{CommandError, ParseError};
use crate::types::InteractionStep;

/// Worked examples shown to the model after the vocabulary.
const EXAMPLES: &[(&str, &str)] = &[
    (
        "SEARCH FOR REACT HOOKS",
        r#"{"type": "web_search", "params": {"query": "react hooks"}}"#,
    ),
    (
        "OPEN YOUTUBE AND PLAY DESPACITO",
        r#"{"type": "youtube_play", "params": {"query": "despacito"}}"#,
    ),
    (
        "SEARCH FOR COOKING VIDEOS ON YOUTUBE",
        r#"{"type": "youtube_search", "params": {"query": "cooking videos"}}"#,
    ),
    (
        "CHECK WEATHER IN NEW YORK",
        r#"{"type": "weather_check", "params": {"location": "New York"}}"#,
    ),
    (
        "TRANSLATE HELLO TO FRENCH",
        r#"{"type": "translate", "params": {"text": "hello", "to": "fr"}}"#,
    ),
    (
        "GO TO GITHUB.COM",
        r#"{"type": "web_navigate", "params": {"url": "github.com"}}"#,
    ),
    ("WRITE AN EMAIL", r#"{"type": "email_compose", "params": {}}"#),
];

const PLAN_PROMPT: &str = r##"Return ONLY a JSON array of interaction steps. Each step is one of:
{"action": "click", "selector": "<css selector>"}
{"action": "type", "selector": "<css selector>", "text": "<text to enter>"}
{"action": "wait", "duration": <milliseconds>}
{"action": "scroll", "position": {"x": <px>, "y": <px>}}
{"action": "hover", "selector": "<css selector>"}

Example:
[
  {"action": "wait", "duration": 2000},
  {"action": "click", "selector": "#search-button"},
  {"action": "type", "selector": "#search-input", "text": "search query"}
]

Return ONLY the JSON array, no additional text or markdown."##;

/// Turns free text into a validated [`Action`] with the help of a model.
#[derive(Debug, Clone)]
pub struct IntentParser {
    template_head: String,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentParser {
    pub fn new() -> Self {
        Self {
            template_head: vocabulary(),
        }
    }

    /// Full instruction sent to the backend for `command`.
    pub fn prompt(&self, command: &str) -> String {
        format!(
            "You are a command parser. Analyze this command and return ONLY a JSON object with \"type\" and \"params\".\nCommand: {}\n\n{}",
            serde_json::Value::from(command),
            self.template_head
        )
    }

    /// One backend round trip, no retry.
    pub async fn parse(
        &self,
        backend: &dyn LanguageModel,
        command: &str,
    ) -> Result<Action, CommandError> {
        let response = backend
            .complete(&self.prompt(command))
            .await
            .map_err(ParseError::from)?;
        tracing::debug!(backend = backend.id(), %response, "intent response");

        let action = decode_action(&response)?;
        tracing::info!(kind = %action.kind(), "parsed command");
        Ok(action)
    }

    /// Ask the backend for a step list that achieves `goal`.
    pub async fn plan_steps(
        &self,
        backend: &dyn LanguageModel,
        goal: &str,
    ) -> Result<Vec<InteractionStep>, CommandError> {
        let prompt = format!(
            "Given this interaction goal: {}\n\n{PLAN_PROMPT}",
            serde_json::Value::from(goal)
        );
        let response = backend.complete(&prompt).await.map_err(ParseError::from)?;

        let steps: Vec<InteractionStep> = serde_json::from_str(strip_code_fences(&response))
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        tracing::info!(steps = steps.len(), "planned interaction");
        Ok(steps)
    }
}

fn vocabulary() -> String {
    let mut out = String::from("Valid types:\n");
    for kind in ActionKind::ALL {
        let _ = write!(out, "- {}: {}", kind.as_str(), kind.description());
        let required = kind.required_params();
        let optional = kind.optional_params();
        if required.is_empty() && optional.is_empty() {
            out.push('\n');
            continue;
        }
        out.push_str(" (params:");
        for p in required {
            let _ = write!(out, " {p}");
        }
        for p in optional {
            let _ = write!(out, " {p}?");
        }
        out.push_str(")\n");
    }

    out.push_str("\nExample formats:\n");
    for (command, json) in EXAMPLES {
        let _ = writeln!(out, "\"{command}\" ->\n{json}\n");
    }
    out.push_str(
        "All param values are strings. Return ONLY the JSON object, no additional text or markdown.\n",
    );
    out
}

/// Decode a model reply into a validated action.
pub fn decode_action(response: &str) -> Result<Action, CommandError> {
    let cleaned = strip_code_fences(response);
    let raw: RawAction = serde_json::from_str(cleaned).map_err(|e| {
        tracing::warn!(error = %e, "model reply is not an action object");
        ParseError::Malformed(e.to_string())
    })?;
    Action::from_raw(raw)
}

/// Remove a surrounding ``` fence (with optional language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Language tag runs to the end of the first line.
        s = match rest.find('\n') {
            Some(idx) if rest[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[idx + 1..]
            }
            _ => rest,
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, ValidationError};
    use async_trait::async_trait;

    struct Canned(Result<String, BackendError>);

    #[async_trait]
    impl LanguageModel for Canned {
        fn id(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```\n{\"a\":1}```  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON5\n[1]\n```\n"), "[1]");
    }

    #[test]
    fn test_prompt_lists_whole_vocabulary() {
        let parser = IntentParser::new();
        let prompt = parser.prompt("SEARCH FOR \"RUST\"");
        assert!(prompt.contains(r#"Command: "SEARCH FOR \"RUST\"""#));
        for kind in ActionKind::ALL {
            assert!(prompt.contains(kind.as_str()), "missing {kind}");
        }
        assert!(prompt.contains("translate: translate text"));
        assert!(prompt.contains("from? to?"));
    }

    #[test]
    fn test_decode_fenced_action() {
        let reply = "```json\n{\"type\": \"maps_search\", \"params\": {\"query\": \"cafes\"}}\n```";
        let action = decode_action(reply).unwrap();
        assert_eq!(action, Action::MapsSearch { query: "cafes".into() });
    }

    #[test]
    fn test_decode_rejects_arrays() {
        let reply = r#"[{"type": "web_search", "params": {"query": "x"}}]"#;
        let err = decode_action(reply).unwrap_err();
        assert!(matches!(err, CommandError::Parse(ParseError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_parse_free_text_is_malformed() {
        let backend = Canned(Ok("Sure! I'd be happy to search that for you.".into()));
        let err = IntentParser::new().parse(&backend, "SEARCH CATS").await.unwrap_err();
        assert!(matches!(err, CommandError::Parse(ParseError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_parse_backend_failure() {
        let backend = Canned(Err(BackendError::Network("refused".into())));
        let err = IntentParser::new().parse(&backend, "SEARCH CATS").await.unwrap_err();
        assert_eq!(
            err,
            CommandError::Parse(ParseError::Backend(BackendError::Network("refused".into())))
        );
    }

    #[tokio::test]
    async fn test_parse_missing_param() {
        let backend = Canned(Ok(r#"{"type": "github_search", "params": {}}"#.into()));
        let err = IntentParser::new().parse(&backend, "SEARCH GITHUB").await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Validation(ValidationError::MissingParam { param: "query", .. })
        ));
    }

    #[test]
    fn test_plan_prompt_example_is_complete() {
        assert!(PLAN_PROMPT.contains(r##"{"action": "click", "selector": "#search-button"}"##));
        assert!(
            PLAN_PROMPT.ends_with("Return ONLY the JSON array, no additional text or markdown.")
        );
    }

    #[tokio::test]
    async fn test_plan_steps() {
        let reply = concat!(
            "```json\n",
            r##"[{"action": "wait", "duration": 500}, {"action": "click", "selector": "#go"}]"##,
            "\n```"
        );
        let backend = Canned(Ok(reply.into()));
        let steps = IntentParser::new().plan_steps(&backend, "press go").await.unwrap();
        assert_eq!(
            steps,
            vec![
                InteractionStep::Wait { duration: 500 },
                InteractionStep::Click { selector: "#go".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_steps_malformed() {
        let backend = Canned(Ok("click the button".into()));
        assert!(IntentParser::new().plan_steps(&backend, "press go").await.is_err());
    }
}
