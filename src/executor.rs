use std::sync::Arc;

use urlencoding::encode;

use crate::action::Action;
use crate::automation::PageAutomation;
use crate::brain::LanguageModel;
use crate::error::CommandError;
use crate::hands::BrowserHost;
use crate::types::ExecutionResult;

/// Dispatches validated actions to browser side effects.
pub struct ActionExecutor {
    host: Arc<dyn BrowserHost>,
    automation: PageAutomation,
}

impl ActionExecutor {
    pub fn new(host: Arc<dyn BrowserHost>, automation: PageAutomation) -> Self {
        Self { host, automation }
    }

    pub fn host(&self) -> &Arc<dyn BrowserHost> {
        &self.host
    }

    pub fn automation(&self) -> &PageAutomation {
        &self.automation
    }

    /// Run one action. Never returns an error: failures are in the result.
    ///
    /// `backend` is only consulted by flows that may ask the model for a selector.
    pub async fn execute(
        &self,
        action: &Action,
        backend: Option<&dyn LanguageModel>,
    ) -> ExecutionResult {
        let url = destination(action);
        tracing::info!(kind = %action.kind(), %url, "executing action");

        let tab = match self.host.open_tab(&url).await {
            Ok(tab) => tab,
            Err(e) => {
                tracing::warn!(kind = %action.kind(), error = %e, "host rejected navigation");
                return ExecutionResult::failure(CommandError::Execution(e));
            }
        };

        match action {
            Action::YoutubePlay { .. } => self.automation.run_playback_flow(&tab, backend).await,
            Action::YoutubeSearch { .. } => {
                ExecutionResult::success(Some("Showing search results...".to_string()))
            }
            _ => ExecutionResult::success(None),
        }
    }
}

/// Whether `url` starts with `scheme://`, where a scheme is a letter followed by
/// letters, digits, `+`, `-` or `.`.
fn has_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Where an action sends the browser.
pub fn destination(action: &Action) -> String {
    match action {
        Action::WebSearch { query } => format!("https://www.google.com/search?q={}", encode(query)),
        Action::WebNavigate { url } => {
            if has_scheme(url) {
                url.clone()
            } else {
                format!("https://{url}")
            }
        }
        Action::YoutubeSearch { query } | Action::YoutubePlay { query } => {
            format!("https://www.youtube.com/results?search_query={}", encode(query))
        }
        Action::WikipediaSearch { query } => format!(
            "https://wikipedia.org/wiki/Special:Search?search={}",
            encode(query)
        ),
        Action::GithubSearch { query } => format!("https://github.com/search?q={}", encode(query)),
        Action::StackoverflowSearch { query } => {
            format!("https://stackoverflow.com/search?q={}", encode(query))
        }
        Action::EmailCompose(draft) => format!(
            "mailto:{}?subject={}&body={}",
            encode(draft.to.as_deref().unwrap_or_default()),
            encode(draft.subject.as_deref().unwrap_or_default()),
            encode(draft.body.as_deref().unwrap_or_default()),
        ),
        Action::Translate { text, from, to } => format!(
            "https://translate.google.com/?sl={}&tl={}&text={}",
            encode(from),
            encode(to),
            encode(text)
        ),
        Action::Calculate { expression } => {
            format!("https://www.google.com/search?q={}", encode(expression))
        }
        Action::WeatherCheck { location } => {
            format!("https://www.google.com/search?q=weather+{}", encode(location))
        }
        Action::MapsSearch { query } => {
            format!("https://www.google.com/maps/search/{}", encode(query))
        }
    }
}
