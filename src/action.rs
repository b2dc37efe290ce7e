//! The closed vocabulary of executable intents.
//!
//! The language model speaks [`RawAction`] (`{"type": .., "params": {..}}`).
//! Only [`Action::from_raw`] turns that into an [`Action`], so an `Action`
//! value always carries every required parameter of its kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CommandError, ParseError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    WebSearch,
    WebNavigate,
    YoutubeSearch,
    YoutubePlay,
    WikipediaSearch,
    GithubSearch,
    StackoverflowSearch,
    EmailCompose,
    Translate,
    Calculate,
    WeatherCheck,
    MapsSearch,
}

impl ActionKind {
    pub const ALL: [ActionKind; 12] = [
        ActionKind::WebSearch,
        ActionKind::WebNavigate,
        ActionKind::YoutubeSearch,
        ActionKind::YoutubePlay,
        ActionKind::WikipediaSearch,
        ActionKind::GithubSearch,
        ActionKind::StackoverflowSearch,
        ActionKind::EmailCompose,
        ActionKind::Translate,
        ActionKind::Calculate,
        ActionKind::WeatherCheck,
        ActionKind::MapsSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::WebSearch => "web_search",
            ActionKind::WebNavigate => "web_navigate",
            ActionKind::YoutubeSearch => "youtube_search",
            ActionKind::YoutubePlay => "youtube_play",
            ActionKind::WikipediaSearch => "wikipedia_search",
            ActionKind::GithubSearch => "github_search",
            ActionKind::StackoverflowSearch => "stackoverflow_search",
            ActionKind::EmailCompose => "email_compose",
            ActionKind::Translate => "translate",
            ActionKind::Calculate => "calculate",
            ActionKind::WeatherCheck => "weather_check",
            ActionKind::MapsSearch => "maps_search",
        }
    }

    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            ActionKind::WebNavigate => &["url"],
            ActionKind::EmailCompose => &[],
            ActionKind::Translate => &["text"],
            ActionKind::Calculate => &["expression"],
            ActionKind::WeatherCheck => &["location"],
            ActionKind::WebSearch
            | ActionKind::YoutubeSearch
            | ActionKind::YoutubePlay
            | ActionKind::WikipediaSearch
            | ActionKind::GithubSearch
            | ActionKind::StackoverflowSearch
            | ActionKind::MapsSearch => &["query"],
        }
    }

    pub fn optional_params(&self) -> &'static [&'static str] {
        match self {
            ActionKind::EmailCompose => &["to", "subject", "body"],
            ActionKind::Translate => &["from", "to"],
            _ => &[],
        }
    }

    /// One-line purpose, used when describing the vocabulary to the model.
    pub fn description(&self) -> &'static str {
        match self {
            ActionKind::WebSearch => "search the web",
            ActionKind::WebNavigate => "open a website or URL",
            ActionKind::YoutubeSearch => "search for videos on YouTube",
            ActionKind::YoutubePlay => "play a video on YouTube",
            ActionKind::WikipediaSearch => "look something up on Wikipedia",
            ActionKind::GithubSearch => "search GitHub",
            ActionKind::StackoverflowSearch => "search Stack Overflow",
            ActionKind::EmailCompose => "compose an email",
            ActionKind::Translate => "translate text (from defaults to auto, to defaults to en)",
            ActionKind::Calculate => "calculate a math expression",
            ActionKind::WeatherCheck => "check the weather for a location",
            ActionKind::MapsSearch => "find a place on a map",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseError::UnsupportedKind(s.to_string()))
    }
}

/// Wire form of an action, exactly as the model is asked to produce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailDraft {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// A validated intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    WebSearch { query: String },
    WebNavigate { url: String },
    YoutubeSearch { query: String },
    YoutubePlay { query: String },
    WikipediaSearch { query: String },
    GithubSearch { query: String },
    StackoverflowSearch { query: String },
    EmailCompose(EmailDraft),
    Translate { text: String, from: String, to: String },
    Calculate { expression: String },
    WeatherCheck { location: String },
    MapsSearch { query: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::WebSearch { .. } => ActionKind::WebSearch,
            Action::WebNavigate { .. } => ActionKind::WebNavigate,
            Action::YoutubeSearch { .. } => ActionKind::YoutubeSearch,
            Action::YoutubePlay { .. } => ActionKind::YoutubePlay,
            Action::WikipediaSearch { .. } => ActionKind::WikipediaSearch,
            Action::GithubSearch { .. } => ActionKind::GithubSearch,
            Action::StackoverflowSearch { .. } => ActionKind::StackoverflowSearch,
            Action::EmailCompose(_) => ActionKind::EmailCompose,
            Action::Translate { .. } => ActionKind::Translate,
            Action::Calculate { .. } => ActionKind::Calculate,
            Action::WeatherCheck { .. } => ActionKind::WeatherCheck,
            Action::MapsSearch { .. } => ActionKind::MapsSearch,
        }
    }

    /// Validate a decoded wire action against the schema.
    pub fn from_raw(raw: RawAction) -> Result<Action, CommandError> {
        let kind: ActionKind = raw.kind.trim().parse()?;
        let params = Params { kind, raw: &raw.params };

        for name in raw.params.keys() {
            if !kind.required_params().contains(&name.as_str())
                && !kind.optional_params().contains(&name.as_str())
            {
                tracing::debug!(%kind, param = %name, "ignoring unknown parameter");
            }
        }

        let action = match kind {
            ActionKind::WebSearch => Action::WebSearch {
                query: params.required("query")?,
            },
            ActionKind::WebNavigate => Action::WebNavigate {
                url: params.required("url")?,
            },
            ActionKind::YoutubeSearch => Action::YoutubeSearch {
                query: params.required("query")?,
            },
            ActionKind::YoutubePlay => Action::YoutubePlay {
                query: params.required("query")?,
            },
            ActionKind::WikipediaSearch => Action::WikipediaSearch {
                query: params.required("query")?,
            },
            ActionKind::GithubSearch => Action::GithubSearch {
                query: params.required("query")?,
            },
            ActionKind::StackoverflowSearch => Action::StackoverflowSearch {
                query: params.required("query")?,
            },
            ActionKind::EmailCompose => Action::EmailCompose(EmailDraft {
                to: params.optional("to"),
                subject: params.optional("subject"),
                body: params.optional("body"),
            }),
            ActionKind::Translate => Action::Translate {
                text: params.required("text")?,
                from: params.optional("from").unwrap_or_else(|| "auto".to_string()),
                to: params.optional("to").unwrap_or_else(|| "en".to_string()),
            },
            ActionKind::Calculate => Action::Calculate {
                expression: params.required("expression")?,
            },
            ActionKind::WeatherCheck => Action::WeatherCheck {
                location: params.required("location")?,
            },
            ActionKind::MapsSearch => Action::MapsSearch {
                query: params.required("query")?,
            },
        };

        Ok(action)
    }

    /// Flat parameter view, defaults applied.
    pub fn params(&self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::new();
        match self {
            Action::WebSearch { query }
            | Action::YoutubeSearch { query }
            | Action::YoutubePlay { query }
            | Action::WikipediaSearch { query }
            | Action::GithubSearch { query }
            | Action::StackoverflowSearch { query }
            | Action::MapsSearch { query } => {
                out.insert("query", query.clone());
            }
            Action::WebNavigate { url } => {
                out.insert("url", url.clone());
            }
            Action::EmailCompose(draft) => {
                for (name, value) in [
                    ("to", &draft.to),
                    ("subject", &draft.subject),
                    ("body", &draft.body),
                ] {
                    if let Some(value) = value {
                        out.insert(name, value.clone());
                    }
                }
            }
            Action::Translate { text, from, to } => {
                out.insert("text", text.clone());
                out.insert("from", from.clone());
                out.insert("to", to.clone());
            }
            Action::Calculate { expression } => {
                out.insert("expression", expression.clone());
            }
            Action::WeatherCheck { location } => {
                out.insert("location", location.clone());
            }
        }
        out
    }
}

struct Params<'a> {
    kind: ActionKind,
    raw: &'a BTreeMap<String, String>,
}

impl Params<'_> {
    fn required(&self, name: &'static str) -> Result<String, ValidationError> {
        self.optional(name).ok_or(ValidationError::MissingParam {
            kind: self.kind,
            param: name,
        })
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.raw
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}
