//! Error taxonomy for the command pipeline.
//!
//! Every failure that can reach the caller is one of the four [`CommandError`]
//! categories. [`CommandError::user_message`] is what a UI should display: it
//! never contains backend payloads or host internals.

use thiserror::Error;

use crate::action::ActionKind;
use crate::types::PlaybackStage;

/// Failure talking to a language-model backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("backend returned no content")]
    EmptyResponse,
}

impl BackendError {
    /// Failures worth a second attempt with the same prompt.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::NotConfigured(_)
            | BackendError::InvalidResponse(_)
            | BackendError::EmptyResponse => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    #[error("malformed action description: {0}")]
    Malformed(String),

    #[error("unsupported command: {0}")]
    UnsupportedKind(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{kind} requires a non-empty `{param}` parameter")]
    MissingParam {
        kind: ActionKind,
        param: &'static str,
    },
}

/// The browser host refused or failed a side effect.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("tab rejected for {url}: {reason}")]
    TabRejected { url: String, reason: String },

    #[error("unknown tab: {0}")]
    UnknownTab(String),

    #[error("script `{script}` failed: {reason}")]
    Script { script: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AutomationError {
    #[error("{stage}: timed out after {waited_ms}ms")]
    Timeout { stage: PlaybackStage, waited_ms: u64 },

    #[error("{stage}: element not found: {detail}")]
    ElementNotFound {
        stage: PlaybackStage,
        detail: String,
    },

    #[error("{stage}: interaction failed: {detail}")]
    Interaction {
        stage: PlaybackStage,
        detail: String,
    },

    #[error("{stage}: {source}")]
    Host {
        stage: PlaybackStage,
        #[source]
        source: HostError,
    },
}

impl AutomationError {
    pub fn stage(&self) -> PlaybackStage {
        match self {
            AutomationError::Timeout { stage, .. }
            | AutomationError::ElementNotFound { stage, .. }
            | AutomationError::Interaction { stage, .. }
            | AutomationError::Host { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution error: {0}")]
    Execution(#[from] HostError),

    #[error("automation error: {0}")]
    Automation(#[from] AutomationError),
}

impl CommandError {
    /// Short text suitable for showing in place of a result.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Parse(ParseError::Backend(_)) => {
                "The assistant is unavailable right now. Please try again.".to_string()
            }
            CommandError::Parse(ParseError::UnsupportedKind(_)) => {
                "Unsupported command.".to_string()
            }
            CommandError::Parse(ParseError::Malformed(_)) => {
                "Sorry, I could not understand that command.".to_string()
            }
            CommandError::Validation(ValidationError::MissingParam { kind, param }) => {
                format!("The {kind} command needs a {param}.")
            }
            CommandError::Execution(_) => "The browser refused to run that command.".to_string(),
            CommandError::Automation(err) => {
                format!("Page automation failed while {}.", err.stage().describe())
            }
        }
    }

    /// Transient backend failures are the only ones a retry can fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::Parse(ParseError::Backend(e)) if e.is_transient())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}
