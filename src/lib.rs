//! Natural-language browser commands.
//!
//! Raw text goes through [`CommandProcessor::process_command`]: a language
//! model turns it into a typed [`Action`], the [`ActionExecutor`] opens the
//! right page, and [`PageAutomation`] drives pages that need interaction.

pub mod action;
pub mod automation;
pub mod brain;
pub mod command;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod hands;
pub mod parser;
pub mod types;

pub use action::{Action, ActionKind, EmailDraft, RawAction};
pub use automation::PageAutomation;
pub use brain::{BackendKind, Backends, ChatCompletionsBackend, GeminiBackend, LanguageModel};
pub use command::CommandProcessor;
pub use config::{AutomationConfig, BrowserConfig, Config};
pub use dom::PageScript;
pub use error::{
    AutomationError, BackendError, CommandError, ConfigError, HostError, ParseError,
    ValidationError,
};
pub use executor::ActionExecutor;
pub use hands::{BrowserHost, ChromeHost, TabHandle};
pub use parser::IntentParser;
pub use types::{ExecutionResult, InteractionStep, Outcome, PlaybackStage, StepReport};
