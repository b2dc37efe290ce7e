//! The single entry point a UI calls with raw command text.

use tracing::Instrument;

use crate::brain::LanguageModel;
use crate::error::CommandError;
use crate::executor::ActionExecutor;
use crate::parser::IntentParser;
use crate::types::StepReport;

pub struct CommandProcessor {
    parser: IntentParser,
    executor: ActionExecutor,
    parse_retries: u32,
}

impl CommandProcessor {
    pub fn new(executor: ActionExecutor) -> Self {
        Self {
            parser: IntentParser::new(),
            executor,
            parse_retries: 0,
        }
    }

    /// Extra parse attempts allowed after a transient backend failure.
    pub fn with_parse_retries(mut self, retries: u32) -> Self {
        self.parse_retries = retries;
        self
    }

    /// Parse and run `raw`. `Ok("")` means the command ran and there is nothing to show.
    pub async fn process_command(
        &self,
        raw: &str,
        backend: &dyn LanguageModel,
    ) -> Result<String, CommandError> {
        let command = strip_marker(raw);
        let span = tracing::info_span!("command", backend = backend.id());
        self.run(command, backend).instrument(span).await
    }

    async fn run(
        &self,
        command: &str,
        backend: &dyn LanguageModel,
    ) -> Result<String, CommandError> {
        tracing::info!(%command, "processing command");

        let mut attempt = 0;
        let action = loop {
            match self.parser.parse(backend, command).await {
                Ok(action) => break action,
                Err(err) if err.is_retryable() && attempt < self.parse_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "transient backend failure, retrying parse"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "command not parsed");
                    return Err(err);
                }
            }
        };

        let result = self.executor.execute(&action, Some(backend)).await;
        if let Some(err) = result.failure_reason() {
            tracing::warn!(kind = %action.kind(), error = %err, "command failed");
        }
        result.into_status()
    }

    /// Open `url`, let the model plan steps towards `goal`, then run them best-effort.
    pub async fn process_interaction(
        &self,
        url: &str,
        goal: &str,
        backend: &dyn LanguageModel,
    ) -> Result<StepReport, CommandError> {
        let steps = self.parser.plan_steps(backend, goal).await?;
        let tab = self.executor.host().open_tab(url).await?;
        Ok(self.executor.automation().run_steps(&tab, &steps).await)
    }
}

/// Commands may be prefixed with `!` to mark them as commands.
fn strip_marker(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('!').map(str::trim_start).unwrap_or(trimmed)
}
