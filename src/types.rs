use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommandError;

/// A single best-effort page interaction, as planned by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InteractionStep {
    Click { selector: String },
    Type { selector: String, text: String },
    Wait { duration: u64 },
    Scroll { position: Point },
    Hover { selector: String },
}

impl InteractionStep {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionStep::Click { .. } => "click",
            InteractionStep::Type { .. } => "type",
            InteractionStep::Wait { .. } => "wait",
            InteractionStep::Scroll { .. } => "scroll",
            InteractionStep::Hover { .. } => "hover",
        }
    }
}

/// Viewport coordinates in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// What the page reports about its first media element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    pub present: bool,
    pub paused: bool,
}

/// Where a tab is and whether its document has loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLocation {
    pub href: String,
    pub ready: bool,
}

impl PageLocation {
    /// A fresh tab reports `about:blank` as complete before navigation commits.
    pub fn is_blank(&self) -> bool {
        self.href.is_empty() || self.href.starts_with("about:")
    }
}

/// Outcome of a best-effort step sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub completed: usize,
    pub failures: Vec<StepFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub index: usize,
    pub action: &'static str,
    pub reason: String,
}

impl StepReport {
    pub fn attempted(&self) -> usize {
        self.completed + self.failures.len()
    }
}

/// Stages of the playback flow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStage {
    AwaitSettle,
    LocateTarget,
    SimulateInteraction,
    AwaitVideoPage,
    EnsurePlaying,
    Confirm,
}

impl PlaybackStage {
    /// Gerund phrase for user-facing messages.
    pub fn describe(&self) -> &'static str {
        match self {
            PlaybackStage::AwaitSettle => "waiting for the results page",
            PlaybackStage::LocateTarget => "looking for the first result",
            PlaybackStage::SimulateInteraction => "clicking the first result",
            PlaybackStage::AwaitVideoPage => "waiting for the video page",
            PlaybackStage::EnsurePlaying => "starting playback",
            PlaybackStage::Confirm => "showing the confirmation",
        }
    }
}

impl fmt::Display for PlaybackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackStage::AwaitSettle => "await_settle",
            PlaybackStage::LocateTarget => "locate_target",
            PlaybackStage::SimulateInteraction => "simulate_interaction",
            PlaybackStage::AwaitVideoPage => "await_video_page",
            PlaybackStage::EnsurePlaying => "ensure_playing",
            PlaybackStage::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Result of running one action. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    outcome: Outcome,
    message: Option<String>,
    failure: Option<CommandError>,
}

impl ExecutionResult {
    pub fn success(message: Option<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            message,
            failure: None,
        }
    }

    pub fn failure(reason: impl Into<CommandError>) -> Self {
        Self {
            outcome: Outcome::Failure,
            message: None,
            failure: Some(reason.into()),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&CommandError> {
        self.failure.as_ref()
    }

    /// Status text on success (empty when there is nothing to show).
    pub fn into_status(self) -> Result<String, CommandError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.message.unwrap_or_default()),
        }
    }
}

/// Hard cap on page markup handed to the model for selector lookup.
pub const PAGE_MARKUP_MAX_CHARS: usize = 30_000;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;

    #[test]
    fn test_interaction_steps_decode() {
        let raw = r##"[
            {"action": "wait", "duration": 2000},
            {"action": "click", "selector": "#search-button"},
            {"action": "type", "selector": "#search-input", "text": "search query"},
            {"action": "scroll", "position": {"x": 0, "y": 400}},
            {"action": "hover", "selector": ".menu"}
        ]"##;
        let steps: Vec<InteractionStep> = serde_json::from_str(raw).unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0], InteractionStep::Wait { duration: 2000 });
        assert_eq!(
            steps[3],
            InteractionStep::Scroll {
                position: Point { x: 0.0, y: 400.0 }
            }
        );
        assert_eq!(steps[4].name(), "hover");
    }

    #[test]
    fn test_blank_locations() {
        let blank = PageLocation {
            href: "about:blank".into(),
            ready: true,
        };
        assert!(blank.is_blank());

        let results = PageLocation {
            href: "https://www.youtube.com/results?search_query=despacito".into(),
            ready: true,
        };
        assert!(!results.is_blank());
    }

    #[test]
    fn test_interaction_step_requires_its_fields() {
        let raw = r##"{"action": "type", "selector": "#q"}"##;
        assert!(serde_json::from_str::<InteractionStep>(raw).is_err());
    }

    #[test]
    fn test_execution_result_success_status() {
        let result = ExecutionResult::success(Some("Playing video...".into()));
        assert!(result.is_success());
        assert!(result.failure_reason().is_none());
        assert_eq!(result.into_status().unwrap(), "Playing video...");

        let quiet = ExecutionResult::success(None);
        assert_eq!(quiet.into_status().unwrap(), "");
    }

    #[test]
    fn test_execution_result_failure_status() {
        let result = ExecutionResult::failure(HostError::Unavailable("closed".into()));
        assert_eq!(result.outcome(), Outcome::Failure);
        assert!(result.message().is_none());
        assert!(matches!(
            result.into_status(),
            Err(CommandError::Execution(HostError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_playback_stage_display() {
        assert_eq!(PlaybackStage::EnsurePlaying.to_string(), "ensure_playing");
        assert_eq!(PlaybackStage::AwaitSettle.describe(), "waiting for the results page");
    }
}
