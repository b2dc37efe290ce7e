//! Page automation on freshly opened tabs.
//!
//! The playback flow walks [`PlaybackStage`]s in order and stops at the first
//! failing stage. Every wait is a poll with a deadline; nothing waits forever.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::brain::LanguageModel;
use crate::config::AutomationConfig;
use crate::dom::{self, PageScript};
use crate::error::{AutomationError, HostError};
use crate::hands::{BrowserHost, TabHandle};
use crate::parser::strip_code_fences;
use crate::types::{
    ExecutionResult, InteractionStep, MediaState, PageLocation, PlaybackStage, Point, StepFailure,
    StepReport,
};

pub struct PageAutomation {
    host: Arc<dyn BrowserHost>,
    config: AutomationConfig,
}

impl PageAutomation {
    pub fn new(host: Arc<dyn BrowserHost>, config: AutomationConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Open the first result on a results page and make sure it plays.
    pub async fn run_playback_flow(
        &self,
        tab: &TabHandle,
        backend: Option<&dyn LanguageModel>,
    ) -> ExecutionResult {
        match self.playback(tab, backend).await {
            Ok(()) => {
                tracing::info!(tab = tab.id(), "playback flow finished: played");
                ExecutionResult::success(Some("Playing video...".to_string()))
            }
            Err(err) => {
                tracing::warn!(
                    tab = tab.id(),
                    stage = %err.stage(),
                    error = %err,
                    "playback flow failed"
                );
                if self.config.close_tab_on_failure {
                    if let Err(e) = self.host.close_tab(tab).await {
                        tracing::warn!(
                            tab = tab.id(),
                            error = %e,
                            "could not close tab after failure"
                        );
                    }
                }
                ExecutionResult::failure(err)
            }
        }
    }

    async fn playback(
        &self,
        tab: &TabHandle,
        backend: Option<&dyn LanguageModel>,
    ) -> Result<(), AutomationError> {
        let cfg = &self.config;

        let stage = PlaybackStage::AwaitSettle;
        tracing::debug!(%stage, "entering stage");
        self.poll_until(stage, cfg.ready_timeout(), || async move {
            let page: PageLocation = self.eval_as(tab, &dom::page_location()).await?;
            Ok((page.ready && !page.is_blank()).then_some(()))
        })
        .await?;

        let stage = PlaybackStage::LocateTarget;
        tracing::debug!(%stage, "entering stage");
        let selector = self.locate_target(tab, backend).await?;

        let stage = PlaybackStage::SimulateInteraction;
        tracing::debug!(%stage, %selector, "entering stage");
        let origin: PageLocation = self
            .within(stage, cfg.ready_timeout(), self.eval_as(tab, &dom::page_location()))
            .await?;
        self.click_like_a_user(tab, &selector).await?;

        let stage = PlaybackStage::AwaitVideoPage;
        tracing::debug!(%stage, from = %origin.href, "entering stage");
        let origin = origin.href.as_str();
        let marker = cfg.video_page_marker.as_str();
        self.poll_until(stage, cfg.ready_timeout(), || async move {
            let page: PageLocation = self.eval_as(tab, &dom::page_location()).await?;
            if page.href == origin || !page.href.contains(marker) {
                return Ok(None);
            }
            let media: MediaState = self.eval_as(tab, &dom::media_state()).await?;
            Ok(media.present.then_some(()))
        })
        .await?;

        let stage = PlaybackStage::EnsurePlaying;
        tracing::debug!(%stage, "entering stage");
        let media: MediaState = self
            .within(stage, cfg.playback_timeout(), self.eval_as(tab, &dom::media_state()))
            .await?;
        if media.paused {
            let pressed: bool = self
                .within(
                    stage,
                    cfg.playback_timeout(),
                    self.eval_as(tab, &dom::press_play(&cfg.play_control_selector)),
                )
                .await?;
            tracing::debug!(pressed, "video was paused, requested play");
        }
        self.poll_until(stage, cfg.playback_timeout(), || async move {
            let media: MediaState = self.eval_as(tab, &dom::media_state()).await?;
            Ok((!media.paused).then_some(()))
        })
        .await?;

        let stage = PlaybackStage::Confirm;
        let banner = dom::show_banner("AI Assistant", "✓ Video playing", cfg.banner_duration_ms);
        self.within(stage, cfg.ready_timeout(), self.host.evaluate(tab, &banner))
            .await?;

        Ok(())
    }

    /// Structural selector first; the model is only asked when that never matches.
    async fn locate_target(
        &self,
        tab: &TabHandle,
        backend: Option<&dyn LanguageModel>,
    ) -> Result<String, AutomationError> {
        let stage = PlaybackStage::LocateTarget;
        let structural = self.config.result_selector.as_str();

        let found = self
            .poll_until(stage, self.config.locate_timeout(), || async move {
                let count: i64 = self.eval_as(tab, &dom::count_matches(structural)).await?;
                Ok((count > 0).then_some(()))
            })
            .await;

        match (found, backend) {
            (Ok(()), _) => Ok(structural.to_string()),
            (Err(err), Some(model)) if self.config.ai_selector_fallback => {
                tracing::info!(error = %err, "structural selector missed, asking the model");
                self.ai_selector(tab, model).await
            }
            (Err(_), _) => Err(AutomationError::ElementNotFound {
                stage,
                detail: format!("no element matches `{structural}`"),
            }),
        }
    }

    /// Ask the model for a selector and accept it only if it matches exactly one element.
    async fn ai_selector(
        &self,
        tab: &TabHandle,
        model: &dyn LanguageModel,
    ) -> Result<String, AutomationError> {
        let stage = PlaybackStage::LocateTarget;
        let timeout = self.config.locate_timeout();

        let markup: String = self
            .within(
                stage,
                timeout,
                self.eval_as(tab, &dom::page_markup(self.config.markup_max_chars)),
            )
            .await?;

        let prompt = format!(
            "Analyze this HTML and find the most accurate CSS selector for: {purpose}\n\n\
             HTML Content:\n{markup}\n\n\
             Return ONLY a CSS selector string that uniquely identifies the element.\n\
             Consider:\n1. Unique IDs\n2. Specific classes\n3. ARIA attributes\n4. Element hierarchy\n5. Data attributes\n",
            purpose = Value::from(self.config.target_purpose.as_str()),
        );

        let reply = match tokio::time::timeout(timeout, model.complete(&prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(AutomationError::ElementNotFound {
                    stage,
                    detail: format!("selector lookup failed: {e}"),
                });
            }
            Err(_) => {
                return Err(AutomationError::Timeout {
                    stage,
                    waited_ms: millis(timeout),
                });
            }
        };

        let selector = clean_selector(&reply);
        if selector.is_empty() {
            return Err(AutomationError::ElementNotFound {
                stage,
                detail: "model returned an empty selector".to_string(),
            });
        }

        let count: i64 = self
            .within(stage, timeout, self.eval_as(tab, &dom::count_matches(&selector)))
            .await?;
        if count != 1 {
            return Err(AutomationError::ElementNotFound {
                stage,
                detail: format!("model selector `{selector}` matched {count} elements"),
            });
        }
        tracing::info!(%selector, "using model-suggested selector");
        Ok(selector)
    }

    /// Move the synthetic cursor onto the element and click at that point.
    async fn click_like_a_user(
        &self,
        tab: &TabHandle,
        selector: &str,
    ) -> Result<(), AutomationError> {
        let stage = PlaybackStage::SimulateInteraction;
        let timeout = self.config.ready_timeout();

        let center: Option<Point> = self
            .within(stage, timeout, self.eval_as(tab, &dom::element_center(selector)))
            .await?;
        let center = center.ok_or_else(|| AutomationError::ElementNotFound {
            stage,
            detail: format!("`{selector}` disappeared before it could be clicked"),
        })?;

        self.within(stage, timeout, self.host.evaluate(tab, &dom::render_cursor(center)))
            .await?;
        tokio::time::sleep(self.config.cursor_settle()).await;

        let clicked: bool = self
            .within(stage, timeout, self.eval_as(tab, &dom::click_at(center)))
            .await?;
        if !clicked {
            return Err(AutomationError::Interaction {
                stage,
                detail: format!("nothing clickable at ({}, {})", center.x, center.y),
            });
        }
        Ok(())
    }

    /// Run `steps` in order. A failing step is recorded and skipped.
    pub async fn run_steps(&self, tab: &TabHandle, steps: &[InteractionStep]) -> StepReport {
        let mut report = StepReport::default();
        for (index, step) in steps.iter().enumerate() {
            match self.run_step(tab, step).await {
                Ok(()) => report.completed += 1,
                Err(reason) => {
                    tracing::warn!(index, action = step.name(), %reason, "interaction step failed");
                    report.failures.push(StepFailure {
                        index,
                        action: step.name(),
                        reason,
                    });
                }
            }
        }
        tracing::info!(
            completed = report.completed,
            failed = report.failures.len(),
            "interaction finished"
        );
        report
    }

    async fn run_step(&self, tab: &TabHandle, step: &InteractionStep) -> Result<(), String> {
        let script = match step {
            InteractionStep::Wait { duration } => {
                tokio::time::sleep(Duration::from_millis(*duration)).await;
                return Ok(());
            }
            InteractionStep::Click { selector } => dom::click_selector(selector),
            InteractionStep::Type { selector, text } => dom::type_into(selector, text),
            InteractionStep::Scroll { position } => dom::scroll_to(*position),
            InteractionStep::Hover { selector } => dom::hover(selector),
        };

        let timeout = self.config.ready_timeout();
        let done: bool = tokio::time::timeout(timeout, self.eval_as(tab, &script))
            .await
            .map_err(|_| format!("no response within {}ms", millis(timeout)))?
            .map_err(|e| e.to_string())?;
        if done {
            Ok(())
        } else {
            Err("no matching element".to_string())
        }
    }

    async fn eval_as<T: DeserializeOwned>(
        &self,
        tab: &TabHandle,
        script: &PageScript,
    ) -> Result<T, HostError> {
        let value = self.host.evaluate(tab, script).await?;
        serde_json::from_value(value).map_err(|e| HostError::Script {
            script: script.name.to_string(),
            reason: format!("unexpected result: {e}"),
        })
    }

    /// A single host call that must answer within `timeout`.
    async fn within<T, Fut>(
        &self,
        stage: PlaybackStage,
        timeout: Duration,
        call: Fut,
    ) -> Result<T, AutomationError>
    where
        Fut: Future<Output = Result<T, HostError>>,
    {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(|source| AutomationError::Host { stage, source }),
            Err(_) => Err(AutomationError::Timeout {
                stage,
                waited_ms: millis(timeout),
            }),
        }
    }

    /// Poll `probe` every `poll_interval` until it yields a value or `timeout` passes.
    ///
    /// Probe errors count as "not yet": pages throw while they navigate. A probe
    /// that never answers is cut off at the deadline.
    async fn poll_until<T, F, Fut>(
        &self,
        stage: PlaybackStage,
        timeout: Duration,
        mut probe: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, HostError>>,
    {
        let deadline = Instant::now() + timeout;
        let expired = || AutomationError::Timeout {
            stage,
            waited_ms: millis(timeout),
        };

        loop {
            match tokio::time::timeout_at(deadline, probe()).await {
                Err(_) => return Err(expired()),
                Ok(Ok(Some(value))) => return Ok(value),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::debug!(%stage, error = %e, "probe failed, retrying"),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(expired());
            }
            tokio::time::sleep_until((now + self.config.poll_interval()).min(deadline)).await;
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Model replies may wrap the selector in fences or quotes.
fn clean_selector(reply: &str) -> String {
    let s = strip_code_fences(reply).trim();
    let s = s.strip_prefix(['"', '\'', '`']).unwrap_or(s);
    let s = s.strip_suffix(['"', '\'', '`']).unwrap_or(s);
    s.trim().to_string()
}
