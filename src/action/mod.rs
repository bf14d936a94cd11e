//! Bounded-retry driver for the external watering page.
//!
//! One run performs up to `attempts` full sessions against the target. Each
//! session waits for the trigger element, clicks it, then waits for the
//! confirmation element. A missing element ends the whole run early; it is
//! never retried.

mod target;

pub use target::{extract_target, validate_target, TargetError};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::{info, warn};

use crate::browser::{Browser, BrowserSession};
use crate::config::BrowserConfig;

/// Default number of confirmed attempts a run needs to succeed.
pub const LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every attempt confirmed.
    Success,
    /// The run stopped early after this many confirmed attempts.
    PartialFailure(u32),
}

/// Result of one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRun {
    pub target: reqwest::Url,
    pub attempts_made: u32,
    pub limit: u32,
    pub outcome: Outcome,
}

impl ActionRun {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Which step of an attempt failed to find its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Confirmed,
    TriggerMissing,
    ConfirmationMissing,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub trigger_selector: String,
    pub confirm_selector: String,
    pub attempts: u32,
    pub trigger_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl From<&BrowserConfig> for ExecutorSettings {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            trigger_selector: config.trigger_selector.clone(),
            confirm_selector: config.confirm_selector.clone(),
            attempts: config.attempts,
            trigger_timeout: Duration::from_secs(config.trigger_timeout_secs),
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
        }
    }
}

pub struct ActionExecutor {
    browser: Arc<dyn Browser>,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(browser: Arc<dyn Browser>, settings: ExecutorSettings) -> Self {
        Self { browser, settings }
    }

    pub fn limit(&self) -> u32 {
        self.settings.attempts
    }

    /// Drive the target until `limit` attempts confirm or one step comes up
    /// empty. Transport and backend errors propagate untouched.
    pub async fn perform(&self, target: &reqwest::Url) -> Result<ActionRun> {
        let limit = self.settings.attempts;
        let mut attempts = 0;

        while attempts < limit {
            info!("Action attempt {}/{} against {}", attempts + 1, limit, target);

            match self.attempt(target).await? {
                Step::Confirmed => attempts += 1,
                Step::TriggerMissing | Step::ConfirmationMissing => {
                    return Ok(ActionRun {
                        target: target.clone(),
                        attempts_made: attempts,
                        limit,
                        outcome: Outcome::PartialFailure(attempts),
                    });
                }
            }
        }

        Ok(ActionRun {
            target: target.clone(),
            attempts_made: attempts,
            limit,
            outcome: Outcome::Success,
        })
    }

    /// One session from open to close. The session is released whatever
    /// the steps return, and before a panic in them continues unwinding.
    async fn attempt(&self, target: &reqwest::Url) -> Result<Step> {
        let mut session = self.browser.open_session().await?;
        let step = AssertUnwindSafe(self.drive(session.as_mut(), target))
            .catch_unwind()
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {:#}", e);
        }

        match step {
            Ok(step) => step,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn drive(&self, session: &mut dyn BrowserSession, target: &reqwest::Url) -> Result<Step> {
        let settings = &self.settings;

        session.goto(target.as_str()).await?;

        if !session
            .wait_for(&settings.trigger_selector, settings.trigger_timeout)
            .await?
        {
            warn!("Trigger element '{}' never appeared", settings.trigger_selector);
            return Ok(Step::TriggerMissing);
        }

        session.click(&settings.trigger_selector).await?;

        if !session
            .wait_for(&settings.confirm_selector, settings.confirm_timeout)
            .await?
        {
            warn!(
                "Confirmation element '{}' never appeared",
                settings.confirm_selector
            );
            return Ok(Step::ConfirmationMissing);
        }

        Ok(Step::Confirmed)
    }
}
