//! Creation and verification workflows.
//!
//! A workflow receives each detected pattern and answers with an [`Outcome`],
//! the display mode the pattern should now be shown in, and optionally a
//! deferred reset to run after the configured delay.
//!
//! - `create` - draw a new secret twice; the second pass must match the first
//! - `compare` - encode and compare against a stored secret, with retries
//! - `captcha` - redraw a generated pattern, compared cell by cell

mod create;
mod verify;

pub use create::CreateFlow;
pub use verify::{CaptchaFlow, CompareFlow, RetryCounter};

use serde::{Deserialize, Serialize};
use sigil_common::{DisplayMode, EncodedSecret, Outcome, Pattern, Result};

/// Which procedure a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Create,
    Compare,
    Captcha,
}

/// Where a compare flow gets its expected secret
#[derive(Debug, Clone)]
pub enum SecretSource {
    /// A previously encoded secret
    Secret(EncodedSecret),
    /// A reference pattern, encoded once with the session's codec
    Pattern(Pattern),
    /// Whatever the injected store holds
    Store,
}

/// What a deferred reset does when it fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum ResetAction {
    /// Clear the wrong pattern
    Clear,
    /// Show this pattern again with `Animate`
    Replay(Pattern),
}

/// A workflow's answer to one detected pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub outcome: Outcome,
    pub display_mode: DisplayMode,
    pub reset: Option<ResetAction>,
}

impl Step {
    pub(crate) fn new(outcome: Outcome, display_mode: DisplayMode) -> Self {
        Self {
            outcome,
            display_mode,
            reset: None,
        }
    }

    pub(crate) fn with_reset(mut self, action: ResetAction) -> Self {
        self.reset = Some(action);
        self
    }
}

/// The procedure behind a session
#[derive(Debug)]
pub enum Workflow {
    Create(CreateFlow),
    Compare(CompareFlow),
    Captcha(CaptchaFlow),
}

impl Workflow {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Create(_) => Mode::Create,
            Self::Compare(_) => Mode::Compare,
            Self::Captcha(_) => Mode::Captcha,
        }
    }

    pub fn on_detected(&mut self, pattern: &Pattern) -> Result<Step> {
        match self {
            Self::Create(flow) => flow.on_detected(pattern),
            Self::Compare(flow) => flow.on_detected(pattern),
            Self::Captcha(flow) => flow.on_detected(pattern),
        }
    }

    /// Reaction to the recognizer clearing without a detection
    pub fn on_cleared(&self) -> Option<ResetAction> {
        match self {
            Self::Captcha(flow) => Some(flow.replay()),
            _ => None,
        }
    }

    /// What the grid shows before the first gesture
    pub fn initial_display(&self) -> Option<(DisplayMode, Pattern)> {
        match self {
            Self::Captcha(flow) => Some((DisplayMode::Animate, flow.challenge().pattern.clone())),
            _ => None,
        }
    }

    /// Drop the create candidate; no effect on verification flows
    pub fn restart(&mut self) {
        if let Self::Create(flow) = self {
            flow.restart();
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Create(flow) => flow.is_closed(),
            Self::Compare(flow) => flow.retries().is_closed(),
            Self::Captcha(flow) => flow.retries().is_closed(),
        }
    }

    /// Failed attempts so far (create: failed confirmations)
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Create(flow) => flow.mismatches(),
            Self::Compare(flow) => flow.retries().count(),
            Self::Captcha(flow) => flow.retries().count(),
        }
    }
}
