//! Per-episode counters shared by step-limit wrappers and recorders.

use std::num::NonZeroU32;

/// Where an episode is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    NotStarted,
    Running,
    /// The environment reported `done`.
    Terminated,
    /// The step limit was reached first.
    Truncated,
}

/// What a recorded step did to the episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// No episode was running; nothing was counted.
    Ignored,
    Continue,
    Terminated,
    Truncated,
}

impl StepOutcome {
    pub const fn ends_episode(self) -> bool {
        matches!(self, Self::Terminated | Self::Truncated)
    }
}

/// Length and return of the current episode, with an optional step limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Episode {
    phase: Phase,
    length: u32,
    reward: f64,
    limit: Option<NonZeroU32>,
}

impl Episode {
    /// An episode truncated after `limit` steps.
    pub const fn with_step_limit(limit: NonZeroU32) -> Self {
        Self {
            phase: Phase::NotStarted,
            length: 0,
            reward: 0.0,
            limit: Some(limit),
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn length(&self) -> u32 {
        self.length
    }

    pub const fn reward(&self) -> f64 {
        self.reward
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running)
    }

    /// Start counting from zero.
    pub const fn begin(&mut self) {
        self.phase = Phase::Running;
        self.length = 0;
        self.reward = 0.0;
    }

    /// Count one step. A `done` step terminates even when it also hits the
    /// limit.
    pub fn record(&mut self, reward: f64, done: bool) -> StepOutcome {
        if !self.is_running() {
            return StepOutcome::Ignored;
        }
        self.length = self.length.saturating_add(1);
        self.reward += reward;

        if done {
            self.phase = Phase::Terminated;
            StepOutcome::Terminated
        } else if self.limit.is_some_and(|limit| self.length >= limit.get()) {
            self.phase = Phase::Truncated;
            StepOutcome::Truncated
        } else {
            StepOutcome::Continue
        }
    }
}
