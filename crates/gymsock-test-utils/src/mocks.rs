//! Mock implementations of the environment traits for testing.
//!
//! [`ScriptedEnv`] returns canned values and appends every call it receives
//! to a shared [`CallLog`], so a test can assert what a session did to the
//! environment after the environment itself has been moved or dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use gymsock_core::error::EnvError;
use gymsock_core::space::Space;
use gymsock_core::traits::{Environment, EnvironmentProvider, Options};
use gymsock_core::types::{Info, StepResult};
use gymsock_core::value::Value;

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Shared, clonable record of environment calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

// ---------------------------------------------------------------------------
// ScriptedEnv
// ---------------------------------------------------------------------------

/// Environment returning a fixed observation, reward and metadata.
pub struct ScriptedEnv {
    id: String,
    action_space: Space,
    observation_space: Space,
    observation: Value,
    reward: f64,
    info: Info,
    done_after: Option<u32>,
    steps: u32,
    fail_reset: bool,
    fail_render: bool,
    log: CallLog,
}

impl ScriptedEnv {
    pub fn new(action_space: Space, observation_space: Space, observation: Value) -> Self {
        Self {
            id: "scripted".into(),
            action_space,
            observation_space,
            observation,
            reward: 0.0,
            info: Info::new(),
            done_after: None,
            steps: 0,
            fail_reset: false,
            fail_render: false,
            log: CallLog::default(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub const fn with_reward(mut self, reward: f64) -> Self {
        self.reward = reward;
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: Info) -> Self {
        self.info = info;
        self
    }

    /// Report `done` on every step from the `n`th step of an episode on.
    #[must_use]
    pub const fn done_after(mut self, n: u32) -> Self {
        self.done_after = Some(n);
        self
    }

    #[must_use]
    pub const fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    #[must_use]
    pub const fn failing_render(mut self) -> Self {
        self.fail_render = true;
        self
    }

    /// Record calls into `log` instead of a private log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Environment for ScriptedEnv {
    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        self.log.push("reset");
        if self.fail_reset {
            return Err(EnvError::ResetFailed("scripted failure".into()));
        }
        self.steps = 0;
        Ok(self.observation.clone())
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        self.log.push("step");
        if !self.action_space.contains(&action) {
            return Err(EnvError::StepFailed(format!("action {action:?} outside space")));
        }
        self.steps += 1;
        let done = self.done_after.is_some_and(|n| self.steps >= n);
        Ok(StepResult {
            observation: self.observation.clone(),
            reward: self.reward,
            done,
            info: self.info.clone(),
        })
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.log.push("render");
        if self.fail_render {
            return Err(EnvError::RenderFailed("scripted failure".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.log.push("close");
        Ok(())
    }

    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        if let Some(key) = options.keys().find(|k| k.as_str() != "difficulty") {
            return Err(EnvError::InvalidOptions {
                context: "configure",
                message: format!("unexpected option {key:?}"),
            });
        }
        self.log.push("configure");
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// `Discrete(4)` action and observation spaces, observation always `0`.
pub fn noop_env() -> ScriptedEnv {
    ScriptedEnv::new(Space::discrete(4), Space::discrete(4), Value::Discrete(0)).with_id("no-op-env")
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

type Factory = Box<dyn Fn() -> Box<dyn Environment> + Send + Sync>;

/// Provider backed by named closures.
#[derive(Default)]
pub struct MockProvider {
    factories: BTreeMap<String, Factory>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<E, F>(mut self, name: &str, factory: F) -> Self
    where
        E: Environment + 'static,
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_owned(),
            Box::new(move || Box::new(factory()) as Box<dyn Environment>),
        );
        self
    }

    /// Provider serving [`noop_env`] as `"no-op-env"`.
    pub fn noop() -> Self {
        Self::new().with("no-op-env", noop_env)
    }
}

impl EnvironmentProvider for MockProvider {
    fn make(&self, name: &str) -> Result<Box<dyn Environment>, EnvError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EnvError::UnknownEnvironment(name.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
