//! Environment that ignores its actions.

use gymsock_core::error::EnvError;
use gymsock_core::space::Space;
use gymsock_core::traits::Environment;
use gymsock_core::types::StepResult;
use gymsock_core::value::Value;

/// `Discrete(4)` action and observation spaces; every observation is `0`,
/// every reward `0.0`, and episodes never end.
pub struct NoOpEnv {
    space: Space,
}

impl NoOpEnv {
    pub const fn new() -> Self {
        Self {
            space: Space::discrete(4),
        }
    }
}

impl Default for NoOpEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for NoOpEnv {
    fn action_space(&self) -> &Space {
        &self.space
    }

    fn observation_space(&self) -> &Space {
        &self.space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        Ok(Value::Discrete(0))
    }

    fn step(&mut self, _action: Value) -> Result<StepResult, EnvError> {
        Ok(StepResult::new(Value::Discrete(0), 0.0, false))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn id(&self) -> &str {
        "no-op-env"
    }
}
