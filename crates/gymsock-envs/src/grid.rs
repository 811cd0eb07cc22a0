//! Pixel grid world with image observations.
//!
//! The agent walks an 8x8 grid towards a goal in the bottom-right corner.
//! Observations are `32x32x3` RGB images (4 pixels per cell), so this
//! environment exercises the binary observation path.

use gymsock_core::error::EnvError;
use gymsock_core::space::{BoxSpace, Space};
use gymsock_core::traits::{Environment, Options};
use gymsock_core::types::StepResult;
use gymsock_core::value::{Tensor, Value};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

use crate::decode_options;

pub const GRID_SIZE: usize = 8;
pub const CELL_PIXELS: usize = 4;
pub const IMAGE_SIZE: usize = GRID_SIZE * CELL_PIXELS;

const AGENT_COLOR: [u8; 3] = [220, 40, 40];
const GOAL_COLOR: [u8; 3] = [40, 200, 60];
const STEP_PENALTY: f64 = -0.01;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GridOptions {
    goal_reward: f64,
}

/// Grid world: actions `0..4` move up, right, down, left.
pub struct GridPixels {
    action_space: Space,
    observation_space: Space,
    agent: (usize, usize),
    goal: (usize, usize),
    goal_reward: f64,
    rng: ChaCha8Rng,
}

impl GridPixels {
    pub fn new(rng: ChaCha8Rng) -> Result<Self, EnvError> {
        Ok(Self {
            action_space: Space::discrete(4),
            observation_space: Space::Box(BoxSpace::image(vec![IMAGE_SIZE, IMAGE_SIZE, 3])?),
            agent: (0, 0),
            goal: (GRID_SIZE - 1, GRID_SIZE - 1),
            goal_reward: 1.0,
            rng,
        })
    }

    pub const fn agent(&self) -> (usize, usize) {
        self.agent
    }

    pub const fn goal(&self) -> (usize, usize) {
        self.goal
    }

    fn render_image(&self) -> Result<Value, EnvError> {
        let mut pixels = vec![0u8; IMAGE_SIZE * IMAGE_SIZE * 3];
        for ((row, col), color) in [(self.goal, GOAL_COLOR), (self.agent, AGENT_COLOR)] {
            for y in row * CELL_PIXELS..(row + 1) * CELL_PIXELS {
                for x in col * CELL_PIXELS..(col + 1) * CELL_PIXELS {
                    let at = (y * IMAGE_SIZE + x) * 3;
                    pixels[at..at + 3].copy_from_slice(&color);
                }
            }
        }
        Ok(Tensor::uint8(vec![IMAGE_SIZE, IMAGE_SIZE, 3], pixels)?.into())
    }
}

impl Environment for GridPixels {
    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        loop {
            let cell = (
                self.rng.gen_range(0..GRID_SIZE),
                self.rng.gen_range(0..GRID_SIZE),
            );
            if cell != self.goal {
                self.agent = cell;
                break;
            }
        }
        self.render_image()
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let (row, col) = self.agent;
        let last = GRID_SIZE - 1;
        self.agent = match action {
            Value::Discrete(0) => (row.saturating_sub(1), col),
            Value::Discrete(1) => (row, (col + 1).min(last)),
            Value::Discrete(2) => ((row + 1).min(last), col),
            Value::Discrete(3) => (row, col.saturating_sub(1)),
            other => {
                return Err(EnvError::StepFailed(format!(
                    "GridPixels expects an action in 0..4, got {other:?}"
                )));
            }
        };
        let done = self.agent == self.goal;
        let reward = if done { self.goal_reward } else { STEP_PENALTY };
        Ok(StepResult::new(self.render_image()?, reward, done))
    }

    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        let parsed: GridOptions = decode_options(options, "configure")?;
        if !parsed.goal_reward.is_finite() {
            return Err(EnvError::InvalidOptions {
                context: "configure",
                message: "goal_reward must be finite".into(),
            });
        }
        self.goal_reward = parsed.goal_reward;
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn id(&self) -> &str {
        "GridPixels-v0"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gymsock_core::value::Dtype;
    use gymsock_test_utils::seeded_rng;

    use super::*;

    fn pixel(obs: &Value, (row, col): (usize, usize)) -> [u8; 3] {
        let bytes = obs.as_tensor().unwrap().as_u8().unwrap();
        let at = (row * CELL_PIXELS * IMAGE_SIZE + col * CELL_PIXELS) * 3;
        [bytes[at], bytes[at + 1], bytes[at + 2]]
    }

    #[test]
    fn observation_is_uint8_image() {
        let mut env = GridPixels::new(seeded_rng(0)).unwrap();
        let obs = env.reset().unwrap();
        let tensor = obs.as_tensor().unwrap();
        assert_eq!(tensor.dtype(), Dtype::Uint8);
        assert_eq!(tensor.shape(), &[IMAGE_SIZE, IMAGE_SIZE, 3]);
        assert!(env.observation_space().contains(&obs));
        assert_eq!(pixel(&obs, env.agent()), AGENT_COLOR);
        assert_eq!(pixel(&obs, env.goal()), GOAL_COLOR);
    }

    #[test]
    fn walking_to_goal_ends_episode() {
        let mut env = GridPixels::new(seeded_rng(5)).unwrap();
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..GRID_SIZE {
            last = Some(env.step(Value::Discrete(2)).unwrap());
        }
        for _ in 0..GRID_SIZE {
            let result = env.step(Value::Discrete(1)).unwrap();
            let done = result.done;
            last = Some(result);
            if done {
                break;
            }
        }
        let last = last.unwrap();
        assert!(last.done);
        assert!((last.reward - 1.0).abs() < f64::EPSILON);
        assert_eq!(env.agent(), env.goal());
    }

    #[test]
    fn walls_clamp_movement() {
        let mut env = GridPixels::new(seeded_rng(1)).unwrap();
        env.reset().unwrap();
        for _ in 0..GRID_SIZE {
            env.step(Value::Discrete(0)).unwrap();
        }
        assert_eq!(env.agent().0, 0);
    }

    #[test]
    fn configure_goal_reward() {
        let mut env = GridPixels::new(seeded_rng(1)).unwrap();
        let options = serde_json::json!({"goal_reward": 5.0});
        env.configure(options.as_object().unwrap()).unwrap();
        assert!(env.configure(&Options::new()).is_err());
    }
}
