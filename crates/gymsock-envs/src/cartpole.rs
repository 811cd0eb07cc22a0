//! Classic cart-pole balancing task.
//!
//! Parameters follow the usual CartPole-v0 setup: cart mass 1.0 kg, pole
//! mass 0.1 kg, pole half-length 0.5 m, force 10 N, gravity 9.8 m/s²,
//! explicit Euler integration with dt = 0.02 s.

use std::f64::consts::PI;

use gymsock_core::error::EnvError;
use gymsock_core::space::{BoxSpace, Space};
use gymsock_core::traits::{Environment, Options};
use gymsock_core::types::StepResult;
use gymsock_core::value::{Tensor, Value};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tracing::warn;

use crate::decode_options;

const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const HALF_LENGTH: f64 = 0.5;
const TAU: f64 = 0.02;

/// Pole angle at which the episode fails, in radians (12 degrees).
pub const THETA_THRESHOLD: f64 = 12.0 * 2.0 * PI / 360.0;
/// Cart position at which the episode fails.
pub const X_THRESHOLD: f64 = 2.4;

/// Runtime-tunable physics, see [`CartPole::configure`](Environment::configure).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartPoleParams {
    pub gravity: f64,
    pub force_mag: f64,
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            force_mag: 10.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CartPoleOptions {
    gravity: Option<f64>,
    force_mag: Option<f64>,
}

/// Cart-pole with a `Discrete(2)` action (push left, push right) and a
/// 4-element observation `[x, x_dot, theta, theta_dot]`.
pub struct CartPole {
    action_space: Space,
    observation_space: Space,
    params: CartPoleParams,
    state: [f64; 4],
    steps_beyond_done: Option<u32>,
    rng: ChaCha8Rng,
}

impl CartPole {
    pub fn new(rng: ChaCha8Rng) -> Result<Self, EnvError> {
        let high = vec![X_THRESHOLD * 2.0, f64::MAX, THETA_THRESHOLD * 2.0, f64::MAX];
        let low = high.iter().map(|h| -h).collect();
        Ok(Self {
            action_space: Space::discrete(2),
            observation_space: Space::Box(BoxSpace::new(vec![4], low, high)?),
            params: CartPoleParams::default(),
            state: [0.0; 4],
            steps_beyond_done: None,
            rng,
        })
    }

    pub const fn params(&self) -> CartPoleParams {
        self.params
    }

    pub const fn state(&self) -> [f64; 4] {
        self.state
    }

    fn observation(&self) -> Result<Value, EnvError> {
        Ok(Tensor::float64(vec![4], self.state.to_vec())?.into())
    }

    fn integrate(&mut self, push_right: bool) {
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if push_right {
            self.params.force_mag
        } else {
            -self.params.force_mag
        };
        let total_mass = MASS_CART + MASS_POLE;
        let pole_mass_length = MASS_POLE * HALF_LENGTH;
        let (sin, cos) = theta.sin_cos();

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin) / total_mass;
        let theta_acc = (self.params.gravity * sin - cos * temp)
            / (HALF_LENGTH * (4.0 / 3.0 - MASS_POLE * cos * cos / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos / total_mass;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
    }

    fn failed(&self) -> bool {
        let [x, _, theta, _] = self.state;
        !(-X_THRESHOLD..=X_THRESHOLD).contains(&x)
            || !(-THETA_THRESHOLD..=THETA_THRESHOLD).contains(&theta)
    }
}

impl Environment for CartPole {
    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        for s in &mut self.state {
            *s = self.rng.gen_range(-0.05..=0.05);
        }
        self.steps_beyond_done = None;
        self.observation()
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let push_right = match action {
            Value::Discrete(0) => false,
            Value::Discrete(1) => true,
            other => {
                return Err(EnvError::StepFailed(format!(
                    "CartPole expects action 0 or 1, got {other:?}"
                )));
            }
        };
        self.integrate(push_right);
        let done = self.failed();

        let reward = match self.steps_beyond_done {
            None => {
                if done {
                    self.steps_beyond_done = Some(0);
                }
                1.0
            }
            Some(beyond) => {
                if beyond == 0 {
                    warn!("step called after the episode ended; call reset first");
                }
                self.steps_beyond_done = Some(beyond + 1);
                0.0
            }
        };
        Ok(StepResult::new(self.observation()?, reward, done))
    }

    /// Accepts `gravity` and `force_mag`; both must be finite and
    /// `force_mag` positive.
    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        let parsed: CartPoleOptions = decode_options(options, "configure")?;
        let mut params = self.params;
        if let Some(gravity) = parsed.gravity {
            params.gravity = gravity;
        }
        if let Some(force_mag) = parsed.force_mag {
            params.force_mag = force_mag;
        }
        if !params.gravity.is_finite() || !(params.force_mag.is_finite() && params.force_mag > 0.0)
        {
            return Err(EnvError::InvalidOptions {
                context: "configure",
                message: "gravity must be finite and force_mag positive".into(),
            });
        }
        self.params = params;
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn id(&self) -> &str {
        "CartPole-v0"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
