//! Environment wrappers and the extension that installs them.
//!
//! [`WrapperExtension`] serves the `configure` and `wrap` commands. Each
//! wrapper validates its options against the wrapped environment before it
//! takes ownership, so a refused request hands the environment back
//! untouched.

use std::num::NonZeroU32;

use gymsock_core::episode::{Episode, StepOutcome};
use gymsock_core::error::{EnvError, SpaceError};
use gymsock_core::space::{BoxSpace, Space};
use gymsock_core::traits::{Environment, Extension, Handoff, Options, Rejected};
use gymsock_core::types::StepResult;
use gymsock_core::value::{Dtype, Tensor, Value};
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;

use crate::decode_options;

/// Metadata key set when [`TimeLimit`] ends an episode.
pub const TRUNCATED_KEY: &str = "TimeLimit.truncated";

/// Names accepted by [`WrapperExtension::wrap`].
pub const WRAPPERS: [&str; 2] = ["CropObservations", "TimeLimit"];

// ---------------------------------------------------------------------------
// WrapperExtension
// ---------------------------------------------------------------------------

/// Enabled extension: `configure` forwards to the environment, `wrap`
/// installs a wrapper from [`WRAPPERS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapperExtension;

impl Extension for WrapperExtension {
    fn configure(&self, mut env: Box<dyn Environment>, options: &Options) -> Handoff {
        if let Err(e) = env.configure(options) {
            return Err(Rejected::new(env, e));
        }
        debug!(env = env.id(), "configured");
        Ok(Box::new(JsonSpacesEnv::new(env)))
    }

    fn wrap(&self, env: Box<dyn Environment>, name: &str, options: &Options) -> Handoff {
        match name {
            "TimeLimit" => match decode_options::<TimeLimitOptions>(options, "wrapper") {
                Ok(opts) => Ok(Box::new(TimeLimit::new(env, opts.max_episode_steps))),
                Err(e) => Err(Rejected::new(env, e)),
            },
            "CropObservations" => {
                let crop = decode_options::<CropOptions>(options, "wrapper")
                    .and_then(|opts| Crop::fit(env.observation_space(), &opts));
                match crop {
                    Ok((crop, space)) => Ok(Box::new(CropObservations {
                        inner: env,
                        crop,
                        observation_space: space,
                    })),
                    Err(e) => Err(Rejected::new(env, e)),
                }
            }
            other => Err(Rejected::new(env, EnvError::UnknownWrapper(other.to_owned()))),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeLimit
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeLimitOptions {
    max_episode_steps: NonZeroU32,
}

/// Ends an episode after a fixed number of steps, adding
/// `"TimeLimit.truncated": true` to the metadata of the final step.
pub struct TimeLimit {
    inner: Box<dyn Environment>,
    episode: Episode,
}

impl TimeLimit {
    pub fn new(inner: Box<dyn Environment>, max_episode_steps: NonZeroU32) -> Self {
        Self {
            inner,
            episode: Episode::with_step_limit(max_episode_steps),
        }
    }

    pub const fn elapsed_steps(&self) -> u32 {
        self.episode.length()
    }
}

impl Environment for TimeLimit {
    fn action_space(&self) -> &Space {
        self.inner.action_space()
    }

    fn observation_space(&self) -> &Space {
        self.inner.observation_space()
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        let obs = self.inner.reset()?;
        self.episode.begin();
        Ok(obs)
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let mut result = self.inner.step(action)?;
        if self.episode.record(result.reward, result.done) == StepOutcome::Truncated {
            result.done = true;
            result = result.with_info(TRUNCATED_KEY, true);
        }
        Ok(result)
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.inner.close()
    }

    fn sample_action(&mut self, rng: &mut dyn RngCore) -> Result<Value, EnvError> {
        self.inner.sample_action(rng)
    }

    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        self.inner.configure(options)
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}

// ---------------------------------------------------------------------------
// CropObservations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct CropOptions {
    height: usize,
    width: usize,
    #[serde(default)]
    top: usize,
    #[serde(default)]
    left: usize,
}

/// Window into a `[H, W, C]` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Crop {
    top: usize,
    left: usize,
    height: usize,
    width: usize,
    source_height: usize,
    source_width: usize,
    channels: usize,
}

impl Crop {
    /// Check the window against an image space and build the cropped space.
    fn fit(space: &Space, opts: &CropOptions) -> Result<(Self, Space), EnvError> {
        let bad = |message: String| EnvError::InvalidOptions {
            context: "wrapper",
            message,
        };
        let Space::Box(image) = space else {
            return Err(bad(format!(
                "CropObservations needs a Box observation space, got {}",
                space.kind()
            )));
        };
        let &[source_height, source_width, channels] = image.shape() else {
            return Err(bad(format!(
                "CropObservations needs a [height, width, channels] image, got shape {:?}",
                image.shape()
            )));
        };
        if image.dtype() != Dtype::Uint8 {
            return Err(bad("CropObservations needs a uint8 image".into()));
        }
        if opts.height == 0
            || opts.width == 0
            || opts.top.checked_add(opts.height).is_none_or(|end| end > source_height)
            || opts.left.checked_add(opts.width).is_none_or(|end| end > source_width)
        {
            return Err(bad(format!(
                "crop {}x{} at ({}, {}) does not fit a {source_height}x{source_width} image",
                opts.height, opts.width, opts.top, opts.left
            )));
        }

        let crop = Self {
            top: opts.top,
            left: opts.left,
            height: opts.height,
            width: opts.width,
            source_height,
            source_width,
            channels,
        };
        let cropped = BoxSpace::new(
            crop.shape(),
            crop.apply(image.low()),
            crop.apply(image.high()),
        )
        .and_then(|b| b.with_dtype(Dtype::Uint8))?;
        Ok((crop, Space::Box(cropped)))
    }

    const fn options(&self) -> CropOptions {
        CropOptions {
            height: self.height,
            width: self.width,
            top: self.top,
            left: self.left,
        }
    }

    fn source_shape(&self) -> [usize; 3] {
        [self.source_height, self.source_width, self.channels]
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.height, self.width, self.channels]
    }

    fn apply<T: Copy>(&self, data: &[T]) -> Vec<T> {
        let row_len = self.source_width * self.channels;
        let mut out = Vec::with_capacity(self.height * self.width * self.channels);
        for row in self.top..self.top + self.height {
            let start = row * row_len + self.left * self.channels;
            out.extend_from_slice(&data[start..start + self.width * self.channels]);
        }
        out
    }
}

/// Crops image observations to a fixed window.
pub struct CropObservations {
    inner: Box<dyn Environment>,
    crop: Crop,
    observation_space: Space,
}

impl CropObservations {
    fn crop_value(&self, obs: Value) -> Result<Value, EnvError> {
        let Some((tensor, bytes)) = obs
            .as_tensor()
            .and_then(|t| t.as_u8().map(|bytes| (t, bytes)))
        else {
            return Err(SpaceError::TypeMismatch {
                expected: "uint8 image".into(),
                got: obs.kind().into(),
            }
            .into());
        };
        let expected = self.crop.source_shape();
        if tensor.shape() != expected {
            return Err(SpaceError::ShapeMismatch {
                expected: expected.to_vec(),
                got: tensor.shape().to_vec(),
            }
            .into());
        }
        Ok(Tensor::uint8(self.crop.shape(), self.crop.apply(bytes))?.into())
    }
}

impl Environment for CropObservations {
    fn action_space(&self) -> &Space {
        self.inner.action_space()
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        let obs = self.inner.reset()?;
        self.crop_value(obs)
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let mut result = self.inner.step(action)?;
        result.observation = self.crop_value(result.observation)?;
        Ok(result)
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.inner.close()
    }

    fn sample_action(&mut self, rng: &mut dyn RngCore) -> Result<Value, EnvError> {
        self.inner.sample_action(rng)
    }

    /// Reconfigures the inner environment, then fits the window to its
    /// observation space again.
    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        self.inner.configure(options)?;
        let (crop, space) = Crop::fit(self.inner.observation_space(), &self.crop.options())?;
        self.crop = crop;
        self.observation_space = space;
        Ok(())
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}

// ---------------------------------------------------------------------------
// JsonSpacesEnv
// ---------------------------------------------------------------------------

/// Re-types every Box space to `float64`, so observations always travel on
/// the JSON path. Actions are narrowed back to the inner element types.
pub struct JsonSpacesEnv {
    inner: Box<dyn Environment>,
    action_space: Space,
    observation_space: Space,
}

impl JsonSpacesEnv {
    pub fn new(inner: Box<dyn Environment>) -> Self {
        Self {
            action_space: widen_space(inner.action_space()),
            observation_space: widen_space(inner.observation_space()),
            inner,
        }
    }
}

fn widen_space(space: &Space) -> Space {
    match space {
        Space::Box(b) => Space::Box(b.to_float64()),
        Space::Tuple { subspaces } => Space::tuple(subspaces.iter().map(widen_space).collect()),
        other => other.clone(),
    }
}

fn widen_value(value: Value) -> Value {
    match value {
        Value::Box(t) if t.dtype() == Dtype::Uint8 => Value::Box(t.to_float64()),
        Value::Tuple(items) => Value::Tuple(items.into_iter().map(widen_value).collect()),
        other => other,
    }
}

/// Convert a widened action back to the element types of `space`.
fn narrow_value(value: Value, space: &Space) -> Result<Value, SpaceError> {
    match (value, space) {
        (Value::Box(t), Space::Box(b)) if b.dtype() == Dtype::Uint8 => {
            Ok(Value::Box(t.to_uint8()?))
        }
        (Value::Tuple(items), Space::Tuple { subspaces }) if items.len() == subspaces.len() => {
            items
                .into_iter()
                .zip(subspaces)
                .map(|(item, sub)| narrow_value(item, sub))
                .collect::<Result<_, _>>()
                .map(Value::Tuple)
        }
        (other, _) => Ok(other),
    }
}

impl Environment for JsonSpacesEnv {
    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<Value, EnvError> {
        Ok(widen_value(self.inner.reset()?))
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let action = narrow_value(action, self.inner.action_space())?;
        let mut result = self.inner.step(action)?;
        result.observation = widen_value(result.observation);
        Ok(result)
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.inner.close()
    }

    fn sample_action(&mut self, rng: &mut dyn RngCore) -> Result<Value, EnvError> {
        Ok(widen_value(self.inner.sample_action(rng)?))
    }

    /// Reconfigures the inner environment; the spaces are re-derived.
    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        self.inner.configure(options)?;
        self.action_space = widen_space(self.inner.action_space());
        self.observation_space = widen_space(self.inner.observation_space());
        Ok(())
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
