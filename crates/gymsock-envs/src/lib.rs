//! Environments served by gymsock.
//!
//! - [`registry`]: [`Registry`], the default environment provider
//! - [`noop`], [`cartpole`], [`grid`]: built-in environments
//! - [`wrappers`]: [`WrapperExtension`] and the wrappers it installs

pub mod cartpole;
pub mod grid;
pub mod noop;
pub mod registry;
pub mod wrappers;

use gymsock_core::error::EnvError;
use gymsock_core::traits::Options;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use cartpole::CartPole;
pub use grid::GridPixels;
pub use noop::NoOpEnv;
pub use registry::{EnvSpec, Registry};
pub use wrappers::{CropObservations, JsonSpacesEnv, TimeLimit, WrapperExtension};

/// Decode named options into `T`, reporting failures as
/// `bad <context> options: …`.
pub fn decode_options<T: DeserializeOwned>(
    options: &Options,
    context: &'static str,
) -> Result<T, EnvError> {
    serde_json::from_value(serde_json::Value::Object(options.clone())).map_err(|e| {
        EnvError::InvalidOptions {
            context,
            message: e.to_string(),
        }
    })
}
