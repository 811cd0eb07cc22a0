//! Named environment constructors.
//!
//! [`Registry`] is the [`EnvironmentProvider`] the server uses by default.
//! Every entry has an id, a one-line description and an optional episode
//! step limit; entries with a limit are wrapped in [`TimeLimit`] on
//! construction.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use gymsock_core::error::EnvError;
use gymsock_core::seed::{derive_seed, session_rng};
use gymsock_core::traits::{Environment, EnvironmentProvider};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::cartpole::CartPole;
use crate::grid::GridPixels;
use crate::noop::NoOpEnv;
use crate::wrappers::TimeLimit;

type Factory = fn(ChaCha8Rng) -> Result<Box<dyn Environment>, EnvError>;

/// One registered environment.
#[derive(Clone)]
pub struct EnvSpec {
    pub id: &'static str,
    pub description: &'static str,
    /// Steps after which an episode is truncated.
    pub max_episode_steps: Option<NonZeroU32>,
    factory: Factory,
}

impl EnvSpec {
    pub const fn new(id: &'static str, description: &'static str, factory: Factory) -> Self {
        Self {
            id,
            description,
            max_episode_steps: None,
            factory,
        }
    }

    #[must_use]
    pub const fn with_max_episode_steps(mut self, steps: u32) -> Self {
        self.max_episode_steps = NonZeroU32::new(steps);
        self
    }
}

impl std::fmt::Debug for EnvSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSpec")
            .field("id", &self.id)
            .field("max_episode_steps", &self.max_episode_steps)
            .finish_non_exhaustive()
    }
}

/// Environment provider backed by a fixed table of [`EnvSpec`]s.
#[derive(Debug, Default)]
pub struct Registry {
    specs: BTreeMap<&'static str, EnvSpec>,
    seed: Option<u64>,
    constructed: AtomicU64,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in environments: `no-op-env`, `CartPole-v0` and
    /// `GridPixels-v0`.
    pub fn builtin() -> Self {
        Self::new()
            .register(EnvSpec::new(
                "no-op-env",
                "Discrete(4) spaces, constant observation, never done",
                |_| Ok(Box::new(NoOpEnv::new())),
            ))
            .register(
                EnvSpec::new(
                    "CartPole-v0",
                    "Balance a pole on a cart; Discrete(2) actions, Box(4) observations",
                    |rng| Ok(Box::new(CartPole::new(rng)?)),
                )
                .with_max_episode_steps(200),
            )
            .register(
                EnvSpec::new(
                    "GridPixels-v0",
                    "Walk to the goal of an 8x8 grid; uint8 32x32x3 image observations",
                    |rng| Ok(Box::new(GridPixels::new(rng)?)),
                )
                .with_max_episode_steps(100),
            )
    }

    /// Add or replace an entry.
    #[must_use]
    pub fn register(mut self, spec: EnvSpec) -> Self {
        self.specs.insert(spec.id, spec);
        self
    }

    /// Seed environment RNGs from `seed`, the environment id and a
    /// construction counter. Without a seed they use OS entropy.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Registered ids in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.keys().copied()
    }

    pub fn specs(&self) -> impl Iterator<Item = &EnvSpec> {
        self.specs.values()
    }

    pub fn get(&self, id: &str) -> Option<&EnvSpec> {
        self.specs.get(id)
    }
}

impl EnvironmentProvider for Registry {
    fn make(&self, name: &str) -> Result<Box<dyn Environment>, EnvError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| EnvError::UnknownEnvironment(name.to_owned()))?;
        let index = self.constructed.fetch_add(1, Ordering::Relaxed);
        let rng = session_rng(self.seed.map(|s| derive_seed(s, spec.id)), index);

        let env = (spec.factory)(rng).map_err(|e| EnvError::Construction {
            name: name.to_owned(),
            message: e.to_string(),
        })?;
        debug!(env = spec.id, limit = ?spec.max_episode_steps, "environment constructed");
        Ok(match spec.max_episode_steps {
            Some(limit) => Box::new(TimeLimit::new(env, limit)),
            None => env,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gymsock_core::space::Space;
    use gymsock_core::value::Value;

    use super::*;

    #[test]
    fn builtin_names_sorted() {
        let names: Vec<_> = Registry::builtin().names().collect();
        assert_eq!(names, ["CartPole-v0", "GridPixels-v0", "no-op-env"]);
    }

    #[test]
    fn unknown_id_is_reported() {
        let err = Registry::builtin().make("Pendulum-v9").unwrap_err();
        assert_eq!(
            err.to_string(),
            "no registered environment with id: Pendulum-v9"
        );
    }

    #[test]
    fn make_noop() {
        let mut env = Registry::builtin().make("no-op-env").unwrap();
        assert_eq!(env.id(), "no-op-env");
        assert_eq!(env.action_space(), &Space::discrete(4));
        assert_eq!(env.reset().unwrap(), Value::Discrete(0));
    }

    #[test]
    fn limited_envs_are_truncated() {
        let registry = Registry::builtin().register(
            EnvSpec::new("short-noop", "test", |_| Ok(Box::new(NoOpEnv::new())))
                .with_max_episode_steps(3),
        );
        let mut env = registry.make("short-noop").unwrap();
        env.reset().unwrap();
        assert!(!env.step(Value::Discrete(0)).unwrap().done);
        assert!(!env.step(Value::Discrete(0)).unwrap().done);
        assert!(env.step(Value::Discrete(0)).unwrap().done);
    }

    #[test]
    fn seeded_registries_agree() {
        let a = Registry::builtin().with_seed(Some(9));
        let b = Registry::builtin().with_seed(Some(9));
        let obs_a = a.make("CartPole-v0").unwrap().reset().unwrap();
        let obs_b = b.make("CartPole-v0").unwrap().reset().unwrap();
        assert_eq!(obs_a, obs_b);
    }

    #[test]
    fn construction_failure_names_env() {
        let registry = Registry::new().register(EnvSpec::new("broken", "fails", |_| {
            Err(EnvError::Unsupported("no display".into()))
        }));
        let err = registry.make("broken").unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment broken could not be created: operation not supported: no display"
        );
    }
}
