use std::path::PathBuf;

use rand::RngCore;
use serde_json::{Map, Value as Json};

use crate::error::EnvError;
use crate::space::Space;
use crate::types::StepResult;
use crate::value::Value;

/// JSON object of named options, as received from `configure`/`wrap`.
pub type Options = Map<String, Json>;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A stateful simulation driven one step at a time.
///
/// A session owns exactly one environment at a time and calls it from a
/// single thread, so implementations only need to be [`Send`].
pub trait Environment: Send {
    /// Domain of valid actions.
    fn action_space(&self) -> &Space;

    /// Domain of observations produced by `reset` and `step`.
    fn observation_space(&self) -> &Space;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Value, EnvError>;

    /// Apply an action already decoded against [`Self::action_space`].
    fn step(&mut self, action: Value) -> Result<StepResult, EnvError>;

    fn render(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    /// Release resources. Called once, when the owning session ends.
    fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    /// Draw a random action. The default samples the action space.
    fn sample_action(&mut self, rng: &mut dyn RngCore) -> Result<Value, EnvError> {
        Ok(self.action_space().sample(rng)?)
    }

    /// Apply named runtime options. Must be atomic: on error nothing changed.
    fn configure(&mut self, options: &Options) -> Result<(), EnvError> {
        let _ = options;
        Err(EnvError::Unsupported("configure".into()))
    }

    /// Registry id of the innermost environment.
    fn id(&self) -> &str {
        "unnamed"
    }
}

impl std::fmt::Debug for dyn Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

/// Constructs environments by name. Shared by every session of a server.
pub trait EnvironmentProvider: Send + Sync {
    fn make(&self, name: &str) -> Result<Box<dyn Environment>, EnvError>;
}

// ---------------------------------------------------------------------------
// Handoff
// ---------------------------------------------------------------------------

/// A refused environment replacement: the error, plus the untouched
/// environment handed back to its owner.
#[derive(Debug)]
pub struct Rejected {
    pub env: Box<dyn Environment>,
    pub error: EnvError,
}

impl Rejected {
    pub fn new(env: Box<dyn Environment>, error: impl Into<EnvError>) -> Self {
        Self {
            env,
            error: error.into(),
        }
    }
}

/// Outcome of a hook that consumes the current environment: the environment
/// to install, or the old one back with the reason.
pub type Handoff = Result<Box<dyn Environment>, Rejected>;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Parameters of the `monitor` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Continue numbering after existing monitor files.
    pub resume: bool,
    /// Delete existing monitor files first.
    pub force: bool,
    /// Capture image observations on the video schedule.
    pub video: bool,
    pub directory: PathBuf,
}

/// Wraps an environment with recording.
pub trait Monitor: Send + Sync {
    fn start(&self, env: Box<dyn Environment>, options: &MonitorOptions) -> Handoff;
}

/// Parameters of the `upload` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub directory: PathBuf,
    pub api_key: String,
    pub algorithm_id: Option<String>,
}

/// Publishes a monitor directory.
pub trait Uploader: Send + Sync {
    fn upload(&self, request: &UploadRequest) -> Result<(), EnvError>;
}

/// Optional environment manipulation (`configure` and `wrap`).
pub trait Extension: Send + Sync {
    fn configure(&self, env: Box<dyn Environment>, options: &Options) -> Handoff;

    fn wrap(&self, env: Box<dyn Environment>, name: &str, options: &Options) -> Handoff;
}

/// Extension capability when the server runs without extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExtension;

impl Extension for DisabledExtension {
    fn configure(&self, env: Box<dyn Environment>, _options: &Options) -> Handoff {
        Err(Rejected::new(env, EnvError::ExtensionsDisabled))
    }

    fn wrap(&self, env: Box<dyn Environment>, _name: &str, _options: &Options) -> Handoff {
        Err(Rejected::new(env, EnvError::ExtensionsDisabled))
    }
}

/// Uploader used when no publish destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUploader;

impl Uploader for DisabledUploader {
    fn upload(&self, _request: &UploadRequest) -> Result<(), EnvError> {
        Err(EnvError::UploadsDisabled)
    }
}

/// The capabilities a session can call besides the environment itself.
pub struct Hooks {
    pub monitor: Box<dyn Monitor>,
    pub uploader: Box<dyn Uploader>,
    pub extension: Box<dyn Extension>,
}

impl Hooks {
    /// Hooks with the given monitor and uploads and extensions disabled.
    pub fn new(monitor: impl Monitor + 'static) -> Self {
        Self {
            monitor: Box::new(monitor),
            uploader: Box::new(DisabledUploader),
            extension: Box::new(DisabledExtension),
        }
    }

    #[must_use]
    pub fn with_uploader(mut self, uploader: impl Uploader + 'static) -> Self {
        self.uploader = Box::new(uploader);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extension = Box::new(extension);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
