//! Shared test fixtures and utilities for gymsock crates.
//!
//! Provides scripted environments that record how they are driven, simple
//! providers and hooks, and deterministic RNG setup.

pub mod hooks;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use hooks::{AcceptingMonitor, RecordingUploader, RejectingMonitor, test_hooks};
pub use mocks::{CallLog, MockProvider, ScriptedEnv, noop_env};
pub use rng::seeded_rng;
