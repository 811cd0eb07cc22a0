//! Recording hooks for gymsock sessions.
//!
//! - [`monitor`]: [`FileMonitor`] and the [`MonitorEnv`] wrapper it installs,
//!   writing per-episode statistics and captured image frames
//! - [`publish`]: [`DirectoryPublisher`], the upload hook
//! - [`types`]: the JSON files a monitor run writes

pub mod monitor;
pub mod publish;
pub mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use monitor::{FileMonitor, MonitorEnv, capped_cubic_video_schedule};
pub use publish::DirectoryPublisher;
pub use types::{EpisodeStats, Manifest, VideoEntry};
