//! Serializable files written into a monitor directory.
//!
//! A monitor run writes two JSON files, both named after the run id:
//! - `gymsock.manifest.<run>.json`: [`Manifest`]
//! - `gymsock.stats.<run>.json`: [`EpisodeStats`]
//!
//! Captured video frames go to `gymsock.video.<run>.episode<NNNNNN>.raw`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Prefix shared by every file a monitor writes.
pub const FILE_PREFIX: &str = "gymsock.";

pub fn manifest_name(run: &str) -> String {
    format!("{FILE_PREFIX}manifest.{run}.json")
}

pub fn stats_name(run: &str) -> String {
    format!("{FILE_PREFIX}stats.{run}.json")
}

pub fn video_name(run: &str, episode: u64) -> String {
    format!("{FILE_PREFIX}video.{run}.episode{episode:06}.raw")
}

/// Whether `path` names a file written by a monitor.
pub fn is_monitor_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(FILE_PREFIX))
}

/// Whether `path` names a manifest.
pub fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(&format!("{FILE_PREFIX}manifest.")))
}

// ---------------------------------------------------------------------------
// EpisodeStats
// ---------------------------------------------------------------------------

/// Per-episode results of one monitor run, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    /// Unix time of the first reset, in seconds.
    pub initial_reset_timestamp: Option<f64>,
    /// Unix time at which each episode ended.
    pub timestamps: Vec<f64>,
    pub episode_lengths: Vec<u32>,
    pub episode_rewards: Vec<f64>,
}

impl EpisodeStats {
    pub fn len(&self) -> usize {
        self.episode_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episode_lengths.is_empty()
    }

    pub fn push(&mut self, timestamp: f64, length: u32, reward: f64) {
        self.timestamps.push(timestamp);
        self.episode_lengths.push(length);
        self.episode_rewards.push(reward);
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One captured episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    /// Global episode index, counting episodes of resumed runs.
    pub episode: u64,
    /// File name relative to the monitor directory.
    pub path: String,
    /// Shape of every frame.
    pub shape: Vec<usize>,
    pub frames: u32,
}

/// Index of a monitor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub env_id: String,
    /// Stats file name relative to the monitor directory.
    pub stats: String,
    /// Index of this run's first episode.
    pub first_episode: u64,
    pub videos: Vec<VideoEntry>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
