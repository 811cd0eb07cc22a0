//! Episode monitor writing statistics and captured frames to a directory.
//!
//! [`FileMonitor`] is the [`Monitor`] hook: it prepares the directory and
//! wraps the session's environment in a [`MonitorEnv`]. The wrapper writes
//! the run's [`Manifest`] and [`EpisodeStats`] whenever an episode ends and
//! when the environment is closed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use gymsock_core::episode::{Episode, StepOutcome};
use gymsock_core::error::EnvError;
use gymsock_core::space::Space;
use gymsock_core::traits::{Environment, Handoff, Monitor, MonitorOptions, Options, Rejected};
use gymsock_core::types::StepResult;
use gymsock_core::value::Value;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::{
    EpisodeStats, Manifest, VideoEntry, is_monitor_file, manifest_name, stats_name, video_name,
};

static NEXT_RUN: AtomicU64 = AtomicU64::new(0);

/// Episodes captured when video is on: perfect cubes below 1000, then every
/// thousandth episode.
pub fn capped_cubic_video_schedule(episode: u64) -> bool {
    if episode < 1000 {
        let mut root = 0u64;
        while root * root * root < episode {
            root += 1;
        }
        root * root * root == episode
    } else {
        episode % 1000 == 0
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

fn directory_error(path: &Path, message: impl ToString) -> EnvError {
    EnvError::MonitorDirectory {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// FileMonitor
// ---------------------------------------------------------------------------

/// Monitor hook recording to the directory named by each request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMonitor;

impl Monitor for FileMonitor {
    fn start(&self, env: Box<dyn Environment>, options: &MonitorOptions) -> Handoff {
        match Run::prepare(env.id(), options) {
            Ok(run) => {
                info!(
                    directory = %options.directory.display(),
                    run = %run.id,
                    first_episode = run.first_episode,
                    "monitor started"
                );
                Ok(Box::new(MonitorEnv::new(env, run)))
            }
            Err(e) => Err(Rejected::new(env, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Files and counters of one monitor run.
#[derive(Debug)]
struct Run {
    directory: PathBuf,
    id: String,
    env_id: String,
    video: bool,
    first_episode: u64,
    stats: EpisodeStats,
    videos: Vec<VideoEntry>,
}

impl Run {
    /// Create the directory and clear or count earlier runs.
    fn prepare(env_id: &str, options: &MonitorOptions) -> Result<Self, EnvError> {
        let directory = &options.directory;
        fs::create_dir_all(directory).map_err(|e| directory_error(directory, e))?;

        let existing = fs::read_dir(directory)
            .map_err(|e| directory_error(directory, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| directory_error(directory, e))?
            .into_iter()
            .filter(|p| is_monitor_file(p))
            .collect::<Vec<_>>();

        let mut first_episode = 0;
        if !existing.is_empty() {
            if options.force {
                for path in &existing {
                    fs::remove_file(path).map_err(|e| directory_error(path, e))?;
                }
                debug!(removed = existing.len(), "cleared earlier monitor files");
            } else if options.resume {
                first_episode = count_recorded_episodes(&existing)?;
            } else {
                return Err(directory_error(
                    directory,
                    "already contains monitor files; pass force to clear them or resume to continue",
                ));
            }
        }

        Ok(Self {
            directory: directory.clone(),
            id: format!("{}.{}", std::process::id(), NEXT_RUN.fetch_add(1, Ordering::Relaxed)),
            env_id: env_id.to_owned(),
            video: options.video,
            first_episode,
            stats: EpisodeStats::default(),
            videos: Vec::new(),
        })
    }

    /// Global index of the episode in progress.
    fn episode_index(&self) -> u64 {
        self.first_episode + self.stats.len() as u64
    }

    fn write_json(&self, name: &str, value: &impl Serialize) -> Result<(), EnvError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
        fs::write(self.directory.join(name), bytes)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), EnvError> {
        self.write_json(&stats_name(&self.id), &self.stats)?;
        self.write_json(
            &manifest_name(&self.id),
            &Manifest {
                env_id: self.env_id.clone(),
                stats: stats_name(&self.id),
                first_episode: self.first_episode,
                videos: self.videos.clone(),
            },
        )
    }
}

fn count_recorded_episodes(files: &[PathBuf]) -> Result<u64, EnvError> {
    let mut total = 0;
    for path in files.iter().filter(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(".stats."))
    }) {
        let text = fs::read_to_string(path)?;
        let stats: EpisodeStats = serde_json::from_str(&text)
            .map_err(|e| directory_error(path, format!("unreadable stats file: {e}")))?;
        total += stats.len() as u64;
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Raw `uint8` frames of one episode.
#[derive(Debug, Default)]
struct Capture {
    shape: Vec<usize>,
    bytes: Vec<u8>,
    frames: u32,
}

impl Capture {
    /// Append an image observation. Anything else, or a frame whose shape
    /// differs from the first one, is skipped.
    fn push(&mut self, observation: &Value) {
        let Some(tensor) = observation.as_tensor() else {
            return;
        };
        let Some(bytes) = tensor.as_u8() else {
            return;
        };
        if tensor.shape().is_empty() {
            return;
        }
        if self.frames == 0 {
            self.shape = tensor.shape().to_vec();
        } else if self.shape != tensor.shape() {
            return;
        }
        self.bytes.extend_from_slice(bytes);
        self.frames += 1;
    }
}

// ---------------------------------------------------------------------------
// MonitorEnv
// ---------------------------------------------------------------------------

/// Environment wrapper that records episodes of its inner environment.
pub struct MonitorEnv {
    inner: Box<dyn Environment>,
    run: Run,
    episode: Episode,
    capture: Option<Capture>,
}

impl MonitorEnv {
    fn new(inner: Box<dyn Environment>, run: Run) -> Self {
        Self {
            inner,
            run,
            episode: Episode::default(),
            capture: None,
        }
    }

    /// Name of the manifest file this wrapper writes.
    pub fn manifest_name(&self) -> String {
        manifest_name(&self.run.id)
    }

    /// Episodes completed in this run.
    pub fn episodes_recorded(&self) -> usize {
        self.run.stats.len()
    }

    fn finish_episode(&mut self) -> Result<(), EnvError> {
        let index = self.run.episode_index();
        self.run
            .stats
            .push(unix_now(), self.episode.length(), self.episode.reward());

        if let Some(capture) = self.capture.take().filter(|c| c.frames > 0) {
            let path = video_name(&self.run.id, index);
            fs::write(self.run.directory.join(&path), &capture.bytes)?;
            self.run.videos.push(VideoEntry {
                episode: index,
                path,
                shape: capture.shape,
                frames: capture.frames,
            });
        }
        debug!(
            episode = index,
            length = self.episode.length(),
            reward = self.episode.reward(),
            "episode recorded"
        );
        self.run.flush()
    }
}

impl Environment for MonitorEnv {
    fn action_space(&self) -> &Space {
        self.inner.action_space()
    }

    fn observation_space(&self) -> &Space {
        self.inner.observation_space()
    }

    /// Resetting mid-episode records the unfinished episode first.
    fn reset(&mut self) -> Result<Value, EnvError> {
        if self.episode.is_running() && self.episode.length() > 0 {
            self.finish_episode()?;
        }
        let observation = self.inner.reset()?;
        if self.run.stats.initial_reset_timestamp.is_none() {
            self.run.stats.initial_reset_timestamp = Some(unix_now());
        }
        self.episode.begin();

        self.capture = (self.run.video && capped_cubic_video_schedule(self.run.episode_index()))
            .then(Capture::default);
        if let Some(capture) = &mut self.capture {
            capture.push(&observation);
        }
        Ok(observation)
    }

    fn step(&mut self, action: Value) -> Result<StepResult, EnvError> {
        let result = self.inner.step(action)?;
        let outcome = self.episode.record(result.reward, result.done);
        if outcome != StepOutcome::Ignored {
            if let Some(capture) = &mut self.capture {
                capture.push(&result.observation);
            }
        }
        if outcome.ends_episode() {
            self.finish_episode()?;
        }
        Ok(result)
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.inner.render()
    }

    /// Writes the run files, then closes the inner environment.
    fn close(&mut self) -> Result<(), EnvError> {
        let flushed = self.run.flush();
        let closed = self.inner.close();
        flushed.and(closed)
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
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gymsock_core::space::BoxSpace;
    use gymsock_core::value::Tensor;
    use gymsock_test_utils::{ScriptedEnv, noop_env};

    use super::*;

    fn options(directory: &Path) -> MonitorOptions {
        MonitorOptions {
            resume: false,
            force: false,
            video: false,
            directory: directory.to_path_buf(),
        }
    }

    fn monitor_files(directory: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(directory)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.starts_with("gymsock."))
            .collect();
        names.sort();
        names
    }

    fn read_stats(directory: &Path) -> EpisodeStats {
        let name = monitor_files(directory)
            .into_iter()
            .find(|n| n.contains(".stats."))
            .unwrap();
        serde_json::from_str(&fs::read_to_string(directory.join(name)).unwrap()).unwrap()
    }

    #[test]
    fn schedule_is_capped_cubic() {
        let captured: Vec<u64> = (0..1000).filter(|e| capped_cubic_video_schedule(*e)).collect();
        assert_eq!(captured, [0, 1, 8, 27, 64, 125, 216, 343, 512, 729]);
        assert!(capped_cubic_video_schedule(1000));
        assert!(!capped_cubic_video_schedule(1001));
        assert!(capped_cubic_video_schedule(5000));
    }

    #[test]
    fn records_episode_stats() {
        let dir = tempfile::tempdir().unwrap();
        let env = Box::new(noop_env().with_reward(0.5).done_after(3));
        let mut env = FileMonitor.start(env, &options(dir.path())).unwrap();

        env.reset().unwrap();
        for _ in 0..3 {
            env.step(Value::Discrete(1)).unwrap();
        }
        env.close().unwrap();

        let stats = read_stats(dir.path());
        assert_eq!(stats.episode_lengths, [3]);
        assert!((stats.episode_rewards[0] - 1.5).abs() < 1e-12);
        assert!(stats.initial_reset_timestamp.is_some());
    }

    #[test]
    fn existing_files_need_force_or_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = FileMonitor
            .start(Box::new(noop_env()), &options(dir.path()))
            .unwrap();
        env.close().unwrap();

        let rejected = FileMonitor
            .start(Box::new(noop_env()), &options(dir.path()))
            .unwrap_err();
        assert!(rejected.error.to_string().contains("already contains monitor files"));
        assert_eq!(rejected.env.id(), "no-op-env");

        let forced = MonitorOptions {
            force: true,
            ..options(dir.path())
        };
        let env = FileMonitor.start(Box::new(noop_env()), &forced).unwrap();
        drop(env);
        assert!(monitor_files(dir.path()).is_empty());
    }

    #[test]
    fn resume_continues_episode_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let video = MonitorOptions {
            video: true,
            ..options(dir.path())
        };
        let image_env = || {
            let obs = Value::Box(Tensor::uint8(vec![2, 2, 1], vec![1, 2, 3, 4]).unwrap());
            Box::new(
                ScriptedEnv::new(
                    Space::discrete(2),
                    Space::Box(BoxSpace::image(vec![2, 2, 1]).unwrap()),
                    obs,
                )
                .done_after(1),
            )
        };

        let mut env = FileMonitor.start(image_env(), &video).unwrap();
        for _ in 0..2 {
            env.reset().unwrap();
            env.step(Value::Discrete(0)).unwrap();
        }
        env.close().unwrap();
        // episodes 0 and 1 are both on the schedule
        let videos: Vec<_> = monitor_files(dir.path())
            .into_iter()
            .filter(|n| n.contains(".video."))
            .collect();
        assert_eq!(videos.len(), 2);

        let resumed = MonitorOptions {
            resume: true,
            ..video
        };
        let mut env = FileMonitor.start(image_env(), &resumed).unwrap();
        env.reset().unwrap();
        env.step(Value::Discrete(0)).unwrap();
        env.close().unwrap();
        // episode 2 is not a cube
        let videos = monitor_files(dir.path())
            .into_iter()
            .filter(|n| n.contains(".video."))
            .count();
        assert_eq!(videos, 2);

        let manifests: Vec<Manifest> = monitor_files(dir.path())
            .into_iter()
            .filter(|n| n.contains(".manifest."))
            .map(|n| serde_json::from_str(&fs::read_to_string(dir.path().join(n)).unwrap()).unwrap())
            .collect();
        assert_eq!(manifests.len(), 2);
        assert!(manifests.iter().any(|m| m.first_episode == 2));
    }

    #[test]
    fn captured_video_holds_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Value::Box(Tensor::uint8(vec![1, 2, 3], vec![9; 6]).unwrap());
        let env = Box::new(
            ScriptedEnv::new(
                Space::discrete(2),
                Space::Box(BoxSpace::image(vec![1, 2, 3]).unwrap()),
                obs,
            )
            .done_after(2),
        );
        let video = MonitorOptions {
            video: true,
            ..options(dir.path())
        };
        let mut env = FileMonitor.start(env, &video).unwrap();
        env.reset().unwrap();
        env.step(Value::Discrete(0)).unwrap();
        env.step(Value::Discrete(0)).unwrap();

        let raw = monitor_files(dir.path())
            .into_iter()
            .find(|n| n.contains(".video."))
            .unwrap();
        // reset frame plus two steps
        assert_eq!(fs::read(dir.path().join(raw)).unwrap().len(), 3 * 6);
    }

    #[test]
    fn unusable_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, b"x").unwrap();
        let rejected = FileMonitor
            .start(Box::new(noop_env()), &options(&file))
            .unwrap_err();
        assert!(matches!(rejected.error, EnvError::MonitorDirectory { .. }));
    }
}
