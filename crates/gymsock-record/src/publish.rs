//! Upload hook that publishes monitor results into a local directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use gymsock_core::error::EnvError;
use gymsock_core::traits::{UploadRequest, Uploader};
use tracing::info;

use crate::types::{is_manifest, is_monitor_file};

const DEFAULT_ALGORITHM: &str = "default";

/// Copies the manifests and statistics of a monitor directory to
/// `<root>/<algorithm id or "default">/run-NNNN/`.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publish `request.directory` and return the directory it was copied to.
    pub fn publish(&self, request: &UploadRequest) -> Result<PathBuf, EnvError> {
        if request.api_key.is_empty() {
            return Err(EnvError::UploadFailed("missing API key".into()));
        }
        let source = &request.directory;
        let files = fs::read_dir(source)
            .and_then(|entries| entries.map(|e| e.map(|e| e.path())).collect::<Result<Vec<_>, _>>())
            .map_err(|e| {
                EnvError::UploadFailed(format!("cannot read {}: {e}", source.display()))
            })?
            .into_iter()
            .filter(|p| is_monitor_file(p) && !is_video(p))
            .collect::<Vec<_>>();
        if !files.iter().any(|p| is_manifest(p)) {
            return Err(EnvError::UploadFailed(format!(
                "no monitor results in {}",
                source.display()
            )));
        }

        let algorithm = request
            .algorithm_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_ALGORITHM);
        if algorithm.contains(['/', '\\']) || algorithm == ".." {
            return Err(EnvError::UploadFailed(format!(
                "invalid algorithm id: {algorithm}"
            )));
        }
        let parent = self.root.join(algorithm);
        fs::create_dir_all(&parent)?;
        let destination = next_run_dir(&parent)?;

        for file in &files {
            if let Some(name) = file.file_name() {
                fs::copy(file, destination.join(name))?;
            }
        }
        info!(
            source = %source.display(),
            destination = %destination.display(),
            files = files.len(),
            "monitor results published"
        );
        Ok(destination)
    }
}

impl Uploader for DirectoryPublisher {
    fn upload(&self, request: &UploadRequest) -> Result<(), EnvError> {
        self.publish(request).map(|_| ())
    }
}

fn is_video(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "raw")
}

/// Create the first free `run-NNNN` directory under `parent`.
fn next_run_dir(parent: &Path) -> Result<PathBuf, EnvError> {
    for n in 0u32..10_000 {
        let candidate = parent.join(format!("run-{n:04}"));
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(EnvError::UploadFailed(format!(
        "no free run directory under {}",
        parent.display()
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{manifest_name, stats_name, video_name};

    fn monitor_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(manifest_name("1.0")), b"{}").unwrap();
        fs::write(dir.path().join(stats_name("1.0")), b"{}").unwrap();
        fs::write(dir.path().join(video_name("1.0", 0)), [0u8; 12]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();
        dir
    }

    fn request(directory: &Path, algorithm_id: Option<&str>) -> UploadRequest {
        UploadRequest {
            directory: directory.to_path_buf(),
            api_key: "key".into(),
            algorithm_id: algorithm_id.map(str::to_owned),
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn copies_manifest_and_stats() {
        let source = monitor_dir();
        let root = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(root.path());

        let dest = publisher.publish(&request(source.path(), Some("ppo"))).unwrap();
        assert_eq!(dest, root.path().join("ppo").join("run-0000"));
        assert_eq!(names(&dest), [manifest_name("1.0"), stats_name("1.0")]);
    }

    #[test]
    fn runs_are_numbered_and_default_algorithm_used() {
        let source = monitor_dir();
        let root = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(root.path());

        publisher.upload(&request(source.path(), None)).unwrap();
        publisher.upload(&request(source.path(), Some(""))).unwrap();
        assert_eq!(names(&root.path().join("default")), ["run-0000", "run-0001"]);
    }

    #[test]
    fn requires_api_key() {
        let source = monitor_dir();
        let root = tempfile::tempdir().unwrap();
        let mut req = request(source.path(), None);
        req.api_key.clear();
        let err = DirectoryPublisher::new(root.path()).upload(&req).unwrap_err();
        assert_eq!(err.to_string(), "upload failed: missing API key");
    }

    #[test]
    fn requires_monitor_results() {
        let empty = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let err = DirectoryPublisher::new(root.path())
            .upload(&request(empty.path(), None))
            .unwrap_err();
        assert!(err.to_string().contains("no monitor results"));

        let missing = empty.path().join("absent");
        let err = DirectoryPublisher::new(root.path())
            .upload(&request(&missing, None))
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn rejects_path_like_algorithm_ids() {
        let source = monitor_dir();
        let root = tempfile::tempdir().unwrap();
        let err = DirectoryPublisher::new(root.path())
            .upload(&request(source.path(), Some("../escape")))
            .unwrap_err();
        assert!(err.to_string().contains("invalid algorithm id"));
    }
}
