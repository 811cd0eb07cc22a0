//! Hook stubs that record what a session asked of them.

use std::sync::{Arc, Mutex, PoisonError};

use gymsock_core::error::EnvError;
use gymsock_core::traits::{
    Environment, Handoff, Hooks, Monitor, MonitorOptions, Rejected, UploadRequest, Uploader,
};

/// Monitor that installs the environment unchanged and remembers the options.
#[derive(Debug, Clone, Default)]
pub struct AcceptingMonitor {
    started: Arc<Mutex<Vec<MonitorOptions>>>,
}

impl AcceptingMonitor {
    pub fn started(&self) -> Vec<MonitorOptions> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Monitor for AcceptingMonitor {
    fn start(&self, env: Box<dyn Environment>, options: &MonitorOptions) -> Handoff {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.clone());
        Ok(env)
    }
}

/// Monitor that always refuses, handing the environment back.
#[derive(Debug, Clone)]
pub struct RejectingMonitor {
    message: String,
}

impl RejectingMonitor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Monitor for RejectingMonitor {
    fn start(&self, env: Box<dyn Environment>, options: &MonitorOptions) -> Handoff {
        Err(Rejected::new(
            env,
            EnvError::MonitorDirectory {
                path: options.directory.clone(),
                message: self.message.clone(),
            },
        ))
    }
}

/// Uploader that accepts everything with a non-empty API key.
#[derive(Debug, Clone, Default)]
pub struct RecordingUploader {
    requests: Arc<Mutex<Vec<UploadRequest>>>,
}

impl RecordingUploader {
    pub fn requests(&self) -> Vec<UploadRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Uploader for RecordingUploader {
    fn upload(&self, request: &UploadRequest) -> Result<(), EnvError> {
        if request.api_key.is_empty() {
            return Err(EnvError::UploadFailed("missing API key".into()));
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}

/// Accepting monitor, with uploads and extensions disabled.
pub fn test_hooks() -> Hooks {
    Hooks::new(AcceptingMonitor::default())
}
