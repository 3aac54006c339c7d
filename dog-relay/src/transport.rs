//! Collaborator contracts for retrieval, delivery and notification.
//!
//! The relay core never talks to a media source or a chat transport
//! directly. It drives these traits, so a deployment plugs in its own
//! downloader and messaging client.

use std::path::PathBuf;
use async_trait::async_trait;

use crate::{Destination, JobError};

/// Local result of a successful retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the retrieved file lives
    pub path: PathBuf,

    /// Size in bytes, if the fetcher knows it
    pub size: Option<u64>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), size: None }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Receives percentage updates while a fetch runs
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_progress(&self, percent: u8);
}

/// Observer that drops every update
pub struct NoProgress;

#[async_trait]
impl ProgressObserver for NoProgress {
    async fn on_progress(&self, _percent: u8) {}
}

/// Retrieves a remote source into a local artifact
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        source: &str,
        format: &str,
        progress: &dyn ProgressObserver,
    ) -> Result<Artifact, JobError>;
}

/// Relays a local artifact to a requester
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(
        &self,
        destination: Destination,
        artifact: &Artifact,
        caption: &str,
    ) -> Result<(), JobError>;
}

/// Sends short text notices
///
/// Callers treat notification as best-effort: failures are logged and
/// swallowed, never propagated into job outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: Destination, text: &str) -> Result<(), JobError>;
}

/// Send a notice, logging instead of propagating failures
pub(crate) async fn notify_quietly(notifier: &dyn Notifier, destination: Destination, text: &str) {
    if let Err(e) = notifier.notify(destination, text).await {
        tracing::warn!(chat_id = destination.chat_id, "Notification failed: {}", e);
    }
}
