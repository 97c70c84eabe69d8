// src/update/task.rs

//! Owned handles for background updates

use super::UpdateResult;
use crate::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

/// A running update
///
/// The task never outlives its handle: dropping an `UpdateTask` raises the
/// cancel flag and aborts the task. An update aborted before its commit
/// leaves the store untouched.
#[derive(Debug)]
pub struct UpdateTask {
    repo_id: i64,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<UpdateResult>>,
}

impl UpdateTask {
    pub(crate) fn new(repo_id: i64, cancel: Arc<AtomicBool>, handle: JoinHandle<UpdateResult>) -> Self {
        Self {
            repo_id,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn repo_id(&self) -> i64 {
        self.repo_id
    }

    /// Ask the update to stop at its next chunk or record
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the outcome
    pub async fn join(mut self) -> UpdateResult {
        let Some(handle) = self.handle.take() else {
            return UpdateResult::Error(Error::Cancelled);
        };
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => UpdateResult::Error(Error::Cancelled),
            Err(e) => UpdateResult::Error(Error::InitError(format!("Update task failed: {e}"))),
        }
    }
}

impl Drop for UpdateTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!("Cancelling update of repository {}", self.repo_id);
                self.cancel.store(true, Ordering::Relaxed);
                handle.abort();
            }
        }
    }
}
