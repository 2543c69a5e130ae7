//! Detached background writes.
//!
//! The response path starts these but never awaits them; failures are
//! logged, never propagated. Handles are tracked so tests can `flush()`
//! and observe the eventual state deterministically.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::DatabaseError;

/// Spawns fire-and-forget writes and keeps their handles.
#[derive(Clone, Default)]
pub struct BackgroundWriter {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a detached write. The label shows up in the failure log.
    pub fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = Result<(), DatabaseError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!(task = label, error = %e, "Background write failed");
            }
        });
        self.handles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(handle);
    }

    /// Wait for all spawned writes to finish. Test-facing; the response
    /// path never calls this.
    pub async fn flush(&self) {
        loop {
            let handle = {
                let mut handles =
                    self.handles.lock().unwrap_or_else(|p| p.into_inner());
                handles.pop()
            };
            match handle {
                Some(h) => {
                    let _ = h.await;
                }
                None => break,
            }
        }
    }
}
