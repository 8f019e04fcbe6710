//! The single thread allowed to mutate a session's scope tree.

use std::sync::mpsc;
use std::thread::{self, ThreadId};

use crate::error::{SessionError, SessionResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs tree jobs one at a time, in submission order, on a dedicated thread.
///
/// The thread exits once the owner is dropped and its queue has drained.
pub(crate) struct TreeOwner {
    tx: mpsc::Sender<Job>,
    thread_id: ThreadId,
}

impl TreeOwner {
    pub(crate) fn spawn(session_id: i64) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(format!("scope-tree-{}", session_id))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                tracing::trace!("Scope tree owner for session {} stopped", session_id);
            })
            // Same failure mode as `thread::spawn`.
            .expect("failed to spawn scope tree owner thread");

        Self {
            tx,
            thread_id: handle.thread().id(),
        }
    }

    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `job` behind everything already submitted.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> SessionResult<()> {
        self.tx
            .send(Box::new(job))
            .map_err(|_| SessionError::OwnerGone)
    }

    /// Run `job` on the owner and wait for its result.
    ///
    /// Called from the owner thread itself, the job runs inline instead of
    /// being queued behind the caller.
    pub(crate) fn run<T, F>(&self, job: F) -> SessionResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = tx.send(job());
        })?;
        rx.recv().map_err(|_| SessionError::OwnerGone)
    }
}
