//! Open, save and discard.
//!
//! The synchronous cores (`open`, `save`) block their caller on storage I/O.
//! The `_async` variants run the same cores on Tokio's blocking pool, away
//! from interactive async work, and hand the outcome to a callback. Neither
//! can be cancelled once started. A panic inside either is reported as
//! [`SessionError::Panicked`], so the callback still runs exactly once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio::task::JoinHandle;

use super::{Rules, Session};
use crate::error::{SessionError, SessionResult};
use crate::models::*;
use crate::scope::{RuleSet, ScopePolicy};
use crate::tree::TreeNode;

/// Everything read from a store during open, adopted only once complete.
struct Loaded {
    meta: SessionMeta,
    rules: Rules,
    root: TreeNode,
}

impl Session {
    /// Open the session stored at `location` in the background.
    ///
    /// `callback` receives the location and the error, if any, exactly once.
    /// Must be called from within a Tokio runtime.
    pub fn open_async<F>(&self, location: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(&str, Option<SessionError>) + Send + 'static,
    {
        let session = self.clone();
        let location = location.into();
        tokio::task::spawn_blocking(move || {
            let result = guard_panics(|| session.open(&location));
            callback(&location, result.err());
        })
    }

    /// Bind this session to the store at `location` and rebuild rules and
    /// tree from it.
    ///
    /// Nothing read from the store is adopted unless the whole open
    /// succeeds, and on failure the store returns to its previous binding.
    /// Individual history records that cannot be resolved are skipped.
    pub fn open(&self, location: &str) -> SessionResult<()> {
        let previous = self.begin_transition(SessionState::Opening)?;
        tracing::info!("Opening session at {}", location);

        match guard_panics(|| self.load(location)) {
            Ok(loaded) => {
                let tree = self.shared.tree.clone();
                let root = loaded.root;
                if let Err(e) = self.shared.owner.run(move || tree.replace_root(root)) {
                    self.restore_binding();
                    self.end_transition(previous, None);
                    return Err(e);
                }
                *self.shared.rules.write().expect("rules lock poisoned") = loaded.rules;

                if let Err(e) = self.shared.store.commit_rebind() {
                    tracing::warn!("Failed to close previous store: {}", e);
                }

                let mut status = self.status();
                status.meta = loaded.meta;
                status.location = location.to_string();
                status.state = SessionState::Open;
                tracing::info!("Session {} opened from {}", status.meta.id, location);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to open session at {}: {}", location, e);
                self.end_transition(previous, None);
                Err(e)
            }
        }
    }

    /// Read everything from `location`. On success the store is left bound
    /// there with the previous binding set aside; on failure it is restored.
    fn load(&self, location: &str) -> SessionResult<Loaded> {
        let store = &self.shared.store;

        let meta = store.read_session_meta(location)?;
        store.rebind(location)?;

        let loaded = guard_panics(|| self.load_bound(meta));
        if loaded.is_err() {
            self.restore_binding();
        }
        loaded
    }

    fn restore_binding(&self) {
        if let Err(e) = self.shared.store.rollback_rebind() {
            tracing::warn!("Failed to restore previous store binding: {}", e);
        }
    }

    fn load_bound(&self, meta: SessionMeta) -> SessionResult<Loaded> {
        let store = &self.shared.store;

        let mut rules = Rules::empty();
        for category in RuleCategory::ALL {
            let patterns = store.read_rules(category)?;
            rules
                .sets
                .insert(category, Arc::new(RuleSet::compile(category, &patterns)?));
        }
        let policy = rules.policy();

        let mut root = TreeNode::root();
        let manual = self.replay(meta.id, RecordKind::Manual, Some(&policy), &mut root)?;
        let crawled = self.replay(meta.id, RecordKind::Crawled, None, &mut root)?;

        // Crawled nodes and intermediate levels still need their flags.
        let mut changed = Vec::new();
        root.refresh(&policy, &mut changed);

        tracing::debug!(
            "Replayed {} manual and {} crawled records for session {}",
            manual,
            crawled,
            meta.id
        );
        Ok(Loaded { meta, rules, root })
    }

    /// Insert every record of `kind` into `root`. Returns how many made it.
    fn replay(
        &self,
        session_id: i64,
        kind: RecordKind,
        policy: Option<&ScopePolicy>,
        root: &mut TreeNode,
    ) -> SessionResult<usize> {
        let ids = self.shared.store.history_ids(session_id, kind)?;
        let yield_every = self.shared.config.replay_yield_every.max(1);

        let mut replayed = 0;
        for (i, id) in ids.iter().enumerate() {
            match self.resolve_path(*id) {
                Ok(path) => {
                    root.insert_path(&path, Some(*id), policy);
                    replayed += 1;
                }
                Err(e) => tracing::warn!("Skipping {} record: {}", kind.as_str(), e),
            }
            if (i + 1) % yield_every == 0 {
                thread::yield_now();
            }
        }
        Ok(replayed)
    }

    /// Save in the background. `callback` receives the error, if any.
    /// Must be called from within a Tokio runtime.
    pub fn save_async<F>(&self, location: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<SessionError>) + Send + 'static,
    {
        let session = self.clone();
        let location = location.into();
        tokio::task::spawn_blocking(move || {
            let result = guard_panics(|| session.save(&location));
            if let Err(e) = &result {
                tracing::warn!("Failed to save session to {}: {}", location, e);
            }
            callback(result.err());
        })
    }

    /// Write the tree and metadata, then relocate the store to `location`.
    ///
    /// An unsaved session's store is moved there. A saved session is copied
    /// when `location` differs from its current one, and continues against
    /// the copy. On failure the session and its store keep their previous
    /// location.
    pub fn save(&self, location: &str) -> SessionResult<()> {
        let previous = self.begin_transition(SessionState::Saving)?;

        match guard_panics(|| self.persist(location, previous)) {
            Ok(()) => {
                self.end_transition(SessionState::Open, Some(location));
                tracing::info!("Session {} saved to {}", self.id(), location);
                Ok(())
            }
            Err(e) => {
                self.end_transition(previous, None);
                Err(e)
            }
        }
    }

    fn persist(&self, location: &str, previous: SessionState) -> SessionResult<()> {
        let store = &self.shared.store;
        let (meta, current) = {
            let status = self.status();
            (status.meta.clone(), status.location.clone())
        };

        // Taken on the owner so no refresh can interleave with the snapshot.
        let tree = self.shared.tree.clone();
        let nodes = self.shared.owner.run(move || tree.snapshot())?;
        store.write_tree(meta.id, &nodes)?;
        store.update_session(meta.id, &meta.name, &meta.description)?;

        // Relocation must stay the last fallible step.
        if previous == SessionState::New || current.is_empty() {
            store.move_to(location)?;
        } else if current != location {
            store.copy_to(&current, location)?;
            store.open(location)?;
        }
        Ok(())
    }

    /// Purge this session's history from the store.
    ///
    /// Best effort: runs during teardown, so failures are logged only.
    pub fn discard(&self) {
        let id = {
            let mut status = self.status();
            status.state = SessionState::Discarded;
            status.meta.id
        };

        match self.shared.store.delete_history(id) {
            Ok(()) => tracing::info!("Session {} discarded", id),
            Err(e) => tracing::warn!("Failed to purge history for session {}: {}", id, e),
        }
    }

    /// Enter a transient state. Returns the state to fall back to.
    fn begin_transition(&self, to: SessionState) -> SessionResult<SessionState> {
        let mut status = self.mutable_status()?;
        let previous = status.state;
        status.state = to;
        Ok(previous)
    }

    fn end_transition(&self, state: SessionState, location: Option<&str>) {
        let mut status = self.status();
        status.state = state;
        if let Some(location) = location {
            status.location = location.to_string();
        }
    }
}

/// Run `f`, reporting a panic as [`SessionError::Panicked`].
fn guard_panics<T>(f: impl FnOnce() -> SessionResult<T>) -> SessionResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(SessionError::Panicked(message))
    })
}
