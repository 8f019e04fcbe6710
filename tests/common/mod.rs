#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use scopeward::db::Database;
use scopeward::error::{StoreError, StoreResult};
use scopeward::models::*;
use scopeward::observer::{ScopeChange, ScopeObserver};
use scopeward::store::SessionStore;

/// Observer that remembers every notification.
#[derive(Default)]
pub struct RecordingObserver {
    pub changes: Mutex<Vec<ScopeChange>>,
    pub exclusions: Mutex<Vec<(RuleCategory, Vec<String>)>>,
}

impl RecordingObserver {
    pub fn change_count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    pub fn last_change(&self) -> Option<ScopeChange> {
        self.changes.lock().unwrap().last().cloned()
    }
}

impl ScopeObserver for RecordingObserver {
    fn scope_changed(&self, change: &ScopeChange) {
        self.changes.lock().unwrap().push(change.clone());
    }

    fn exclusions_changed(&self, category: RuleCategory, patterns: &[String]) {
        self.exclusions
            .lock()
            .unwrap()
            .push((category, patterns.to_vec()));
    }
}

struct Pause {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// Delegates to a [`Database`], counts rule writes and can be told to fail,
/// panic or stall.
pub struct CountingStore {
    pub inner: Database,
    pub rule_writes: AtomicUsize,
    pub fail_rule_writes: AtomicBool,
    pub fail_session_updates: AtomicBool,
    pub panic_on_meta: AtomicBool,
    pause: Mutex<Option<Pause>>,
}

impl CountingStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            rule_writes: AtomicUsize::new(0),
            fail_rule_writes: AtomicBool::new(false),
            fail_session_updates: AtomicBool::new(false),
            panic_on_meta: AtomicBool::new(false),
            pause: Mutex::new(None),
        }
    }

    pub fn rule_writes(&self) -> usize {
        self.rule_writes.load(Ordering::SeqCst)
    }

    /// Stall the next `read_session_meta` or `write_tree` call.
    ///
    /// The returned receiver fires once the call is stalled; sending on the
    /// returned sender lets it continue.
    pub fn pause_next(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.pause.lock().unwrap() = Some(Pause {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    fn wait_if_paused(&self) {
        let pause = self.pause.lock().unwrap().take();
        if let Some(pause) = pause {
            let _ = pause.entered.send(());
            let _ = pause.release.recv();
        }
    }
}

impl SessionStore for CountingStore {
    fn read_session_meta(&self, location: &str) -> StoreResult<SessionMeta> {
        if self.panic_on_meta.load(Ordering::SeqCst) {
            panic!("metadata reader exploded");
        }
        self.wait_if_paused();
        self.inner.read_session_meta(location)
    }

    fn open(&self, location: &str) -> StoreResult<()> {
        self.inner.open(location)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn rebind(&self, location: &str) -> StoreResult<()> {
        self.inner.rebind(location)
    }

    fn commit_rebind(&self) -> StoreResult<()> {
        self.inner.commit_rebind()
    }

    fn rollback_rebind(&self) -> StoreResult<()> {
        self.inner.rollback_rebind()
    }

    fn move_to(&self, location: &str) -> StoreResult<()> {
        self.inner.move_to(location)
    }

    fn copy_to(&self, from: &str, to: &str) -> StoreResult<()> {
        self.inner.copy_to(from, to)
    }

    fn read_rules(&self, category: RuleCategory) -> StoreResult<Vec<String>> {
        self.inner.read_rules(category)
    }

    fn write_rules(&self, category: RuleCategory, patterns: &[String]) -> StoreResult<()> {
        if self.fail_rule_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("rule writes disabled".to_string()));
        }
        self.rule_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_rules(category, patterns)
    }

    fn history_ids(&self, session_id: i64, kind: RecordKind) -> StoreResult<Vec<i64>> {
        self.inner.history_ids(session_id, kind)
    }

    fn resolve_record(&self, id: i64) -> StoreResult<HistoricalRecord> {
        self.inner.resolve_record(id)
    }

    fn append_record(
        &self,
        session_id: i64,
        kind: RecordKind,
        method: &str,
        uri: &str,
    ) -> StoreResult<HistoricalRecord> {
        self.inner.append_record(session_id, kind, method, uri)
    }

    fn delete_history(&self, session_id: i64) -> StoreResult<()> {
        self.inner.delete_history(session_id)
    }

    fn write_tree(&self, session_id: i64, nodes: &[NodeSnapshot]) -> StoreResult<()> {
        self.wait_if_paused();
        self.inner.write_tree(session_id, nodes)
    }

    fn update_session(&self, session_id: i64, name: &str, description: &str) -> StoreResult<()> {
        if self.fail_session_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("session updates disabled".to_string()));
        }
        self.inner.update_session(session_id, name, description)
    }
}

pub fn memory_store() -> Arc<CountingStore> {
    Arc::new(CountingStore::new(
        Database::open_memory().expect("Failed to create in-memory database"),
    ))
}
