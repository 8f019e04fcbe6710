//! The storage contract a session depends on.
//!
//! The session never talks to a database directly. Whatever persists rule
//! rows, traffic history and session metadata implements [`SessionStore`];
//! [`Database`](crate::db::Database) is the SQLite implementation shipped
//! with this crate.

use crate::error::StoreResult;
use crate::models::{HistoricalRecord, NodeSnapshot, RecordKind, RuleCategory, SessionMeta};

pub trait SessionStore: Send + Sync {
    /// Read identity and description from the store at `location` without
    /// binding to it.
    fn read_session_meta(&self, location: &str) -> StoreResult<SessionMeta>;

    /// Bind to the store at `location`. The existing binding is closed once
    /// the new one is established; on failure it stays in place.
    fn open(&self, location: &str) -> StoreResult<()>;

    fn close(&self) -> StoreResult<()>;

    /// Bind to the store at `location`, setting the current binding aside
    /// until [`commit_rebind`](Self::commit_rebind) closes it or
    /// [`rollback_rebind`](Self::rollback_rebind) returns to it.
    fn rebind(&self, location: &str) -> StoreResult<()>;

    fn commit_rebind(&self) -> StoreResult<()>;

    /// Drop the binding made by `rebind` and restore the one it replaced.
    fn rollback_rebind(&self) -> StoreResult<()>;

    /// Relocate the bound store to `location` and keep working against it.
    /// On failure the store remains bound where it was.
    fn move_to(&self, location: &str) -> StoreResult<()>;

    /// Duplicate the store at `from` into `to`. The binding is unchanged.
    fn copy_to(&self, from: &str, to: &str) -> StoreResult<()>;

    fn read_rules(&self, category: RuleCategory) -> StoreResult<Vec<String>>;

    fn write_rules(&self, category: RuleCategory, patterns: &[String]) -> StoreResult<()>;

    /// Ids of a session's records of one kind, oldest first.
    fn history_ids(&self, session_id: i64, kind: RecordKind) -> StoreResult<Vec<i64>>;

    fn resolve_record(&self, id: i64) -> StoreResult<HistoricalRecord>;

    fn append_record(
        &self,
        session_id: i64,
        kind: RecordKind,
        method: &str,
        uri: &str,
    ) -> StoreResult<HistoricalRecord>;

    fn delete_history(&self, session_id: i64) -> StoreResult<()>;

    /// Replace the persisted tree snapshot for a session.
    fn write_tree(&self, session_id: i64, nodes: &[NodeSnapshot]) -> StoreResult<()>;

    fn update_session(&self, session_id: i64, name: &str, description: &str) -> StoreResult<()>;
}
