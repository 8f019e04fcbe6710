mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::store::SessionStore;

/// SQLite-backed [`SessionStore`].
///
/// A `Database` is bound to at most one SQLite file (or an in-memory
/// database) at a time. Unsaved sessions run against an in-memory binding
/// which `move_to` later writes out to disk.
pub struct Database {
    binding: Arc<Mutex<Option<Binding>>>,
    /// Binding replaced by `rebind`, kept until commit or rollback.
    parked: Arc<Mutex<Option<Parked>>>,
}

struct Parked(Option<Binding>);

struct Binding {
    conn: Connection,
    /// `None` for an in-memory database.
    path: Option<PathBuf>,
}

impl Database {
    pub fn open_path(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let conn = connect(&path)?;
        Ok(Self::bound(Binding {
            conn,
            path: Some(path),
        }))
    }

    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrate_conn(&conn)?;
        Ok(Self::bound(Binding { conn, path: None }))
    }

    fn bound(binding: Binding) -> Self {
        Self {
            binding: Arc::new(Mutex::new(Some(binding))),
            parked: Arc::new(Mutex::new(None)),
        }
    }

    pub fn migrate(&self) -> StoreResult<()> {
        self.with_conn(migrate_conn)
    }

    /// Path of the bound file, `None` when in memory or unbound.
    pub fn location(&self) -> Option<PathBuf> {
        let binding = self.binding.lock().expect("database lock poisoned");
        binding.as_ref().and_then(|b| b.path.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.lock().expect("database lock poisoned").is_some()
    }

    /// Metadata row of the bound store, if one has been written.
    pub fn current_meta(&self) -> StoreResult<Option<SessionMeta>> {
        self.with_conn(read_meta)
    }

    /// Tree snapshot last written for `session_id`, in stored order.
    pub fn read_tree(&self, session_id: i64) -> StoreResult<Vec<NodeSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT hierarchic_name, included, excluded, history_id
                 FROM site_node WHERE session_id = ? ORDER BY position",
            )?;
            let nodes = stmt
                .query_map([session_id], |row| {
                    Ok(NodeSnapshot {
                        hierarchic_name: row.get(0)?,
                        included_in_scope: row.get::<_, i32>(1)? != 0,
                        excluded_from_scope: row.get::<_, i32>(2)? != 0,
                        history_id: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(nodes)
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let binding = self.binding.lock().expect("database lock poisoned");
        match binding.as_ref() {
            Some(b) => f(&b.conn),
            None => Err(StoreError::NotBound),
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            parked: self.parked.clone(),
        }
    }
}

impl SessionStore for Database {
    fn read_session_meta(&self, location: &str) -> StoreResult<SessionMeta> {
        let path = Path::new(location);
        if !path.is_file() {
            return Err(StoreError::MissingLocation(location.to_string()));
        }

        let conn = Connection::open_with_flags(path, existing_file_flags())?;
        read_meta(&conn)?.ok_or_else(|| {
            StoreError::Corrupt(format!("{} has no session metadata", location))
        })
    }

    fn open(&self, location: &str) -> StoreResult<()> {
        let path = PathBuf::from(location);
        let conn = connect(&path)?;

        let mut binding = self.binding.lock().expect("database lock poisoned");
        *binding = Some(Binding {
            conn,
            path: Some(path),
        });
        tracing::debug!("Store bound to {}", location);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut binding = self.binding.lock().expect("database lock poisoned");
        if let Some(old) = binding.take() {
            if let Some(path) = old.path {
                tracing::debug!("Store at {} closed", path.display());
            }
        }
        Ok(())
    }

    fn rebind(&self, location: &str) -> StoreResult<()> {
        let path = PathBuf::from(location);
        let conn = connect(&path)?;

        let mut binding = self.binding.lock().expect("database lock poisoned");
        let previous = binding.replace(Binding {
            conn,
            path: Some(path),
        });
        *self.parked.lock().expect("database lock poisoned") = Some(Parked(previous));
        tracing::debug!("Store rebound to {}", location);
        Ok(())
    }

    fn commit_rebind(&self) -> StoreResult<()> {
        let parked = self.parked.lock().expect("database lock poisoned").take();
        if let Some(Parked(Some(Binding { path: Some(path), .. }))) = parked {
            tracing::debug!("Store at {} closed", path.display());
        }
        Ok(())
    }

    fn rollback_rebind(&self) -> StoreResult<()> {
        let mut binding = self.binding.lock().expect("database lock poisoned");
        if let Some(Parked(previous)) = self.parked.lock().expect("database lock poisoned").take() {
            *binding = previous;
            tracing::debug!("Store binding restored");
        }
        Ok(())
    }

    fn move_to(&self, location: &str) -> StoreResult<()> {
        let mut binding = self.binding.lock().expect("database lock poisoned");
        let current = binding.as_ref().ok_or(StoreError::NotBound)?;

        let target = PathBuf::from(location);
        if current.path.as_deref() == Some(target.as_path()) {
            return Ok(());
        }

        vacuum_into(&current.conn, &target)?;
        let conn = connect(&target)?;

        let old = binding.replace(Binding {
            conn,
            path: Some(target),
        });
        if let Some(Binding {
            conn: old_conn,
            path: Some(old_path),
        }) = old
        {
            drop(old_conn);
            // The store already lives at the new location.
            if let Err(e) = remove_database_files(&old_path) {
                tracing::warn!("Failed to remove {}: {}", old_path.display(), e);
            }
        }
        Ok(())
    }

    fn copy_to(&self, from: &str, to: &str) -> StoreResult<()> {
        if from == to {
            return Ok(());
        }
        let target = Path::new(to);

        let binding = self.binding.lock().expect("database lock poisoned");
        match binding.as_ref() {
            Some(b) if b.path.as_deref() == Some(Path::new(from)) => vacuum_into(&b.conn, target),
            _ => {
                let source = Path::new(from);
                if !source.is_file() {
                    return Err(StoreError::MissingLocation(from.to_string()));
                }
                let conn = Connection::open_with_flags(source, existing_file_flags())?;
                vacuum_into(&conn, target)
            }
        }
    }

    fn read_rules(&self, category: RuleCategory) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT url FROM session_url WHERE url_type = ? ORDER BY url_id")?;
            let urls = stmt
                .query_map([category.code()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(urls)
        })
    }

    fn write_rules(&self, category: RuleCategory, patterns: &[String]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM session_url WHERE url_type = ?",
                [category.code()],
            )?;
            for pattern in patterns {
                tx.execute(
                    "INSERT INTO session_url (url_type, url) VALUES (?, ?)",
                    (category.code(), pattern),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn history_ids(&self, session_id: i64, kind: RecordKind) -> StoreResult<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT history_id FROM history
                 WHERE session_id = ? AND history_type = ? ORDER BY history_id",
            )?;
            let ids = stmt
                .query_map((session_id, kind.code()), |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    fn resolve_record(&self, id: i64) -> StoreResult<HistoricalRecord> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT history_id, session_id, history_type, method, uri, created_at
                     FROM history WHERE history_id = ?",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, session_id, type_code, method, uri, created_at)) = row else {
                return Err(StoreError::RecordNotFound(id));
            };
            let kind = RecordKind::from_code(type_code).ok_or_else(|| {
                StoreError::Corrupt(format!("record {} has unknown type {}", id, type_code))
            })?;

            Ok(HistoricalRecord {
                id,
                session_id,
                kind,
                method,
                uri,
                created_at: parse_datetime(created_at),
            })
        })
    }

    fn append_record(
        &self,
        session_id: i64,
        kind: RecordKind,
        method: &str,
        uri: &str,
    ) -> StoreResult<HistoricalRecord> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO history (session_id, history_type, method, uri, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                (session_id, kind.code(), method, uri, now.to_rfc3339()),
            )?;

            Ok(HistoricalRecord {
                id: conn.last_insert_rowid(),
                session_id,
                kind,
                method: method.to_string(),
                uri: uri.to_string(),
                created_at: now,
            })
        })
    }

    fn delete_history(&self, session_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM history WHERE session_id = ?", [session_id])?;
            tracing::debug!("Deleted {} history records for session {}", rows, session_id);
            Ok(())
        })
    }

    fn write_tree(&self, session_id: i64, nodes: &[NodeSnapshot]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM site_node WHERE session_id = ?", [session_id])?;
            for (position, node) in nodes.iter().enumerate() {
                tx.execute(
                    "INSERT INTO site_node (session_id, position, hierarchic_name, included, excluded, history_id)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    (
                        session_id,
                        position as i64,
                        &node.hierarchic_name,
                        if node.included_in_scope { 1 } else { 0 },
                        if node.excluded_from_scope { 1 } else { 0 },
                        node.history_id,
                    ),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn update_session(&self, session_id: i64, name: &str, description: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session (session_id, name, description, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(session_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    updated_at = excluded.updated_at",
                (session_id, name, description, Utc::now().to_rfc3339()),
            )?;
            Ok(())
        })
    }
}

fn connect(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    migrate_conn(&conn)?;
    Ok(conn)
}

/// Open an existing file without creating it. Read-write, since a WAL
/// database without its -shm file cannot be opened read-only.
fn existing_file_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

fn migrate_conn(conn: &Connection) -> StoreResult<()> {
    schema::run_migrations(conn).map_err(|e| StoreError::Migration(format!("{:#}", e)))
}

fn read_meta(conn: &Connection) -> StoreResult<Option<SessionMeta>> {
    let meta = conn
        .query_row(
            "SELECT session_id, name, description FROM session
             ORDER BY updated_at DESC LIMIT 1",
            [],
            |row| {
                Ok(SessionMeta {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(meta)
}

/// Write a compacted copy of `conn`'s main database to `target`, replacing
/// any file already there.
fn vacuum_into(conn: &Connection, target: &Path) -> StoreResult<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    remove_database_files(target)?;

    let target = target
        .to_str()
        .ok_or_else(|| StoreError::MissingLocation(target.display().to_string()))?;
    conn.execute("VACUUM INTO ?", [target])?;
    Ok(())
}

fn remove_database_files(path: &Path) -> StoreResult<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }

    for candidate in candidates {
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
