//! Sessions: rule sets, the scope tree and their backing store.
//!
//! A [`Session`] owns the six rule lists and the resource tree of one
//! assessment. Rule edits are validated, persisted and then propagated to
//! the tree on the session's tree owner thread; open and save run as
//! background tasks that report through a callback.

mod lifecycle;
mod owner;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;

use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::models::*;
use crate::observer::{ScopeChange, ScopeObserver};
use crate::scope::{RuleSet, ScopePolicy};
use crate::store::SessionStore;
use crate::tree::{ResourcePath, ScopeTree, TreeNode};

use owner::TreeOwner;

/// Handle to a session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn SessionStore>,
    config: Config,
    observers: Vec<Arc<dyn ScopeObserver>>,
    status: Mutex<Status>,
    rules: RwLock<Rules>,
    tree: ScopeTree,
    owner: TreeOwner,
}

struct Status {
    state: SessionState,
    meta: SessionMeta,
    /// Empty until the session is first saved or opened.
    location: String,
}

#[derive(Clone)]
struct Rules {
    sets: BTreeMap<RuleCategory, Arc<RuleSet>>,
}

impl Rules {
    fn empty() -> Self {
        Self {
            sets: RuleCategory::ALL
                .into_iter()
                .map(|c| (c, Arc::new(RuleSet::empty(c))))
                .collect(),
        }
    }

    fn get(&self, category: RuleCategory) -> Arc<RuleSet> {
        self.sets
            .get(&category)
            .cloned()
            .unwrap_or_else(|| Arc::new(RuleSet::empty(category)))
    }

    fn policy(&self) -> ScopePolicy {
        ScopePolicy::new(
            self.get(RuleCategory::IncludeInScope),
            self.get(RuleCategory::ExcludeFromScope),
        )
    }
}

pub struct SessionBuilder {
    store: Arc<dyn SessionStore>,
    config: Config,
    observers: Vec<Arc<dyn ScopeObserver>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ScopeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Session {
        let id = Utc::now().timestamp_millis();
        let meta = SessionMeta {
            id,
            name: self.config.default_session_name.clone(),
            description: String::new(),
        };
        tracing::debug!("Created session {}", id);

        Session {
            shared: Arc::new(Shared {
                store: self.store,
                config: self.config,
                observers: self.observers,
                status: Mutex::new(Status {
                    state: SessionState::New,
                    meta,
                    location: String::new(),
                }),
                rules: RwLock::new(Rules::empty()),
                tree: ScopeTree::new(),
                owner: TreeOwner::spawn(id),
            }),
        }
    }
}

impl Session {
    /// A new, unsaved session with default configuration and no observers.
    pub fn create(store: Arc<dyn SessionStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<dyn SessionStore>) -> SessionBuilder {
        SessionBuilder {
            store,
            config: Config::default(),
            observers: Vec::new(),
        }
    }

    // ============================================================
    // Identity and state
    // ============================================================

    pub fn id(&self) -> i64 {
        self.status().meta.id
    }

    pub fn name(&self) -> String {
        self.status().meta.name.clone()
    }

    pub fn description(&self) -> String {
        self.status().meta.description.clone()
    }

    pub fn location(&self) -> String {
        self.status().location.clone()
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    /// True until the session has been bound to a backing location.
    pub fn is_new(&self) -> bool {
        self.status().location.is_empty()
    }

    /// Stored on the next save.
    pub fn set_name(&self, name: impl Into<String>) -> SessionResult<()> {
        let mut status = self.mutable_status()?;
        status.meta.name = name.into();
        Ok(())
    }

    /// Stored on the next save.
    pub fn set_description(&self, description: impl Into<String>) -> SessionResult<()> {
        let mut status = self.mutable_status()?;
        status.meta.description = description.into();
        Ok(())
    }

    /// Directory holding the session file, or the configured data
    /// directory for a session that has never been saved.
    pub fn session_folder(&self) -> PathBuf {
        let location = self.location();
        if location.is_empty() {
            return self.shared.config.data_dir();
        }
        PathBuf::from(location)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.shared.config.data_dir())
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.shared.tree
    }

    // ============================================================
    // Rules
    // ============================================================

    pub fn get_rules(&self, category: RuleCategory) -> Vec<String> {
        self.rule_set(category).patterns().to_vec()
    }

    pub fn rule_set(&self, category: RuleCategory) -> Arc<RuleSet> {
        self.shared
            .rules
            .read()
            .expect("rules lock poisoned")
            .get(category)
    }

    /// Current include/exclude pair.
    pub fn policy(&self) -> ScopePolicy {
        self.shared.rules.read().expect("rules lock poisoned").policy()
    }

    /// Replace a category's patterns.
    ///
    /// Patterns are trimmed and blank ones dropped. Returns `Ok(false)` when
    /// the cleaned list equals the current one; nothing is written or
    /// announced in that case. Otherwise the list is persisted, swapped in,
    /// and (for the two scope categories) a tree refresh is queued whose
    /// completion notifies observers.
    pub fn set_rules<S: AsRef<str>>(
        &self,
        category: RuleCategory,
        patterns: &[S],
    ) -> SessionResult<bool> {
        let next = {
            let _status = self.mutable_status()?;
            let current = self.rule_set(category);

            let Some(next) = current.replace(patterns)? else {
                tracing::debug!("Rules for {} unchanged", category);
                return Ok(false);
            };
            self.commit_rules(next)?
        };
        self.announce(&next)?;
        Ok(true)
    }

    /// Append one pattern to a category. Persisted and propagated like
    /// [`set_rules`](Self::set_rules).
    pub fn add_rule(&self, category: RuleCategory, pattern: &str) -> SessionResult<bool> {
        let next = {
            let _status = self.mutable_status()?;
            let current = self.rule_set(category);

            let next = current.with_pattern(pattern)?;
            if next.patterns() == current.patterns() {
                return Ok(false);
            }
            self.commit_rules(next)?
        };
        self.announce(&next)?;
        Ok(true)
    }

    /// Persist, then swap. The caller holds the status lock so that the
    /// session cannot change state in between.
    fn commit_rules(&self, next: RuleSet) -> SessionResult<Arc<RuleSet>> {
        let category = next.category();
        self.shared.store.write_rules(category, next.patterns())?;

        let next = Arc::new(next);
        self.shared
            .rules
            .write()
            .expect("rules lock poisoned")
            .sets
            .insert(category, next.clone());
        tracing::debug!("Rules for {} replaced ({} patterns)", category, next.len());
        Ok(next)
    }

    fn announce(&self, rules: &RuleSet) -> SessionResult<()> {
        if rules.category().affects_scope() {
            return self.schedule_refresh();
        }
        for observer in &self.shared.observers {
            observer.exclusions_changed(rules.category(), rules.patterns());
        }
        Ok(())
    }

    /// Queue a full scope refresh on the tree owner. Observers hear about it
    /// from the owner once the traversal is done.
    fn schedule_refresh(&self) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        self.shared.owner.submit(move || {
            let policy = shared.rules.read().expect("rules lock poisoned").policy();
            let changed_nodes = shared.tree.refresh(&policy);
            tracing::debug!("Scope refreshed, {} nodes changed", changed_nodes.len());

            let change = ScopeChange { changed_nodes };
            for observer in &shared.observers {
                observer.scope_changed(&change);
            }
        })
    }

    // ============================================================
    // Scope queries
    // ============================================================

    pub fn is_in_scope(&self, name: &str) -> bool {
        self.policy().is_in_scope(name)
    }

    pub fn is_node_in_scope(&self, node: Option<&TreeNode>) -> bool {
        self.policy().is_node_in_scope(node)
    }

    /// Scope decision for a stored record, resolved through the store.
    /// Records that cannot be resolved are reported as out of scope.
    pub fn is_record_in_scope(&self, record_id: i64) -> bool {
        match self.resolve_path(record_id) {
            Ok(path) => self.is_in_scope(&path.hierarchic_name()),
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// Whether `name` matches one of the non-scope exclusion lists, e.g.
    /// [`RuleCategory::ExcludeFromProxy`].
    pub fn is_excluded_from(&self, category: RuleCategory, name: &str) -> bool {
        self.rule_set(category).evaluate(name)
    }

    /// Snapshot of every tree node currently in scope. O(nodes).
    pub fn collect_in_scope(&self) -> Vec<NodeSnapshot> {
        self.shared.tree.collect_in_scope(&self.policy())
    }

    // ============================================================
    // Tree growth
    // ============================================================

    /// Add a resource to the tree without a backing record.
    ///
    /// Returns the hierarchic name of the node for `uri`.
    pub fn add_resource(&self, uri: &str) -> SessionResult<String> {
        self.ensure_mutable()?;
        let path = ResourcePath::parse(uri).map_err(SessionError::InvalidResource)?;
        self.insert_on_owner(path, None)
    }

    /// Store a newly observed request and place it in the tree.
    pub fn add_record(&self, kind: RecordKind, method: &str, uri: &str) -> SessionResult<HistoricalRecord> {
        self.ensure_mutable()?;
        let path = ResourcePath::parse(uri).map_err(SessionError::InvalidResource)?;
        let record = self
            .shared
            .store
            .append_record(self.id(), kind, method, uri)?;
        self.insert_on_owner(path, Some(record.id))?;
        Ok(record)
    }

    fn insert_on_owner(&self, path: ResourcePath, history_id: Option<i64>) -> SessionResult<String> {
        let shared = Arc::clone(&self.shared);
        self.shared.owner.run(move || {
            let policy = shared.rules.read().expect("rules lock poisoned").policy();
            shared.tree.insert(&path, history_id, Some(&policy))
        })
    }

    /// Block until every tree operation queued before this call has run.
    pub fn flush(&self) -> SessionResult<()> {
        self.shared.owner.run(|| ())
    }

    // ============================================================
    // Helpers
    // ============================================================

    fn status(&self) -> MutexGuard<'_, Status> {
        self.shared.status.lock().expect("session status lock poisoned")
    }

    fn mutable_status(&self) -> SessionResult<MutexGuard<'_, Status>> {
        let status = self.status();
        if !status.state.is_mutable() {
            return Err(SessionError::NotOpen(status.state));
        }
        Ok(status)
    }

    fn ensure_mutable(&self) -> SessionResult<()> {
        self.mutable_status().map(|_| ())
    }

    fn resolve_path(&self, record_id: i64) -> SessionResult<ResourcePath> {
        let record = self
            .shared
            .store
            .resolve_record(record_id)
            .map_err(|e| SessionError::Replay {
                id: record_id,
                reason: e.to_string(),
            })?;
        ResourcePath::parse(&record.uri).map_err(|reason| SessionError::Replay {
            id: record_id,
            reason,
        })
    }
}
