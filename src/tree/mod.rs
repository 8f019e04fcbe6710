//! The session's resource tree and its cached scope flags.
//!
//! Every node mirrors one level of a tested resource's location and caches
//! whether its hierarchic name is included in and/or excluded from scope.
//! The cache is derived data: [`ScopeTree::refresh`] re-evaluates it after the
//! rules change. The root is a synthetic container and carries no flags.

mod path;
mod render;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::NodeSnapshot;
use crate::scope::ScopePolicy;

pub use path::ResourcePath;
pub use render::render_tree;

const ROOT_NAME: &str = "Sites";

#[derive(Debug, Clone)]
pub struct TreeNode {
    name: String,
    hierarchic_name: String,
    included_in_scope: bool,
    excluded_from_scope: bool,
    history_id: Option<i64>,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    pub fn root() -> Self {
        Self::new(ROOT_NAME.to_string(), String::new())
    }

    fn new(name: String, hierarchic_name: String) -> Self {
        Self {
            name,
            hierarchic_name,
            included_in_scope: false,
            excluded_from_scope: false,
            history_id: None,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hierarchic_name(&self) -> &str {
        &self.hierarchic_name
    }

    pub fn is_root(&self) -> bool {
        self.hierarchic_name.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_included_in_scope(&self) -> bool {
        self.included_in_scope
    }

    pub fn is_excluded_from_scope(&self) -> bool {
        self.excluded_from_scope
    }

    /// Cached scope decision: included and not excluded.
    pub fn is_in_scope(&self) -> bool {
        self.included_in_scope && !self.excluded_from_scope
    }

    /// The record that first created this node, if any.
    pub fn history_id(&self) -> Option<i64> {
        self.history_id
    }

    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.get(name)
    }

    /// Look up a descendant (or this node) by hierarchic name.
    pub fn find(&self, hierarchic_name: &str) -> Option<&TreeNode> {
        if self.hierarchic_name == hierarchic_name {
            return Some(self);
        }
        // Only descend into subtrees whose name prefixes the target.
        self.children
            .values()
            .filter(|c| hierarchic_name.starts_with(c.hierarchic_name.as_str()))
            .find_map(|c| c.find(hierarchic_name))
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            hierarchic_name: self.hierarchic_name.clone(),
            included_in_scope: self.included_in_scope,
            excluded_from_scope: self.excluded_from_scope,
            history_id: self.history_id,
        }
    }

    /// Insert `path` below this node, creating missing levels.
    ///
    /// When `policy` is given, the flags of every node touched on the way
    /// down are evaluated immediately. Returns the hierarchic name of the
    /// deepest node.
    pub fn insert_path(
        &mut self,
        path: &ResourcePath,
        history_id: Option<i64>,
        policy: Option<&ScopePolicy>,
    ) -> String {
        let levels =
            std::iter::once(path.origin().to_string()).chain(path.segments().iter().cloned());

        let mut node = self;
        for level in levels {
            let hierarchic_name = if node.is_root() {
                level.clone()
            } else {
                format!("{}/{}", node.hierarchic_name, level)
            };
            node = node
                .children
                .entry(level.clone())
                .or_insert_with(|| TreeNode::new(level, hierarchic_name));
            if let Some(policy) = policy {
                node.apply(policy);
            }
        }

        if node.history_id.is_none() {
            node.history_id = history_id;
        }
        node.hierarchic_name.clone()
    }

    /// Re-evaluate this subtree. Names of nodes whose flags flipped are pushed
    /// onto `changed`.
    pub(crate) fn refresh(&mut self, policy: &ScopePolicy, changed: &mut Vec<String>) {
        if !self.is_root() && self.apply(policy) {
            changed.push(self.hierarchic_name.clone());
        }
        // Flags are evaluated per node, so every descendant is visited.
        for child in self.children.values_mut() {
            child.refresh(policy, changed);
        }
    }

    /// Write the flags from `policy`, touching only those that differ.
    fn apply(&mut self, policy: &ScopePolicy) -> bool {
        let mut flipped = false;
        let included = policy.is_included(&self.hierarchic_name);
        if self.included_in_scope != included {
            self.included_in_scope = included;
            flipped = true;
        }
        let excluded = policy.is_excluded(&self.hierarchic_name);
        if self.excluded_from_scope != excluded {
            self.excluded_from_scope = excluded;
            flipped = true;
        }
        flipped
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a TreeNode)) {
        for child in self.children.values() {
            f(child);
            child.visit(f);
        }
    }
}

/// Shared handle to a session's resource tree.
///
/// Reads may run concurrently; writes are exclusive. Within a session all
/// writes are issued from the tree owner thread.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    root: Arc<RwLock<TreeNode>>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(TreeNode::root())),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TreeNode> {
        self.root.read().expect("scope tree lock poisoned")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TreeNode> {
        self.root.write().expect("scope tree lock poisoned")
    }

    pub fn insert(
        &self,
        path: &ResourcePath,
        history_id: Option<i64>,
        policy: Option<&ScopePolicy>,
    ) -> String {
        self.write().insert_path(path, history_id, policy)
    }

    /// Recompute every node's cached flags from `policy`, depth first.
    ///
    /// Returns the hierarchic names of nodes whose flags actually changed.
    pub fn refresh(&self, policy: &ScopePolicy) -> Vec<String> {
        let mut changed = Vec::new();
        self.write().refresh(policy, &mut changed);
        changed
    }

    /// Swap in a fully built tree in one step.
    pub(crate) fn replace_root(&self, root: TreeNode) {
        *self.write() = root;
    }

    /// Every node that `policy` puts in scope.
    ///
    /// Walks the whole tree, O(nodes). Meant for reports and diagnostics,
    /// not for per-request checks.
    pub fn collect_in_scope(&self, policy: &ScopePolicy) -> Vec<NodeSnapshot> {
        let mut nodes = Vec::new();
        self.read().visit(&mut |n| {
            if policy.is_in_scope(&n.hierarchic_name) {
                nodes.push(n.snapshot());
            }
        });
        nodes
    }

    /// Flattened copy of every non-root node, parents before children.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        let mut nodes = Vec::new();
        self.read().visit(&mut |n| nodes.push(n.snapshot()));
        nodes
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.read().visit(&mut |_| count += 1);
        count
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.read().visit(&mut |n| {
            if n.is_leaf() {
                count += 1;
            }
        });
        count
    }
}
