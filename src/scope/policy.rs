use std::sync::Arc;

use crate::models::RuleCategory;
use crate::scope::RuleSet;
use crate::tree::TreeNode;

/// The include/exclude pair that decides whether a resource is in scope.
///
/// Nothing is in scope until something is explicitly included. Exclusion
/// always wins over inclusion.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    include: Arc<RuleSet>,
    exclude: Arc<RuleSet>,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            include: Arc::new(RuleSet::empty(RuleCategory::IncludeInScope)),
            exclude: Arc::new(RuleSet::empty(RuleCategory::ExcludeFromScope)),
        }
    }
}

impl ScopePolicy {
    pub fn new(include: Arc<RuleSet>, exclude: Arc<RuleSet>) -> Self {
        Self { include, exclude }
    }

    pub fn is_included(&self, name: &str) -> bool {
        self.include.evaluate(name)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.evaluate(name)
    }

    pub fn is_in_scope(&self, name: &str) -> bool {
        self.is_included(name) && !self.is_excluded(name)
    }

    /// Same as [`is_in_scope`](Self::is_in_scope) using the node's hierarchic name.
    pub fn is_node_in_scope(&self, node: Option<&TreeNode>) -> bool {
        match node {
            Some(node) => self.is_in_scope(node.hierarchic_name()),
            None => false,
        }
    }

    pub fn include(&self) -> &Arc<RuleSet> {
        &self.include
    }

    pub fn exclude(&self) -> &Arc<RuleSet> {
        &self.exclude
    }
}
