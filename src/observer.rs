//! Subscriptions for components that act on scope decisions.

use crate::models::RuleCategory;

/// The outcome of one committed scope refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChange {
    /// Hierarchic names of nodes whose cached flags flipped.
    pub changed_nodes: Vec<String>,
}

/// Implemented by the proxy, crawler and scanner to hear about rule changes.
///
/// Callbacks run on the session's tree owner thread (for `scope_changed`) or
/// on the thread that changed the rules (for `exclusions_changed`). They
/// should return quickly.
pub trait ScopeObserver: Send + Sync {
    fn scope_changed(&self, change: &ScopeChange);

    /// One of the non-scope exclusion lists was replaced.
    fn exclusions_changed(&self, _category: RuleCategory, _patterns: &[String]) {}
}
