use serde::{Deserialize, Serialize};

/// A flattened, read-only copy of one scope tree node.
///
/// Returned by in-scope listings and written to the store on save, so that
/// callers never hold a reference into the live tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub hierarchic_name: String,
    pub included_in_scope: bool,
    pub excluded_from_scope: bool,
    pub history_id: Option<i64>,
}

impl NodeSnapshot {
    pub fn in_scope(&self) -> bool {
        self.included_in_scope && !self.excluded_from_scope
    }
}
