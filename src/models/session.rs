use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
///
/// - `New`: never bound to a backing location
/// - `Opening`: a background open is replaying stored state
/// - `Open`: bound to a location and usable
/// - `Saving`: a save is serializing and relocating the store
/// - `Discarded`: history for this session has been purged
///
/// Rules and the tree may only be mutated in `New` or `Open`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    New,
    Opening,
    Open,
    Saving,
    Discarded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Saving => "saving",
            Self::Discarded => "discarded",
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::New | Self::Open)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and description stored alongside a session's data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    /// Join key for every per-session row in the store. Opaque to callers.
    pub id: i64,
    pub name: String,
    pub description: String,
}
