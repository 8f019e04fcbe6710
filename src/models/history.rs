use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a historical record entered the session.
///
/// - `Manual`: the tester visited the resource through the proxy
/// - `Crawled`: the crawler discovered the resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Manual,
    Crawled,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Crawled => "crawled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "crawled" => Some(Self::Crawled),
            _ => None,
        }
    }

    /// Type code stored in the `history` table.
    pub fn code(&self) -> i64 {
        match self {
            Self::Manual => 1,
            Self::Crawled => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Manual),
            2 => Some(Self::Crawled),
            _ => None,
        }
    }
}

/// A previously observed request, replayed into the scope tree when a
/// session is opened.
///
/// Records are written by the proxy and crawler, never by the session itself.
/// The session only needs enough of the request to place it in the tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoricalRecord {
    pub id: i64,
    pub session_id: i64,
    pub kind: RecordKind,
    pub method: String,
    pub uri: String,
    pub created_at: DateTime<Utc>,
}
