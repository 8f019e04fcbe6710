use serde::{Deserialize, Serialize};

/// The six kinds of rule list a session carries.
///
/// Only `IncludeInScope` and `ExcludeFromScope` feed the scope decision.
/// The remaining categories are exclusion lists that the proxy, scanner,
/// crawler and socket-stream recorder consult on their own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    IncludeInScope,
    ExcludeFromScope,
    ExcludeFromProxy,
    ExcludeFromScan,
    ExcludeFromCrawl,
    ExcludeFromSocketStream,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        Self::IncludeInScope,
        Self::ExcludeFromScope,
        Self::ExcludeFromProxy,
        Self::ExcludeFromScan,
        Self::ExcludeFromCrawl,
        Self::ExcludeFromSocketStream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncludeInScope => "include_in_scope",
            Self::ExcludeFromScope => "exclude_from_scope",
            Self::ExcludeFromProxy => "exclude_from_proxy",
            Self::ExcludeFromScan => "exclude_from_scan",
            Self::ExcludeFromCrawl => "exclude_from_crawl",
            Self::ExcludeFromSocketStream => "exclude_from_socket_stream",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "include_in_scope" => Some(Self::IncludeInScope),
            "exclude_from_scope" => Some(Self::ExcludeFromScope),
            "exclude_from_proxy" => Some(Self::ExcludeFromProxy),
            "exclude_from_scan" => Some(Self::ExcludeFromScan),
            "exclude_from_crawl" => Some(Self::ExcludeFromCrawl),
            "exclude_from_socket_stream" => Some(Self::ExcludeFromSocketStream),
            _ => None,
        }
    }

    /// Stable integer code used for rule rows in the backing store.
    pub fn code(&self) -> i64 {
        match self {
            Self::IncludeInScope => 1,
            Self::ExcludeFromScope => 2,
            Self::ExcludeFromProxy => 3,
            Self::ExcludeFromScan => 4,
            Self::ExcludeFromCrawl => 5,
            Self::ExcludeFromSocketStream => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Whether a change to this category requires the scope tree to be refreshed.
    pub fn affects_scope(&self) -> bool {
        matches!(self, Self::IncludeInScope | Self::ExcludeFromScope)
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
