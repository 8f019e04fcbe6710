use regex::{Regex, RegexBuilder};

use crate::error::{SessionError, SessionResult};
use crate::models::RuleCategory;

/// One category's patterns and their compiled matchers.
///
/// `patterns[i]` is always the source of `matchers[i]`. A rule set is never
/// edited after construction; sessions swap in a freshly compiled one instead,
/// so a reader holding an `Arc<RuleSet>` sees a consistent pair of lists.
#[derive(Debug, Clone)]
pub struct RuleSet {
    category: RuleCategory,
    patterns: Vec<String>,
    matchers: Vec<Regex>,
}

impl RuleSet {
    pub fn empty(category: RuleCategory) -> Self {
        Self {
            category,
            patterns: Vec::new(),
            matchers: Vec::new(),
        }
    }

    /// Compile `patterns` into a rule set.
    ///
    /// Entries are trimmed and blank entries dropped. Every remaining entry is
    /// validated before any matcher is kept, so an invalid pattern anywhere in
    /// the input yields an error and nothing else.
    pub fn compile<S: AsRef<str>>(category: RuleCategory, patterns: &[S]) -> SessionResult<Self> {
        let cleaned = normalize(patterns);

        let matchers = cleaned
            .iter()
            .map(|p| build_matcher(p))
            .collect::<SessionResult<Vec<_>>>()?;

        Ok(Self {
            category,
            patterns: cleaned,
            matchers,
        })
    }

    /// Compile `candidate` unless it is the same list as this one.
    ///
    /// Returns `Ok(None)` when nothing would change, which lets callers skip
    /// the store write and the scope refresh.
    pub fn replace<S: AsRef<str>>(&self, candidate: &[S]) -> SessionResult<Option<Self>> {
        if self.same_patterns(candidate) {
            return Ok(None);
        }
        Self::compile(self.category, candidate).map(Some)
    }

    /// Element-wise comparison after trimming and blank removal.
    pub fn same_patterns<S: AsRef<str>>(&self, candidate: &[S]) -> bool {
        normalize(candidate) == self.patterns
    }

    /// A copy of this set with one more pattern appended.
    pub fn with_pattern(&self, pattern: &str) -> SessionResult<Self> {
        let mut patterns = self.patterns.clone();
        patterns.push(pattern.to_string());
        Self::compile(self.category, &patterns)
    }

    /// True if `name`, with any query suffix removed, fully matches a pattern.
    pub fn evaluate(&self, name: &str) -> bool {
        let name = strip_query(name);
        self.matchers.iter().any(|m| m.is_match(name))
    }

    pub fn category(&self) -> RuleCategory {
        self.category
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Drop everything from the first `?` onward.
pub fn strip_query(name: &str) -> &str {
    match name.find('?') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

fn normalize<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_matcher(pattern: &str) -> SessionResult<Regex> {
    // Anchored so that `is_match` behaves as a whole-string match.
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|source| SessionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}
