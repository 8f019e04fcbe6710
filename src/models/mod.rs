//! Domain models for scopeward.
//!
//! # Core Concepts
//!
//! - [`RuleCategory`]: One of the six rule lists a session carries. Two of them
//!   (include/exclude from scope) decide what is authorized for testing.
//! - [`HistoricalRecord`]: A request observed earlier in the session, tagged by
//!   [`RecordKind`]. Replayed into the scope tree on open.
//! - [`SessionState`] and [`SessionMeta`]: Lifecycle position and identity of a
//!   session.
//! - [`NodeSnapshot`]: Read-only copy of a scope tree node.

mod history;
mod node;
mod rule;
mod session;

pub use history::*;
pub use node::*;
pub use rule::*;
pub use session::*;
