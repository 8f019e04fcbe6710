//! Rule compilation and scope evaluation.

mod policy;
mod rule_set;

pub use policy::ScopePolicy;
pub use rule_set::{strip_query, RuleSet};
