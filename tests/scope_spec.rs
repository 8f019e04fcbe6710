use std::sync::Arc;

use scopeward::error::SessionError;
use scopeward::models::RuleCategory;
use scopeward::scope::{RuleSet, ScopePolicy};
use speculate2::speculate;

fn policy(include: &[&str], exclude: &[&str]) -> ScopePolicy {
    ScopePolicy::new(
        Arc::new(RuleSet::compile(RuleCategory::IncludeInScope, include).expect("bad include")),
        Arc::new(RuleSet::compile(RuleCategory::ExcludeFromScope, exclude).expect("bad exclude")),
    )
}

speculate! {
    describe "compile" {
        it "accepts a list of valid patterns" {
            let set = RuleSet::compile(RuleCategory::IncludeInScope, &["https?://example\\.com/.*", ".*\\.js"])
                .expect("Failed to compile");
            assert_eq!(set.len(), 2);
        }

        it "ignores blank entries when validating" {
            let set = RuleSet::compile(RuleCategory::ExcludeFromScan, &["", "   ", "\t"])
                .expect("Failed to compile");
            assert!(set.is_empty());
        }

        it "fails on the first invalid pattern and keeps nothing" {
            let result = RuleSet::compile(RuleCategory::IncludeInScope, &["good.*", "[bad", "(also bad"]);
            match result {
                Err(SessionError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "[bad"),
                other => panic!("expected InvalidPattern, got {:?}", other.map(|s| s.len())),
            }
        }

        it "stores trimmed patterns" {
            let set = RuleSet::compile(RuleCategory::IncludeInScope, &["  .*example.*\n"])
                .expect("Failed to compile");
            assert_eq!(set.patterns(), &[".*example.*".to_string()]);
        }
    }

    describe "replace" {
        it "is a no-op for an identical list after trimming" {
            let set = RuleSet::compile(RuleCategory::IncludeInScope, &["a", "b"]).expect("compile");
            let next = set.replace(&["a ", "", " b"]).expect("replace");
            assert!(next.is_none());
            assert!(set.same_patterns(&["a ", "", " b"]));
        }

        it "produces a new set when order differs" {
            let set = RuleSet::compile(RuleCategory::IncludeInScope, &["a", "b"]).expect("compile");
            let next = set.replace(&["b", "a"]).expect("replace").expect("should change");
            assert_eq!(next.patterns(), &["b".to_string(), "a".to_string()]);
        }

        it "rejects an invalid replacement" {
            let set = RuleSet::compile(RuleCategory::IncludeInScope, &["a"]).expect("compile");
            assert!(set.replace(&["a", "*"]).is_err());
            assert_eq!(set.patterns(), &["a".to_string()]);
        }
    }

    describe "is_in_scope" {
        it "is always false with an empty include list" {
            let p = policy(&[], &[]);
            assert!(!p.is_in_scope("http://example.com/"));
            let p = policy(&[], &[".*"]);
            assert!(!p.is_in_scope(""));
            assert!(!p.is_in_scope("anything"));
        }

        it "applies excludes over includes" {
            let p = policy(&[".*"], &["/admin.*"]);
            assert!(p.is_in_scope("/x"));
            assert!(!p.is_in_scope("/admin/y"));
        }

        it "ignores the query string" {
            let p = policy(&["a/b"], &[]);
            assert_eq!(p.is_in_scope("a/b?x=1"), p.is_in_scope("a/b"));
            assert!(p.is_in_scope("a/b?x=1"));

            let p = policy(&[".*"], &["a/b"]);
            assert!(!p.is_in_scope("a/b?x=1"));
        }

        it "requires a full match" {
            let p = policy(&["example\\.com"], &[]);
            assert!(p.is_in_scope("EXAMPLE.com"));
            assert!(!p.is_in_scope("http://example.com/"));
        }

        it "returns false for an absent node" {
            let p = policy(&[".*"], &[]);
            assert!(!p.is_node_in_scope(None));
        }
    }
}
