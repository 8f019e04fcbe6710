mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{memory_store, RecordingObserver};
use scopeward::db::Database;
use scopeward::error::SessionError;
use scopeward::models::*;
use scopeward::session::Session;
use scopeward::store::SessionStore;
use speculate2::speculate;

speculate! {
    before {
        let store = memory_store();
        let observer = Arc::new(RecordingObserver::default());
        let session = Session::builder(store.clone())
            .observer(observer.clone())
            .build();
    }

    describe "scope decisions" {
        it "follows the include rules for added resources" {
            session
                .set_rules(RuleCategory::IncludeInScope, &["https?://example\\.com/.*"])
                .expect("Failed to set rules");
            session.add_resource("https://example.com/a").expect("add");
            session.add_resource("https://other.com/b").expect("add");

            assert!(session.is_in_scope("https://example.com/a"));
            assert!(!session.is_in_scope("https://other.com/b"));
        }

        it "reports in-scope nodes after the refresh" {
            session.add_resource("https://example.com/a").expect("add");
            session.add_resource("https://other.com/b").expect("add");
            session
                .set_rules(RuleCategory::IncludeInScope, &["https://example\\.com.*"])
                .expect("set");
            session.flush().expect("flush");

            let names: Vec<String> = session
                .collect_in_scope()
                .into_iter()
                .map(|n| n.hierarchic_name)
                .collect();
            assert_eq!(names, vec![
                "https://example.com".to_string(),
                "https://example.com/a".to_string(),
            ]);
        }

        it "resolves records through the store" {
            session.set_rules(RuleCategory::IncludeInScope, &[".*/in/.*"]).expect("set");
            let inside = session.add_record(RecordKind::Manual, "GET", "http://h.test/in/x").expect("add");
            let outside = session.add_record(RecordKind::Manual, "GET", "http://h.test/out/x").expect("add");

            assert!(session.is_record_in_scope(inside.id));
            assert!(!session.is_record_in_scope(outside.id));
            assert!(!session.is_record_in_scope(12345));
        }

        it "rejects a resource without a host" {
            match session.add_resource("not a uri") {
                Err(SessionError::InvalidResource(_)) => {}
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    describe "rule changes" {
        it "notifies observers with the nodes that changed" {
            session.add_resource("https://example.com/a").expect("add");
            session.set_rules(RuleCategory::IncludeInScope, &[".*"]).expect("set");
            session.flush().expect("flush");

            let change = observer.last_change().expect("no notification");
            assert_eq!(change.changed_nodes, vec![
                "https://example.com".to_string(),
                "https://example.com/a".to_string(),
            ]);
        }

        it "skips writes and notifications for an identical list" {
            assert!(session.set_rules(RuleCategory::IncludeInScope, &[".*"]).expect("set"));
            session.flush().expect("flush");
            assert!(!session.set_rules(RuleCategory::IncludeInScope, &[" .*", ""]).expect("set"));
            session.flush().expect("flush");

            assert_eq!(store.rule_writes(), 1);
            assert_eq!(observer.change_count(), 1);
        }

        it "keeps the old rules when the store write fails" {
            session.set_rules(RuleCategory::ExcludeFromScope, &["a.*"]).expect("set");
            store.fail_rule_writes.store(true, Ordering::SeqCst);

            match session.set_rules(RuleCategory::ExcludeFromScope, &["b.*"]) {
                Err(SessionError::Storage(_)) => {}
                other => panic!("unexpected: {:?}", other),
            }
            session.flush().expect("flush");
            assert_eq!(session.get_rules(RuleCategory::ExcludeFromScope), vec!["a.*".to_string()]);
            assert_eq!(observer.change_count(), 1);
        }

        it "keeps the old rules when a pattern is invalid" {
            session.set_rules(RuleCategory::IncludeInScope, &["a.*"]).expect("set");
            assert!(session.set_rules(RuleCategory::IncludeInScope, &["ok", "(broken"]).is_err());
            assert_eq!(session.get_rules(RuleCategory::IncludeInScope), vec!["a.*".to_string()]);
        }

        it "appends a single rule" {
            session.add_rule(RuleCategory::ExcludeFromScope, ".*\\.png").expect("add");
            session.add_rule(RuleCategory::ExcludeFromScope, ".*\\.gif").expect("add");
            assert_eq!(session.get_rules(RuleCategory::ExcludeFromScope), vec![
                ".*\\.png".to_string(),
                ".*\\.gif".to_string(),
            ]);
            assert_eq!(
                store.inner.read_rules(RuleCategory::ExcludeFromScope).expect("read"),
                session.get_rules(RuleCategory::ExcludeFromScope)
            );
        }

        it "announces exclusion lists without touching the tree" {
            session.add_resource("https://example.com/a").expect("add");
            session.set_rules(RuleCategory::ExcludeFromCrawl, &[".*logout.*"]).expect("set");
            session.flush().expect("flush");

            assert_eq!(observer.change_count(), 0);
            let exclusions = observer.exclusions.lock().unwrap();
            assert_eq!(exclusions.len(), 1);
            assert_eq!(exclusions[0].0, RuleCategory::ExcludeFromCrawl);
            assert!(session.is_excluded_from(RuleCategory::ExcludeFromCrawl, "http://h/logout"));
        }
    }

    describe "transitions" {
        it "rejects changes while saving" {
            let dir = tempfile::tempdir().expect("tempdir");
            let target = dir.path().join("s.db").to_string_lossy().into_owned();
            let (entered, release) = store.pause_next();
            let saver = {
                let session = session.clone();
                std::thread::spawn(move || session.save(&target))
            };
            entered.recv().expect("save never reached the store");

            assert_eq!(session.state(), SessionState::Saving);
            assert!(matches!(
                session.set_rules(RuleCategory::IncludeInScope, &[".*"]),
                Err(SessionError::NotOpen(SessionState::Saving))
            ));
            assert!(matches!(
                session.add_resource("http://h.test/"),
                Err(SessionError::NotOpen(SessionState::Saving))
            ));
            assert!(matches!(
                session.set_name("renamed"),
                Err(SessionError::NotOpen(SessionState::Saving))
            ));

            release.send(()).expect("release");
            saver.join().expect("save thread panicked").expect("save failed");

            assert_eq!(session.state(), SessionState::Open);
            assert!(session.get_rules(RuleCategory::IncludeInScope).is_empty());
            assert_eq!(session.tree().node_count(), 0);
            assert_ne!(session.name(), "renamed");
            assert_eq!(store.rule_writes(), 0);
        }

        it "rejects changes while opening" {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("stored.db");
            {
                let db = Database::open_path(&path).expect("Failed to create session file");
                db.update_session(9, "Stored", "").expect("meta");
            }
            let location = path.to_string_lossy().into_owned();
            let (entered, release) = store.pause_next();
            let opener = {
                let session = session.clone();
                std::thread::spawn(move || session.open(&location))
            };
            entered.recv().expect("open never reached the store");

            assert_eq!(session.state(), SessionState::Opening);
            assert!(matches!(
                session.set_rules(RuleCategory::ExcludeFromScope, &[".*"]),
                Err(SessionError::NotOpen(SessionState::Opening))
            ));
            assert!(matches!(
                session.add_record(RecordKind::Manual, "GET", "http://h.test/"),
                Err(SessionError::NotOpen(SessionState::Opening))
            ));
            assert!(matches!(
                session.set_description("changed"),
                Err(SessionError::NotOpen(SessionState::Opening))
            ));

            release.send(()).expect("release");
            opener.join().expect("open thread panicked").expect("open failed");

            assert_eq!(session.state(), SessionState::Open);
            assert_eq!(session.name(), "Stored");
            assert!(session.get_rules(RuleCategory::ExcludeFromScope).is_empty());
            assert_eq!(session.tree().node_count(), 0);
            assert_eq!(store.rule_writes(), 0);
        }
    }

    describe "discard" {
        it "purges the session's history" {
            session.add_record(RecordKind::Manual, "GET", "http://h.test/a").expect("add");
            session.add_record(RecordKind::Crawled, "GET", "http://h.test/b").expect("add");

            session.discard();

            assert_eq!(session.state(), SessionState::Discarded);
            assert!(store.inner.history_ids(session.id(), RecordKind::Manual).expect("ids").is_empty());
            assert!(store.inner.history_ids(session.id(), RecordKind::Crawled).expect("ids").is_empty());
        }

        it "refuses further changes" {
            session.discard();
            match session.set_rules(RuleCategory::IncludeInScope, &[".*"]) {
                Err(SessionError::NotOpen(SessionState::Discarded)) => {}
                other => panic!("unexpected: {:?}", other),
            }
            assert!(session.add_resource("http://h.test/").is_err());
        }

        it "does not fail when the store is gone" {
            store.inner.close().expect("close");
            session.discard();
            assert_eq!(session.state(), SessionState::Discarded);
        }
    }
}
