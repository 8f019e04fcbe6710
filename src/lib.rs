//! Scope rules and session lifecycle for web security assessments.
//!
//! A [`Session`](session::Session) decides which resources are authorized for
//! testing from an include list and an exclude list of case-insensitive
//! regular expressions, keeps a per-resource cache of that decision in a
//! [`ScopeTree`](tree::ScopeTree), and persists everything through a
//! [`SessionStore`](store::SessionStore).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod observer;
pub mod scope;
pub mod session;
pub mod store;
pub mod tree;
