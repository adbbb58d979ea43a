//! Scope record store
//!
//! Queries over the shared SQLite schema created by
//! `sg_common::db::init`. Every project/email lookup that originates from
//! a caller is scoped by owner: a row the caller does not own is reported
//! exactly like a row that does not exist.

pub mod emails;
pub mod mailbox_accounts;
pub mod projects;
pub mod users;
