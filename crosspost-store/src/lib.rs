//! Persistence-facing side of the composer: the account catalog, the
//! key-value collaborator and the account group store built on top of it.

pub mod catalog;
pub mod groups;
pub mod kv;
mod record;
