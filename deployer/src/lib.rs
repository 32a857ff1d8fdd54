//! Deployer Library
//!
//! Zero-downtime release orchestration: per-server SSH key pairs, shared
//! folders linked into every release, atomic `current` switching, rollback
//! and pruning across a project's servers.

pub mod admin;
pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod folders;
pub mod keys;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod tasks;
pub mod utils;
