//! Local storage: layout, settings and record stores

pub mod layout;
pub mod manifest;
pub mod records;
pub mod settings;
