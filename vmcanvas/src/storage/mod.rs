//! Persistent storage

pub mod layout;
pub mod machines;
pub mod settings;
