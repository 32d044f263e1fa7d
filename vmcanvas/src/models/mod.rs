//! Data models

pub mod catalog;
pub mod deployment;
pub mod machine;
