//! vmcanvas library
//!
//! Stores canvas machine nodes and deploys each one as a cloud VM through
//! terraform, then bootstraps the requested application over ssh.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod selector;
pub mod server;
pub mod storage;
pub mod utils;
