//! Deployment module

pub mod bootstrap;
pub mod fsm;
pub mod keys;
pub mod orchestrator;
pub mod process;
pub mod provision;
pub mod templates;
pub mod workspace;
