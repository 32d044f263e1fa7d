//! Server state

use std::sync::Arc;

use crate::deploy::orchestrator::Orchestrator;
use crate::selector::MachineSelector;
use crate::storage::machines::MachineStore;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<MachineStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub selector: Arc<dyn MachineSelector>,
}

impl ServerState {
    pub fn new(
        store: Arc<MachineStore>,
        orchestrator: Arc<Orchestrator>,
        selector: Arc<dyn MachineSelector>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            selector,
        }
    }
}
