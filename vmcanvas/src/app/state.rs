//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::process::{ProcessRunner, TokioProcessRunner};
use crate::errors::AppError;
use crate::selector::{AnthropicSelector, MachineSelector};
use crate::storage::machines::MachineStore;

/// Main application state
pub struct AppState {
    /// Machine configuration store
    pub store: Arc<MachineStore>,

    /// Deployment pipeline
    pub orchestrator: Arc<Orchestrator>,

    /// Natural-language machine selection
    pub selector: Arc<dyn MachineSelector>,
}

impl AppState {
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

    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, AppError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let store = Arc::new(MachineStore::new(options.layout.machines_file()));

        let runner: Arc<dyn ProcessRunner> =
            Arc::new(TokioProcessRunner::new(options.command_timeout));
        let orchestrator = Arc::new(Orchestrator::new(options.orchestrator.clone(), runner));

        let selector: Arc<dyn MachineSelector> =
            Arc::new(AnthropicSelector::new(&options.selector)?);

        Ok(Self::new(store, orchestrator, selector))
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Shutting down application state...");
        let in_flight = self.orchestrator.in_flight_ids();
        if !in_flight.is_empty() {
            warn!(
                "Shutting down with deployments in flight; their workspaces may hold live resources: {:?}",
                in_flight
            );
        }
        Ok(())
    }
}
