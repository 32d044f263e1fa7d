//! Application configuration options

use std::time::Duration;

use crate::deploy::orchestrator::OrchestratorOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{SelectorSettings, Settings};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Deployment pipeline configuration
    pub orchestrator: OrchestratorOptions,

    /// Upper bound for each external command; `None` waits indefinitely
    pub command_timeout: Option<Duration>,

    /// Machine selector configuration
    pub selector: SelectorSettings,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl AppOptions {
    /// Build runtime options from the settings file and the storage layout
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            orchestrator: OrchestratorOptions {
                deployments_dir: layout.deployment_dir().path().to_path_buf(),
                terraform_program: settings.provisioner.terraform_program.clone(),
                keygen_program: settings.provisioner.keygen_program.clone(),
                bootstrap: (&settings.bootstrap).into(),
            },
            command_timeout: settings.provisioner.command_timeout(),
            selector: settings.selector.clone(),
            layout,
            ..Default::default()
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        let layout = StorageLayout::default();
        Self {
            orchestrator: OrchestratorOptions {
                deployments_dir: layout.deployment_dir().path().to_path_buf(),
                ..Default::default()
            },
            layout,
            server: ServerOptions::default(),
            command_timeout: Some(Duration::from_secs(30 * 60)),
            selector: SelectorSettings::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}
