//! Post-provisioning remote setup over scp/ssh

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::deploy::process::{CommandSpec, ProcessFailure, ProcessRunner};

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Wait after the address is known before the first connection. The
    /// host offers no readiness signal while cloud-init runs.
    pub settle_delay: Duration,

    /// Login user on the image
    pub ssh_user: String,

    /// Where the setup script is copied on the host
    pub remote_script_path: String,

    /// ssh/scp connect timeout
    pub connect_timeout: Duration,

    pub ssh_program: String,
    pub scp_program: String,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(30),
            ssh_user: "ubuntu".to_string(),
            remote_script_path: "/tmp/setup.sh".to_string(),
            connect_timeout: Duration::from_secs(30),
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("copying setup script failed: {0}")]
    Copy(ProcessFailure),

    #[error("running setup script failed: {0}")]
    Execute(ProcessFailure),
}

/// Copies the setup script to a fresh host and runs it with sudo.
///
/// Host keys are not verified: the host was created moments ago by this
/// deployment and has no known key yet.
pub struct RemoteBootstrap {
    runner: Arc<dyn ProcessRunner>,
    options: BootstrapOptions,
}

impl RemoteBootstrap {
    pub fn new(runner: Arc<dyn ProcessRunner>, options: BootstrapOptions) -> Self {
        Self { runner, options }
    }

    fn target(&self, host: &str) -> String {
        format!("{}@{}", self.options.ssh_user, host)
    }

    fn connection_args(&self, key_path: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            key_path.to_string_lossy().into_owned(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
        ]
    }

    /// Command line a user can paste to log into the host
    pub fn ssh_command_line(&self, host: &str, key_path: &Path) -> String {
        format!(
            "ssh -i {} {}",
            key_path.to_string_lossy(),
            self.target(host)
        )
    }

    pub fn copy_command(&self, host: &str, key_path: &Path, script: &Path) -> CommandSpec {
        CommandSpec::new(&self.options.scp_program)
            .args(self.connection_args(key_path))
            .arg(script.to_string_lossy())
            .arg(format!("{}:{}", self.target(host), self.options.remote_script_path))
    }

    pub fn execute_command(&self, host: &str, key_path: &Path) -> CommandSpec {
        let remote = &self.options.remote_script_path;
        CommandSpec::new(&self.options.ssh_program)
            .args(self.connection_args(key_path))
            .arg(self.target(host))
            .arg(format!("chmod +x {remote} && sudo {remote}"))
    }

    /// Wait out the settle delay, copy the script, run it
    pub async fn run(&self, host: &str, key_path: &Path, script: &Path) -> Result<(), BootstrapError> {
        if !self.options.settle_delay.is_zero() {
            info!("Waiting {:?} for {} to finish booting", self.options.settle_delay, host);
            tokio::time::sleep(self.options.settle_delay).await;
        }

        debug!("Copying setup script to {}", host);
        self.runner
            .run(&self.copy_command(host, key_path, script))
            .await
            .map_err(BootstrapError::Copy)?;

        info!("Running setup script on {}", host);
        self.runner
            .run(&self.execute_command(host, key_path))
            .await
            .map_err(BootstrapError::Execute)?;

        info!("Bootstrap completed on {}", host);
        Ok(())
    }
}
