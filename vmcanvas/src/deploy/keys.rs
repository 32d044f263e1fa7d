//! SSH key pair generation

use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::process::{CommandSpec, ProcessFailure, ProcessRunner};
use crate::deploy::workspace::DeploymentWorkspace;
use crate::errors::AppError;

/// Generates an RSA key pair into a workspace with `ssh-keygen`
pub struct KeyGenerator {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl KeyGenerator {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    pub fn command(&self, workspace: &DeploymentWorkspace, comment: &str) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["-q", "-t", "rsa", "-b", "4096", "-N", "", "-f"])
            .arg(workspace.private_key().path().to_string_lossy())
            .args(["-C", comment])
            .current_dir(workspace.dir().path())
    }

    pub async fn generate(
        &self,
        workspace: &DeploymentWorkspace,
        comment: &str,
    ) -> Result<(), ProcessFailure> {
        self.runner.run(&self.command(workspace, comment)).await?;
        Ok(())
    }

    /// Generate a key pair, tolerating a failed run as long as the public key
    /// the infra declaration points at is present afterwards.
    pub async fn ensure_key_pair(
        &self,
        workspace: &DeploymentWorkspace,
        comment: &str,
    ) -> Result<(), AppError> {
        match self.generate(workspace, comment).await {
            Ok(()) => {
                info!("Generated key pair {}", workspace.key_name());
                Ok(())
            }
            Err(failure) => {
                warn!("SSH key generation failed: {}", failure);
                if workspace.public_key().exists().await {
                    warn!(
                        "Continuing with existing public key {:?}",
                        workspace.public_key().path()
                    );
                    Ok(())
                } else {
                    Err(AppError::KeygenError(failure.to_string()))
                }
            }
        }
    }
}
