//! Terraform lifecycle driver
//!
//! `init -> apply -> output` on the happy path. Any failure after `init`
//! has succeeded runs exactly one `destroy` before the error is returned,
//! and the destroy outcome is reported next to the original failure.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::deploy::process::{CommandSpec, ProcessFailure, ProcessRunner};

/// Provisioning step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Init,
    Apply,
    ReadOutput,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::Init => f.write_str("init"),
            ProvisionStep::Apply => f.write_str("apply"),
            ProvisionStep::ReadOutput => f.write_str("output"),
        }
    }
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Process(#[from] ProcessFailure),

    #[error("output `{0}` is empty")]
    EmptyOutput(String),
}

/// Result of the compensating destroy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Nothing was created, so nothing was destroyed
    NotNeeded,
    Destroyed,
    Failed(ProcessFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("terraform {step} failed: {cause}{}", teardown_suffix(.teardown))]
pub struct ProvisionError {
    pub step: ProvisionStep,
    pub cause: StepFailure,
    pub teardown: Teardown,
}

fn teardown_suffix(teardown: &Teardown) -> String {
    match teardown {
        Teardown::NotNeeded => String::new(),
        Teardown::Destroyed => "; resources destroyed".to_string(),
        Teardown::Failed(e) => format!("; destroy also failed: {}", e),
    }
}

impl ProvisionError {
    /// Message safe to hand to API callers (no tool output)
    pub fn public_message(&self) -> String {
        let base = format!("Terraform {} failed", self.step);
        match self.teardown {
            Teardown::Failed(_) => format!(
                "{}; cleanup (terraform destroy) also failed, cloud resources may still exist",
                base
            ),
            _ => base,
        }
    }
}

/// Values read from a successful apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub public_ip: String,
}

/// Drives the provisioning tool for one workspace
pub struct ProvisioningDriver {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl ProvisioningDriver {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn command<'a>(&self, dir: &Path, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new(&self.program).args(args).current_dir(dir)
    }

    pub async fn init(&self, dir: &Path) -> Result<(), ProcessFailure> {
        self.runner
            .run(&self.command(dir, ["init", "-input=false", "-no-color"]))
            .await?;
        Ok(())
    }

    pub async fn apply(&self, dir: &Path) -> Result<(), ProcessFailure> {
        self.runner
            .run(&self.command(dir, ["apply", "-auto-approve", "-input=false", "-no-color"]))
            .await?;
        Ok(())
    }

    pub async fn read_output(&self, dir: &Path, key: &str) -> Result<String, StepFailure> {
        let output = self
            .runner
            .run(&self.command(dir, ["output", "-raw", "-no-color", key]))
            .await?;
        let value = output.stdout.trim().to_string();
        if value.is_empty() {
            return Err(StepFailure::EmptyOutput(key.to_string()));
        }
        Ok(value)
    }

    pub async fn destroy(&self, dir: &Path) -> Result<(), ProcessFailure> {
        self.runner
            .run(&self.command(dir, ["destroy", "-auto-approve", "-input=false", "-no-color"]))
            .await?;
        Ok(())
    }

    /// Run the full lifecycle and read `output_key` (the public address)
    pub async fn provision(&self, dir: &Path, output_key: &str) -> Result<Provisioned, ProvisionError> {
        info!("terraform init in {:?}", dir);
        if let Err(e) = self.init(dir).await {
            error!("terraform init failed: {}", e);
            return Err(ProvisionError {
                step: ProvisionStep::Init,
                cause: e.into(),
                teardown: Teardown::NotNeeded,
            });
        }

        info!("terraform apply in {:?}", dir);
        if let Err(e) = self.apply(dir).await {
            return Err(self.compensate(dir, ProvisionStep::Apply, e.into()).await);
        }

        match self.read_output(dir, output_key).await {
            Ok(public_ip) => {
                info!("Provisioned instance at {}", public_ip);
                Ok(Provisioned { public_ip })
            }
            Err(e) => Err(self.compensate(dir, ProvisionStep::ReadOutput, e).await),
        }
    }

    async fn compensate(&self, dir: &Path, step: ProvisionStep, cause: StepFailure) -> ProvisionError {
        error!("terraform {} failed: {}; destroying resources", step, cause);

        let teardown = match self.destroy(dir).await {
            Ok(()) => {
                info!("terraform destroy completed in {:?}", dir);
                Teardown::Destroyed
            }
            Err(e) => {
                warn!("terraform destroy failed: {}", e);
                Teardown::Failed(e)
            }
        };

        ProvisionError { step, cause, teardown }
    }
}
