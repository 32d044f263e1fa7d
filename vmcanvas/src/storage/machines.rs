//! Machine configuration store
//!
//! One JSON array in `machines.json`, read and rewritten whole on every
//! mutation. Mutations are serialized within this process; separate
//! processes sharing the file get last-write-wins.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::deploy::fsm::DeploymentState;
use crate::errors::AppError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentResult;
use crate::models::machine::{MachineConfiguration, MachineUpdate, NewMachine, Region};

pub struct MachineStore {
    file: File,
    write_lock: Mutex<()>,
}

impl MachineStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: Mutex::new(()),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    async fn load(&self) -> Result<Vec<MachineConfiguration>, AppError> {
        if !self.file.exists().await {
            return Ok(Vec::new());
        }
        self.file.read_json().await.map_err(|e| {
            AppError::StorageError(format!(
                "Failed to read {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn save(&self, machines: &[MachineConfiguration]) -> Result<(), AppError> {
        self.file.write_json(&machines).await
    }

    /// Read-modify-write under the store lock
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<MachineConfiguration>) -> Result<(T, bool), AppError>,
    ) -> Result<T, AppError> {
        let _lock = self.write_lock.lock().await;
        let mut machines = self.load().await?;
        let (value, changed) = f(&mut machines)?;
        if changed {
            self.save(&machines).await?;
        }
        Ok(value)
    }

    pub async fn list(&self) -> Result<Vec<MachineConfiguration>, AppError> {
        self.load().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<MachineConfiguration>, AppError> {
        Ok(self.load().await?.into_iter().find(|m| m.id == id))
    }

    /// Validate and insert a new record; ids are unique
    pub async fn create(&self, record: NewMachine) -> Result<MachineConfiguration, AppError> {
        let machine = record.validate()?;
        self.modify(|machines| {
            if machines.iter().any(|m| m.id == machine.id) {
                return Err(AppError::ValidationError(format!(
                    "Machine with id {} already exists",
                    machine.id
                )));
            }
            machines.push(machine.clone());
            Ok((machine, true))
        })
        .await
        .inspect(|m| info!("Created machine {} ({})", m.id, m.name))
    }

    /// Merge the provided fields into an existing record
    pub async fn update(
        &self,
        id: &str,
        update: MachineUpdate,
    ) -> Result<Option<MachineConfiguration>, AppError> {
        self.modify(|machines| match machines.iter_mut().find(|m| m.id == id) {
            Some(machine) => {
                machine.apply(update)?;
                Ok((Some(machine.clone()), true))
            }
            None => Ok((None, false)),
        })
        .await
    }

    /// `false` when no record had that id
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        self.modify(|machines| {
            let before = machines.len();
            machines.retain(|m| m.id != id);
            let removed = machines.len() != before;
            Ok((removed, removed))
        })
        .await
        .inspect(|removed| {
            if *removed {
                info!("Deleted machine {}", id);
            }
        })
    }

    pub async fn list_by_status(
        &self,
        status: DeploymentState,
    ) -> Result<Vec<MachineConfiguration>, AppError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|m| m.deployment_status == status)
            .collect())
    }

    pub async fn list_by_region(&self, region: Region) -> Result<Vec<MachineConfiguration>, AppError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|m| m.region == region)
            .collect())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        let _lock = self.write_lock.lock().await;
        self.save(&[]).await
    }

    /// Move a stored machine to `deploying` where the state machine allows it.
    /// Other states are left alone; the orchestrator decides whether the
    /// attempt may run.
    pub async fn mark_deploying(&self, id: &str) -> Result<Option<MachineConfiguration>, AppError> {
        self.modify(|machines| match machines.iter_mut().find(|m| m.id == id) {
            Some(machine) => {
                let changed = machine
                    .deployment_status
                    .can_transition_to(&DeploymentState::Deploying);
                if changed {
                    machine.deployment_status = DeploymentState::Deploying;
                }
                Ok((Some(machine.clone()), changed))
            }
            None => Ok((None, false)),
        })
        .await
    }

    /// Apply a deploy outcome to a stored machine that is `deploying`.
    ///
    /// `None` when there is no such record, e.g. the machine was deleted and
    /// recreated while the attempt ran.
    pub async fn record_deployment(
        &self,
        id: &str,
        result: &DeploymentResult,
    ) -> Result<Option<MachineConfiguration>, AppError> {
        self.modify(|machines| match machines.iter_mut().find(|m| m.id == id) {
            Some(machine) if machine.deployment_status != DeploymentState::Deploying => {
                debug!(
                    "Not recording outcome for machine {} in state {}",
                    id, machine.deployment_status
                );
                Ok((None, false))
            }
            Some(machine) => {
                match result {
                    DeploymentResult::Success(s) => {
                        machine.is_deployed = true;
                        machine.deployment_status = DeploymentState::Deployed;
                        machine.public_ip = Some(s.public_ip.clone());
                        machine.ssh_key_name = Some(s.ssh_key_name.clone());
                        machine.deployment_dir = Some(s.deployment_dir.clone());
                        machine.ssh_command = Some(s.ssh_command.clone());
                    }
                    DeploymentResult::Failure { .. } => {
                        machine.is_deployed = false;
                        machine.deployment_status = DeploymentState::Failed;
                    }
                }
                debug!("Recorded {} for machine {}", machine.deployment_status, id);
                Ok((Some(machine.clone()), true))
            }
            None => Ok((None, false)),
        })
        .await
    }
}
