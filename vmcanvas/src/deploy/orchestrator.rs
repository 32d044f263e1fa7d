//! End-to-end machine deployment

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::deploy::bootstrap::{BootstrapError, BootstrapOptions, RemoteBootstrap};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::keys::KeyGenerator;
use crate::deploy::process::ProcessRunner;
use crate::deploy::provision::ProvisioningDriver;
use crate::deploy::templates::PUBLIC_IP_OUTPUT;
use crate::deploy::workspace::{DeploymentWorkspace, WorkspaceIdGenerator};
use crate::errors::AppError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{DeploymentResult, DeploymentSuccess};
use crate::models::machine::MachineConfiguration;

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Parent directory of all deployment workspaces
    pub deployments_dir: PathBuf,

    /// Provisioning tool binary
    pub terraform_program: String,

    /// Key generation binary
    pub keygen_program: String,

    pub bootstrap: BootstrapOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            deployments_dir: PathBuf::from("data/deployments"),
            terraform_program: "terraform".to_string(),
            keygen_program: "ssh-keygen".to_string(),
            bootstrap: BootstrapOptions::default(),
        }
    }
}

/// Snapshot of one machine's tracked deployment state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub state: DeploymentState,
    pub error: Option<String>,
    pub attempts: u32,
    pub in_flight: bool,
}

/// Drives `deploy` for machine nodes: workspace, keys, templates, terraform,
/// bootstrap. At most one attempt per machine id runs at a time; attempts for
/// different ids are independent.
pub struct Orchestrator {
    options: OrchestratorOptions,
    ids: WorkspaceIdGenerator,
    keys: KeyGenerator,
    provisioner: ProvisioningDriver,
    bootstrap: RemoteBootstrap,
    tracked: RwLock<HashMap<String, DeploymentFsm>>,
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    running: HashSet<String>,
    /// Running machines whose tracking is dropped when their attempt ends
    forgotten: HashSet<String>,
}

fn lock_slots(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases the per-machine slot when the attempt ends, however it ends
struct InFlightGuard<'a> {
    slots: &'a Mutex<Slots>,
    machine_id: String,
    released: bool,
}

impl InFlightGuard<'_> {
    /// Free the slot now. Returns whether the machine was forgotten while
    /// the attempt ran.
    fn release(mut self) -> bool {
        self.released = true;
        let mut slots = lock_slots(self.slots);
        slots.running.remove(&self.machine_id);
        slots.forgotten.remove(&self.machine_id)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut slots = lock_slots(self.slots);
        slots.running.remove(&self.machine_id);
        slots.forgotten.remove(&self.machine_id);
    }
}

/// An accepted deployment attempt. It owns the machine's in-flight slot; a
/// dropped attempt that never ran leaves the tracked state untouched.
pub struct DeploymentAttempt<'a> {
    orchestrator: &'a Orchestrator,
    config: MachineConfiguration,
    guard: InFlightGuard<'a>,
}

impl DeploymentAttempt<'_> {
    /// Run the pipeline. Every failure inside it comes back as
    /// `Ok(DeploymentResult::Failure)`.
    pub async fn run(self) -> Result<DeploymentResult, AppError> {
        let DeploymentAttempt {
            orchestrator,
            config,
            guard,
        } = self;
        orchestrator.run_attempt(&config, guard).await
    }
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ids: WorkspaceIdGenerator::new(),
            keys: KeyGenerator::new(runner.clone(), options.keygen_program.clone()),
            provisioner: ProvisioningDriver::new(runner.clone(), options.terraform_program.clone()),
            bootstrap: RemoteBootstrap::new(runner, options.bootstrap.clone()),
            tracked: RwLock::new(HashMap::new()),
            slots: Mutex::new(Slots::default()),
            options,
        }
    }

    /// Deploy one machine.
    ///
    /// `Err` only when the attempt is refused up front (already in flight or
    /// already deployed). Every failure inside the pipeline comes back as
    /// `Ok(DeploymentResult::Failure)`.
    pub async fn deploy(&self, config: &MachineConfiguration) -> Result<DeploymentResult, AppError> {
        self.begin(config).await?.run().await
    }

    /// Accept or refuse an attempt without starting it
    pub async fn begin(&self, config: &MachineConfiguration) -> Result<DeploymentAttempt<'_>, AppError> {
        let guard = self.claim(&config.id)?;

        let state = self
            .tracked
            .read()
            .await
            .get(&config.id)
            .map(|fsm| *fsm.state())
            .unwrap_or_else(|| resumable_state(config.deployment_status));
        if state == DeploymentState::Deployed {
            return Err(AppError::AlreadyDeployed(config.id.clone()));
        }

        Ok(DeploymentAttempt {
            orchestrator: self,
            config: config.clone(),
            guard,
        })
    }

    async fn run_attempt(
        &self,
        config: &MachineConfiguration,
        guard: InFlightGuard<'_>,
    ) -> Result<DeploymentResult, AppError> {
        {
            let mut tracked = self.tracked.write().await;
            let fsm = tracked
                .entry(config.id.clone())
                .or_insert_with(|| DeploymentFsm::with_state(resumable_state(config.deployment_status)));
            fsm.process(DeploymentEvent::Deploy)
                .map_err(AppError::DeployError)?;
        }

        info!("Deploying machine {} ({})", config.id, config.name);

        let result = match self.run_pipeline(config).await {
            Ok(success) => {
                info!("Machine {} deployed at {}", config.id, success.public_ip);
                DeploymentResult::Success(success)
            }
            Err(e) => {
                error!("Deployment of machine {} failed: {}", config.id, e);
                DeploymentResult::failure(e.public_message())
            }
        };

        let event = match &result {
            DeploymentResult::Success(_) => DeploymentEvent::DeploySuccess,
            DeploymentResult::Failure { error_message } => {
                DeploymentEvent::DeployFailed(error_message.clone())
            }
        };
        let mut tracked = self.tracked.write().await;
        if guard.release() {
            tracked.remove(&config.id);
            info!("Dropped tracking of machine {} deleted during deployment", config.id);
        } else if let Some(fsm) = tracked.get_mut(&config.id) {
            fsm.process(event).map_err(AppError::DeployError)?;
        }

        Ok(result)
    }

    fn claim(&self, machine_id: &str) -> Result<InFlightGuard<'_>, AppError> {
        let mut slots = lock_slots(&self.slots);
        if !slots.running.insert(machine_id.to_string()) {
            warn!("Rejected concurrent deployment of machine {}", machine_id);
            return Err(AppError::DeploymentInProgress(machine_id.to_string()));
        }
        Ok(InFlightGuard {
            slots: &self.slots,
            machine_id: machine_id.to_string(),
            released: false,
        })
    }

    async fn run_pipeline(&self, config: &MachineConfiguration) -> Result<DeploymentSuccess, AppError> {
        // 1. Workspace
        let root = Dir::new(std::path::absolute(&self.options.deployments_dir)?);
        let workspace =
            DeploymentWorkspace::create(&root, self.ids.generate(&config.id), &config.id).await?;
        info!("Workspace {} at {:?}", workspace.id(), workspace.dir().path());

        // 2. Key pair
        self.keys.ensure_key_pair(&workspace, &config.name).await?;

        // 3. Templates
        workspace.materialize(config).await?;

        // 4-5. Terraform
        let provisioned = self
            .provisioner
            .provision(workspace.dir().path(), PUBLIC_IP_OUTPUT)
            .await?;

        // 6. Bootstrap; failures are reported but do not fail the deployment
        let key_path = workspace.private_key().path().to_path_buf();
        let bootstrap_warning = match self
            .bootstrap
            .run(&provisioned.public_ip, &key_path, workspace.setup_script().path())
            .await
        {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Machine {} is reachable at {} but application bootstrap may be incomplete: {}",
                    config.id, provisioned.public_ip, e
                );
                Some(bootstrap_warning(&e))
            }
        };

        // 7. Result
        Ok(DeploymentSuccess {
            ssh_command: self.bootstrap.ssh_command_line(&provisioned.public_ip, &key_path),
            public_ip: provisioned.public_ip,
            ssh_key_name: workspace.key_name().to_string(),
            deployment_dir: workspace.dir().path().to_string_lossy().into_owned(),
            bootstrap_warning,
        })
    }

    /// Tracked state for a machine, if it has been deployed through this instance
    pub async fn status(&self, machine_id: &str) -> Option<DeploymentStatus> {
        let in_flight = self.is_in_flight(machine_id);
        let tracked = self.tracked.read().await;
        tracked.get(machine_id).map(|fsm| DeploymentStatus {
            state: *fsm.state(),
            error: fsm.error().map(str::to_string),
            attempts: fsm.attempts(),
            in_flight,
        })
    }

    pub fn is_in_flight(&self, machine_id: &str) -> bool {
        lock_slots(&self.slots).running.contains(machine_id)
    }

    /// Machine ids with an attempt currently running, sorted
    pub fn in_flight_ids(&self) -> Vec<String> {
        let slots = lock_slots(&self.slots);
        let mut ids: Vec<String> = slots.running.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Return a failed machine to pending
    pub async fn reset(&self, machine_id: &str) -> Result<DeploymentState, AppError> {
        let mut tracked = self.tracked.write().await;
        let fsm = tracked
            .get_mut(machine_id)
            .ok_or_else(|| AppError::NotFound(machine_id.to_string()))?;
        fsm.process(DeploymentEvent::Reset)
            .map_err(AppError::ValidationError)?;
        Ok(*fsm.state())
    }

    /// Drop tracking for a deleted machine. An in-flight attempt keeps
    /// running and its tracking is dropped when it ends.
    pub async fn forget(&self, machine_id: &str) {
        let mut tracked = self.tracked.write().await;
        let mut slots = lock_slots(&self.slots);
        if slots.running.contains(machine_id) {
            slots.forgotten.insert(machine_id.to_string());
        } else {
            tracked.remove(machine_id);
        }
    }
}

/// A persisted `deploying` with no attempt in flight is stale (the caller
/// marks nodes deploying before calling us, or a previous process died).
fn resumable_state(persisted: DeploymentState) -> DeploymentState {
    match persisted {
        DeploymentState::Deployed => DeploymentState::Deployed,
        DeploymentState::Failed => DeploymentState::Failed,
        DeploymentState::Pending | DeploymentState::Deploying => DeploymentState::Pending,
    }
}

fn bootstrap_warning(error: &BootstrapError) -> String {
    let step = match error {
        BootstrapError::Copy(_) => "copying the setup script failed",
        BootstrapError::Execute(_) => "running the setup script failed",
    };
    format!("Application bootstrap may be incomplete: {}", step)
}
