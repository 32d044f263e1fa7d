//! Per-attempt deployment workspace

use chrono::Utc;
use tracing::debug;

use crate::deploy::templates::{render_infra_declaration, render_setup_script, render_variables};
use crate::errors::AppError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::machine::MachineConfiguration;

pub const INFRA_FILE: &str = "main.tf";
pub const VARIABLES_FILE: &str = "terraform.tfvars";
pub const SETUP_SCRIPT_FILE: &str = "setup.sh";

/// Generates workspace ids of the form `deployment-<machine>-<millis>-<suffix>`.
///
/// The random suffix keeps two attempts for the same machine apart even when
/// they land on the same millisecond.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceIdGenerator;

impl WorkspaceIdGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, machine_id: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "deployment-{}-{}-{}",
            path_safe(machine_id),
            Utc::now().timestamp_millis(),
            &suffix[..8]
        )
    }
}

/// Files generated for one deployment attempt. Left on disk after the attempt.
#[derive(Debug, Clone)]
pub struct DeploymentWorkspace {
    id: String,
    dir: Dir,
    key_name: String,
}

impl DeploymentWorkspace {
    /// Create a fresh workspace directory under `root`. Fails rather than
    /// reuse an existing directory.
    pub async fn create(root: &Dir, id: String, machine_id: &str) -> Result<Self, AppError> {
        let dir = root.subdir(&id);
        dir.create_new().await?;
        debug!("Created deployment workspace {:?}", dir.path());

        Ok(Self {
            id,
            dir,
            key_name: format!("vm-key-{}", path_safe(machine_id)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn private_key(&self) -> File {
        self.dir.file(&self.key_name)
    }

    pub fn public_key(&self) -> File {
        self.dir.file(&format!("{}.pub", self.key_name))
    }

    pub fn infra_file(&self) -> File {
        self.dir.file(INFRA_FILE)
    }

    pub fn variables_file(&self) -> File {
        self.dir.file(VARIABLES_FILE)
    }

    pub fn setup_script(&self) -> File {
        self.dir.file(SETUP_SCRIPT_FILE)
    }

    /// Write the three rendered artifacts and mark the script executable
    pub async fn materialize(&self, config: &MachineConfiguration) -> Result<(), AppError> {
        let key_path = self.private_key().path().to_string_lossy().into_owned();

        self.infra_file()
            .write_string(&render_infra_declaration(config, &self.key_name, &key_path))
            .await?;
        self.variables_file()
            .write_string(&render_variables(config))
            .await?;

        let script = self.setup_script();
        script.write_string(&render_setup_script(config)).await?;
        script.set_mode(0o755).await?;
        Ok(())
    }
}

/// Restrict ids to characters safe in file names and terraform key names
fn path_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}
