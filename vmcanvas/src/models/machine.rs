//! Machine configuration models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentState;
use crate::errors::AppError;

/// Supported deployment regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "us-east-1")]
    UsEast1,
    #[serde(rename = "us-east-2")]
    UsEast2,
    #[serde(rename = "us-west-1")]
    UsWest1,
    #[serde(rename = "us-west-2")]
    UsWest2,
    #[serde(rename = "eu-west-1")]
    EuWest1,
    #[serde(rename = "eu-central-1")]
    EuCentral1,
    #[serde(rename = "ap-northeast-1")]
    ApNortheast1,
    #[serde(rename = "ap-southeast-1")]
    ApSoutheast1,
    #[serde(rename = "ap-southeast-2")]
    ApSoutheast2,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::UsEast1,
        Region::UsEast2,
        Region::UsWest1,
        Region::UsWest2,
        Region::EuWest1,
        Region::EuCentral1,
        Region::ApNortheast1,
        Region::ApSoutheast1,
        Region::ApSoutheast2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::EuWest1 => "eu-west-1",
            Region::EuCentral1 => "eu-central-1",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApSoutheast2 => "ap-southeast-2",
        }
    }

    /// Human-readable city name
    pub fn display_name(&self) -> &'static str {
        match self {
            Region::UsEast1 => "Virginia",
            Region::UsEast2 => "Ohio",
            Region::UsWest1 => "San Francisco",
            Region::UsWest2 => "Oregon",
            Region::EuWest1 => "Ireland",
            Region::EuCentral1 => "Frankfurt",
            Region::ApNortheast1 => "Tokyo",
            Region::ApSoutheast1 => "Singapore",
            Region::ApSoutheast2 => "Sydney",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unsupported region: {}", s))
    }
}

/// Supported instance capacity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceSize {
    #[serde(rename = "t2.micro")]
    T2Micro,
    #[serde(rename = "t2.small")]
    T2Small,
    #[serde(rename = "t2.medium")]
    T2Medium,
    #[serde(rename = "t3.micro")]
    T3Micro,
    #[serde(rename = "t3.small")]
    T3Small,
    #[serde(rename = "t3.medium")]
    T3Medium,
    #[serde(rename = "t3.large")]
    T3Large,
    #[serde(rename = "m5.large")]
    M5Large,
    #[serde(rename = "m5.xlarge")]
    M5Xlarge,
    #[serde(rename = "c5.large")]
    C5Large,
    #[serde(rename = "c5.xlarge")]
    C5Xlarge,
}

impl InstanceSize {
    pub const ALL: [InstanceSize; 11] = [
        InstanceSize::T2Micro,
        InstanceSize::T2Small,
        InstanceSize::T2Medium,
        InstanceSize::T3Micro,
        InstanceSize::T3Small,
        InstanceSize::T3Medium,
        InstanceSize::T3Large,
        InstanceSize::M5Large,
        InstanceSize::M5Xlarge,
        InstanceSize::C5Large,
        InstanceSize::C5Xlarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::T2Micro => "t2.micro",
            InstanceSize::T2Small => "t2.small",
            InstanceSize::T2Medium => "t2.medium",
            InstanceSize::T3Micro => "t3.micro",
            InstanceSize::T3Small => "t3.small",
            InstanceSize::T3Medium => "t3.medium",
            InstanceSize::T3Large => "t3.large",
            InstanceSize::M5Large => "m5.large",
            InstanceSize::M5Xlarge => "m5.xlarge",
            InstanceSize::C5Large => "c5.large",
            InstanceSize::C5Xlarge => "c5.xlarge",
        }
    }
}

impl fmt::Display for InstanceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Software bundle installed by the bootstrap script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Application {
    #[serde(rename = "vscode")]
    Vscode,
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "slate")]
    Slate,
    #[default]
    #[serde(rename = "none")]
    None,
}

impl Application {
    pub const ALL: [Application; 4] = [
        Application::Vscode,
        Application::ClaudeCode,
        Application::Slate,
        Application::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Application::Vscode => "vscode",
            Application::ClaudeCode => "claude-code",
            Application::Slate => "slate",
            Application::None => "none",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A machine node as stored and deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfiguration {
    pub id: String,
    pub name: String,
    pub region: Region,
    pub instance_size: InstanceSize,
    #[serde(default)]
    pub application: Application,
    #[serde(default)]
    pub is_deployed: bool,
    #[serde(default)]
    pub deployment_status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_command: Option<String>,
}

impl MachineConfiguration {
    /// Create a fresh, undeployed machine
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        region: Region,
        instance_size: InstanceSize,
        application: Application,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region,
            instance_size,
            application,
            is_deployed: false,
            deployment_status: DeploymentState::Pending,
            public_ip: None,
            ssh_key_name: None,
            deployment_dir: None,
            ssh_command: None,
        }
    }

    /// Merge the provided fields, leaving the rest untouched.
    ///
    /// Status changes must follow the deployment state machine and the merged
    /// record must keep `is_deployed` consistent with the status.
    pub fn apply(&mut self, update: MachineUpdate) -> Result<(), AppError> {
        let mut merged = self.clone();

        if let Some(name) = update.name {
            merged.name = name;
        }
        if let Some(region) = update.region {
            merged.region = region;
        }
        if let Some(instance_size) = update.instance_size {
            merged.instance_size = instance_size;
        }
        if let Some(application) = update.application {
            merged.application = application;
        }
        if let Some(is_deployed) = update.is_deployed {
            merged.is_deployed = is_deployed;
        }
        if let Some(status) = update.deployment_status {
            if status != self.deployment_status && !self.deployment_status.can_transition_to(&status) {
                return Err(AppError::ValidationError(format!(
                    "Invalid status transition: {} -> {}",
                    self.deployment_status, status
                )));
            }
            merged.deployment_status = status;
        }
        if update.public_ip.is_some() {
            merged.public_ip = update.public_ip;
        }
        if update.ssh_key_name.is_some() {
            merged.ssh_key_name = update.ssh_key_name;
        }
        if update.deployment_dir.is_some() {
            merged.deployment_dir = update.deployment_dir;
        }
        if update.ssh_command.is_some() {
            merged.ssh_command = update.ssh_command;
        }

        merged.check_invariants()?;
        *self = merged;
        Ok(())
    }

    /// `is_deployed` implies a deployed status and a known address
    pub fn check_invariants(&self) -> Result<(), AppError> {
        if self.is_deployed
            && (self.deployment_status != DeploymentState::Deployed || self.public_ip.is_none())
        {
            return Err(AppError::ValidationError(
                "isDeployed requires deploymentStatus=deployed and a publicIp".to_string(),
            ));
        }
        Ok(())
    }
}

/// Incoming record for `create`; every field optional so missing ones can be
/// reported as a validation error instead of a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMachine {
    pub id: Option<String>,
    pub name: Option<String>,
    pub region: Option<Region>,
    pub instance_size: Option<InstanceSize>,
    pub application: Option<Application>,
    pub is_deployed: Option<bool>,
    pub deployment_status: Option<DeploymentState>,
    pub public_ip: Option<String>,
    pub ssh_key_name: Option<String>,
    pub deployment_dir: Option<String>,
    pub ssh_command: Option<String>,
}

impl NewMachine {
    /// Check required fields (`id`, `name`, `region`, `instanceSize`)
    pub fn validate(self) -> Result<MachineConfiguration, AppError> {
        let mut missing = Vec::new();
        let id = self.id.filter(|s| !s.trim().is_empty());
        let name = self.name.filter(|s| !s.trim().is_empty());
        if id.is_none() {
            missing.push("id");
        }
        if name.is_none() {
            missing.push("name");
        }
        if self.region.is_none() {
            missing.push("region");
        }
        if self.instance_size.is_none() {
            missing.push("instanceSize");
        }

        match (id, name, self.region, self.instance_size) {
            (Some(id), Some(name), Some(region), Some(instance_size)) => {
                let machine = MachineConfiguration {
                    id,
                    name,
                    region,
                    instance_size,
                    application: self.application.unwrap_or_default(),
                    is_deployed: self.is_deployed.unwrap_or(false),
                    deployment_status: self.deployment_status.unwrap_or_default(),
                    public_ip: self.public_ip,
                    ssh_key_name: self.ssh_key_name,
                    deployment_dir: self.deployment_dir,
                    ssh_command: self.ssh_command,
                };
                machine.check_invariants()?;
                Ok(machine)
            }
            _ => Err(AppError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Partial update; absent fields are left untouched. `id` is immutable and
/// therefore not part of the update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineUpdate {
    pub name: Option<String>,
    pub region: Option<Region>,
    pub instance_size: Option<InstanceSize>,
    pub application: Option<Application>,
    pub is_deployed: Option<bool>,
    pub deployment_status: Option<DeploymentState>,
    pub public_ip: Option<String>,
    pub ssh_key_name: Option<String>,
    pub deployment_dir: Option<String>,
    pub ssh_command: Option<String>,
}
