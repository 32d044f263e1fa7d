//! Deployment result models

use openapi_server::models::DeploymentResponse;
use serde::{Deserialize, Serialize};

/// Connection details of a successfully deployed machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSuccess {
    pub public_ip: String,
    pub ssh_key_name: String,
    pub deployment_dir: String,
    pub ssh_command: String,

    /// Set when the host is up but the setup script did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_warning: Option<String>,
}

/// Outcome of one `deploy` call. Either every success field is present or an
/// error message is; never a mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DeploymentResult {
    Success(DeploymentSuccess),
    Failure {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl DeploymentResult {
    pub fn failure(message: impl Into<String>) -> Self {
        let mut error_message = message.into();
        if error_message.trim().is_empty() {
            error_message = "Deployment failed".to_string();
        }
        DeploymentResult::Failure { error_message }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentResult::Success(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            DeploymentResult::Success(_) => None,
            DeploymentResult::Failure { error_message } => Some(error_message),
        }
    }

    /// Wire shape for the deploy endpoint
    pub fn into_response(self, vm_id: impl Into<String>) -> DeploymentResponse {
        let vm_id = vm_id.into();
        match self {
            DeploymentResult::Success(s) => DeploymentResponse {
                success: true,
                vm_id,
                public_ip: Some(s.public_ip),
                ssh_key_name: Some(s.ssh_key_name),
                deployment_dir: Some(s.deployment_dir),
                ssh_command: Some(s.ssh_command),
                warning: s.bootstrap_warning,
                error: None,
            },
            DeploymentResult::Failure { error_message } => DeploymentResponse {
                success: false,
                vm_id,
                error: Some(error_message),
                ..Default::default()
            },
        }
    }
}
