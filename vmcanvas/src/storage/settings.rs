//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::bootstrap::BootstrapOptions;
use crate::logs::LogLevel;

/// Service settings, read from `settings.json` in the data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Also write daily-rolling log files into the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Terraform and key generation
    #[serde(default)]
    pub provisioner: ProvisionerSettings,

    /// Remote setup over ssh
    #[serde(default)]
    pub bootstrap: BootstrapSettings,

    /// Natural-language machine selection
    #[serde(default)]
    pub selector: SelectorSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Provisioning tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerSettings {
    #[serde(default = "default_terraform_program")]
    pub terraform_program: String,

    #[serde(default = "default_keygen_program")]
    pub keygen_program: String,

    /// Upper bound for any single external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_terraform_program() -> String {
    "terraform".to_string()
}

fn default_keygen_program() -> String {
    "ssh-keygen".to_string()
}

fn default_command_timeout() -> u64 {
    30 * 60
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            terraform_program: default_terraform_program(),
            keygen_program: default_keygen_program(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl ProvisionerSettings {
    /// `0` disables the timeout
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

/// Bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSettings {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    #[serde(default = "default_remote_script_path")]
    pub remote_script_path: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,

    #[serde(default = "default_scp_program")]
    pub scp_program: String,
}

fn default_settle_delay() -> u64 {
    30
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_remote_script_path() -> String {
    "/tmp/setup.sh".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_scp_program() -> String {
    "scp".to_string()
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            ssh_user: default_ssh_user(),
            remote_script_path: default_remote_script_path(),
            connect_timeout_secs: default_connect_timeout(),
            ssh_program: default_ssh_program(),
            scp_program: default_scp_program(),
        }
    }
}

impl From<&BootstrapSettings> for BootstrapOptions {
    fn from(settings: &BootstrapSettings) -> Self {
        Self {
            settle_delay: Duration::from_secs(settings.settle_delay_secs),
            ssh_user: settings.ssh_user.clone(),
            remote_script_path: settings.remote_script_path.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            ssh_program: settings.ssh_program.clone(),
            scp_program: settings.scp_program.clone(),
        }
    }
}

/// Machine selector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSettings {
    /// Messages API base URL
    #[serde(default = "default_selector_url")]
    pub base_url: String,

    #[serde(default = "default_selector_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_selector_timeout")]
    pub timeout_secs: u64,
}

fn default_selector_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_selector_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_selector_timeout() -> u64 {
    30
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            base_url: default_selector_url(),
            model: default_selector_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_selector_timeout(),
        }
    }
}
