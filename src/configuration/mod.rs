use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::azure::model::{ClusterName, ClusterVariant, OrchestratorType, ResourceGroupName};

pub const DEFAULT_AGENT: &str = "built-in";

/// Endpoints of the Azure cloud to talk to. Defaults to the public cloud.
#[derive(Clone, Debug, Deserialize)]
pub struct CloudSettings {
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_resource_manager")]
    pub resource_manager: String,
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_resource_manager() -> String {
    "https://management.azure.com".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            authority_host: default_authority_host(),
            resource_manager: default_resource_manager(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub credentials_file: PathBuf,
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
    #[serde(default)]
    pub cloud: CloudSettings,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_telemetry")]
    pub telemetry: bool,
}

fn default_agents() -> Vec<String> {
    vec![DEFAULT_AGENT.to_string()]
}

fn default_http_timeout_seconds() -> u64 {
    60
}

fn default_telemetry() -> bool {
    true
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Loads settings; a relative `credentials_file` is taken from the settings directory.
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<Settings> {
    let path = path.as_ref();
    let conf_file = std::fs::File::open(path)?;
    let mut settings: Settings = serde_yaml::from_reader(conf_file)?;
    if settings.credentials_file.is_relative() {
        if let Some(dir) = path.parent() {
            settings.credentials_file = dir.join(&settings.credentials_file);
        }
    }
    Ok(settings)
}

/// One deployment, as read from a request file.
#[derive(Clone, Debug, Deserialize)]
pub struct DeploymentRequest {
    pub credentials_id: String,
    pub resource_group: ResourceGroupName,
    pub cluster_name: ClusterName,
    pub variant: ClusterVariant,
    #[serde(default)]
    pub orchestrator_type: Option<OrchestratorType>,
    /// Where to put the kubeconfig of a managed cluster; defaults into the workspace.
    #[serde(default)]
    pub kubeconfig_path: Option<PathBuf>,
    #[serde(default)]
    pub verify: bool,
}

pub fn load_request<P: AsRef<Path>>(path: P) -> anyhow::Result<DeploymentRequest> {
    let conf_file = std::fs::File::open(path)?;
    Ok(serde_yaml::from_reader(conf_file)?)
}
