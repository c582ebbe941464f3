use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::azure::model::{
    construct_resource_id, AzureClient, ClusterName, ResourceGroupName, SharedClientFactory,
    CONTAINER_SERVICE_PROVIDER, MANAGED_CLUSTER_RESOURCE_TYPE,
};
use crate::command::{guard, Command, CommandOutcome, Interrupted, JobContext};
use crate::credentials::CredentialStore;
use crate::extensions::option::{BlankExt, OptionExt};

const KUBECONFIG_PROPERTY: &str = "kubeConfig";

#[derive(Debug, Error)]
pub enum KubeconfigCause {
    #[error("property 'kubeConfig' is missing")]
    Missing,
    #[error("property 'kubeConfig' is blank")]
    Blank,
    #[error("property 'kubeConfig' is not a string")]
    NotAString,
    #[error("property 'kubeConfig' is not valid base64")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("failed to get kubeconfig")]
    FailedToGet(#[source] KubeconfigCause),
    #[error("failed to write kubeconfig to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<KubeconfigCause> for KubeconfigError {
    fn from(cause: KubeconfigCause) -> Self {
        KubeconfigError::FailedToGet(cause)
    }
}

#[derive(Clone, Debug)]
pub struct KubeconfigInput {
    pub credentials_id: String,
    pub resource_group: ResourceGroupName,
    pub cluster_name: ClusterName,
    pub destination: PathBuf,
}

/// Id of the admin access profile of a managed cluster.
pub fn access_profile_id(
    client: &(dyn AzureClient + Send + Sync),
    resource_group: &ResourceGroupName,
    cluster_name: &ClusterName,
) -> String {
    construct_resource_id(
        client.subscription_id(),
        resource_group,
        CONTAINER_SERVICE_PROVIDER,
        "accessProfiles",
        "clusterAdmin",
        &format!("{}/{}", MANAGED_CLUSTER_RESOURCE_TYPE, cluster_name),
    )
}

/// Decodes the `kubeConfig` entry of an access profile property bag.
pub fn extract_kubeconfig(properties: &serde_json::Value) -> Result<Vec<u8>, KubeconfigError> {
    let value = properties
        .get(KUBECONFIG_PROPERTY)
        .filter(|v| !v.is_null())
        .to_result(|| KubeconfigCause::Missing)?;
    let encoded = value
        .as_str()
        .to_result(|| KubeconfigCause::NotAString)?
        .non_blank()
        .to_result(|| KubeconfigCause::Blank)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(KubeconfigCause::from)?;
    Ok(decoded)
}

/// Writes `content` next to `destination` and renames it into place. The partial
/// file is removed when any step fails.
pub fn write_kubeconfig(destination: &Path, content: &[u8]) -> Result<(), KubeconfigError> {
    let write_err = |source: io::Error| KubeconfigError::Write {
        path: destination.to_path_buf(),
        source,
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut partial_name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("kubeconfig"));
    partial_name.push(".partial");
    let partial = destination.with_file_name(partial_name);

    let written = (|| -> io::Result<()> {
        let mut file = fs::File::create(&partial)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial, destination)
    })();

    if let Err(source) = written {
        let _ = fs::remove_file(&partial);
        return Err(write_err(source));
    }
    Ok(())
}

pub async fn prepare_kubeconfig(
    client: &(dyn AzureClient + Send + Sync),
    resource_group: &ResourceGroupName,
    cluster_name: &ClusterName,
    destination: &Path,
) -> anyhow::Result<()> {
    let id = access_profile_id(client, resource_group, cluster_name);
    let resource = client.generic_resource(&id).await?;
    let kubeconfig = extract_kubeconfig(&resource.properties)?;
    write_kubeconfig(destination, &kubeconfig)?;
    Ok(())
}

/// Fetches the admin kubeconfig of an AKS cluster into a file.
pub struct KubeconfigProvisioner {
    credentials: Arc<dyn CredentialStore + Send + Sync>,
    factory: SharedClientFactory,
}

impl KubeconfigProvisioner {
    pub fn new(
        credentials: Arc<dyn CredentialStore + Send + Sync>,
        factory: SharedClientFactory,
    ) -> KubeconfigProvisioner {
        KubeconfigProvisioner {
            credentials,
            factory,
        }
    }

    async fn provision(
        &self,
        input: &KubeconfigInput,
        ctx: &JobContext,
    ) -> anyhow::Result<CommandOutcome<PathBuf>> {
        let principal = self
            .credentials
            .lookup(&input.credentials_id, ctx.owner.as_deref())?;
        let client = self.factory.connect(&principal).await?;
        ctx.log.status(&format!(
            "Fetching kubeconfig of cluster '{}'",
            input.cluster_name
        ));
        prepare_kubeconfig(
            client.as_ref(),
            &input.resource_group,
            &input.cluster_name,
            &input.destination,
        )
        .await?;
        ctx.log.status(&format!(
            "Kubeconfig written to {}",
            input.destination.display()
        ));
        Ok(CommandOutcome::success(input.destination.clone()))
    }
}

#[async_trait]
impl Command for KubeconfigProvisioner {
    type Input = KubeconfigInput;
    type Output = PathBuf;

    async fn execute(
        &self,
        input: &KubeconfigInput,
        ctx: &JobContext,
    ) -> Result<CommandOutcome<PathBuf>, Interrupted> {
        guard(ctx, self.provision(input, ctx), |_| {}).await
    }
}
