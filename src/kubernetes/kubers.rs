use async_trait::async_trait;
use std::path::Path;

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::Client;
use kube_client::config::{KubeConfigOptions, Kubeconfig};
use kube_client::Config;

use crate::kubernetes::model::ClusterProbe;

pub struct KubeRsBased;

#[async_trait]
impl ClusterProbe for KubeRsBased {
    async fn server_version(&self, kubeconfig: &Path) -> anyhow::Result<Info> {
        let kubeconfig = Kubeconfig::read_from(kubeconfig)?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;
        Ok(client.apiserver_version().await?)
    }
}
