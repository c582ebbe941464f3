use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;
use std::path::Path;

use crate::kubernetes::model::ClusterProbe;

pub struct AlwaysFail;

#[async_trait]
impl ClusterProbe for AlwaysFail {
    async fn server_version(&self, kubeconfig: &Path) -> anyhow::Result<Info> {
        anyhow::bail!("{} does not reach an API server", kubeconfig.display())
    }
}

pub struct AlwaysSuccess;

#[async_trait]
impl ClusterProbe for AlwaysSuccess {
    async fn server_version(&self, _kubeconfig: &Path) -> anyhow::Result<Info> {
        Ok(Info {
            git_version: "v1.24.9".to_string(),
            major: "1".to_string(),
            minor: "24".to_string(),
            ..Default::default()
        })
    }
}
