use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;
use std::path::Path;
use std::sync::Arc;

/// Checks that a kubeconfig reaches a live API server.
#[async_trait]
pub trait ClusterProbe {
    async fn server_version(&self, kubeconfig: &Path) -> anyhow::Result<Info>;
}

pub type SharedClusterProbe = Arc<dyn ClusterProbe + Send + Sync + 'static>;
