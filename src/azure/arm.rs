use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::azure::model::{
    construct_resource_id, AzureClient, ClientFactory, ClusterName, ContainerService,
    GenericResource, OrchestratorType, ResourceGroupName, SharedAzureClient, SubscriptionId,
    CONTAINER_SERVICE_PROVIDER,
};
use crate::configuration::CloudSettings;
use crate::credentials::ServicePrincipal;

const CONTAINER_SERVICE_API_VERSION: &str = "2017-01-31";
const MANAGED_CLUSTER_API_VERSION: &str = "2017-08-31";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Talks to Azure Resource Manager over HTTPS.
pub struct ArmClientFactory {
    http: reqwest::Client,
    cloud: CloudSettings,
}

impl ArmClientFactory {
    pub fn new(cloud: CloudSettings, timeout: Duration) -> anyhow::Result<ArmClientFactory> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ArmClientFactory { http, cloud })
    }
}

#[async_trait]
impl ClientFactory for ArmClientFactory {
    async fn connect(&self, principal: &ServicePrincipal) -> anyhow::Result<SharedAzureClient> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.cloud.authority_host.trim_end_matches('/'),
            principal.tenant
        );
        let scope = format!("{}/.default", self.cloud.resource_manager.trim_end_matches('/'));
        let response = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", principal.client_id.as_str()),
                ("client_secret", principal.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "token request for credentials '{}' failed with {}: {}",
                principal.id,
                status,
                body
            );
        }
        let token: TokenResponse = response.json().await?;
        debug!(
            credentials = %principal.id,
            expires_in = ?token.expires_in,
            "acquired management token"
        );

        Ok(Arc::new(ArmClient {
            http: self.http.clone(),
            base: self.cloud.resource_manager.trim_end_matches('/').to_string(),
            token: token.access_token,
            subscription: principal.subscription_id.clone(),
        }))
    }
}

pub struct ArmClient {
    http: reqwest::Client,
    base: String,
    token: String,
    subscription: SubscriptionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerServiceBody {
    properties: ContainerServiceProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerServiceProperties {
    orchestrator_profile: OrchestratorProfile,
    #[serde(default)]
    master_profile: Option<MasterProfile>,
    #[serde(default)]
    linux_profile: Option<LinuxProfile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrchestratorProfile {
    orchestrator_type: OrchestratorType,
}

#[derive(Deserialize)]
struct MasterProfile {
    #[serde(default)]
    fqdn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinuxProfile {
    #[serde(default)]
    admin_username: String,
}

impl ArmClient {
    async fn get(&self, id: &str, api_version: &str) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}{}", self.base, id);
        debug!(%url, api_version, "GET");
        let response = self
            .http
            .get(url)
            .query(&[("api-version", api_version)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(response)
    }

    async fn fail(id: &str, response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::anyhow!("GET {} returned {}: {}", id, status, body)
    }
}

#[async_trait]
impl AzureClient for ArmClient {
    fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription
    }

    async fn container_service(
        &self,
        resource_group: &ResourceGroupName,
        name: &ClusterName,
    ) -> anyhow::Result<Option<ContainerService>> {
        let id = construct_resource_id(
            &self.subscription,
            resource_group,
            CONTAINER_SERVICE_PROVIDER,
            "containerServices",
            &name.0,
            "",
        );
        let response = self.get(&id, CONTAINER_SERVICE_API_VERSION).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::fail(&id, response).await);
        }
        let body: ContainerServiceBody = response.json().await?;
        let properties = body.properties;
        Ok(Some(ContainerService {
            orchestrator_type: properties.orchestrator_profile.orchestrator_type,
            master_fqdn: properties.master_profile.map(|m| m.fqdn).unwrap_or_default(),
            admin_username: properties
                .linux_profile
                .map(|l| l.admin_username)
                .unwrap_or_default(),
        }))
    }

    async fn generic_resource(&self, id: &str) -> anyhow::Result<GenericResource> {
        let response = self.get(id, MANAGED_CLUSTER_API_VERSION).await?;
        if !response.status().is_success() {
            return Err(Self::fail(id, response).await);
        }
        Ok(response.json().await?)
    }
}
