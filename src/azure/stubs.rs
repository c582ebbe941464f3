use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::azure::model::{
    AzureClient, ClientFactory, ClusterName, ContainerService, GenericResource,
    ResourceGroupName, SharedAzureClient, SubscriptionId,
};
use crate::credentials::ServicePrincipal;

pub fn principal() -> ServicePrincipal {
    ServicePrincipal {
        id: "sp".to_string(),
        subscription_id: SubscriptionId("sub-0000".to_string()),
        tenant: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        scope: None,
    }
}

pub struct InMemoryAzure {
    subscription: SubscriptionId,
    services: HashMap<(String, String), ContainerService>,
    resources: HashMap<String, serde_json::Value>,
    stall: bool,
    failure: Option<String>,
    pub calls: AtomicUsize,
}

impl InMemoryAzure {
    pub fn new() -> InMemoryAzure {
        InMemoryAzure {
            subscription: principal().subscription_id,
            services: HashMap::new(),
            resources: HashMap::new(),
            stall: false,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_service(mut self, rg: &str, name: &str, service: ContainerService) -> Self {
        self.services.insert((rg.to_string(), name.to_string()), service);
        self
    }

    pub fn with_resource(mut self, id: &str, properties: serde_json::Value) -> Self {
        self.resources.insert(id.to_string(), properties);
        self
    }

    /// Every call waits forever.
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    async fn enter(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AzureClient for InMemoryAzure {
    fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription
    }

    async fn container_service(
        &self,
        resource_group: &ResourceGroupName,
        name: &ClusterName,
    ) -> anyhow::Result<Option<ContainerService>> {
        self.enter().await?;
        Ok(self
            .services
            .get(&(resource_group.0.clone(), name.0.clone()))
            .cloned())
    }

    async fn generic_resource(&self, id: &str) -> anyhow::Result<GenericResource> {
        self.enter().await?;
        let properties = self
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("resource {} not found", id))?;
        Ok(GenericResource {
            id: id.to_string(),
            properties,
        })
    }
}

pub struct StubFactory {
    client: Arc<InMemoryAzure>,
    pub connects: AtomicUsize,
}

impl StubFactory {
    pub fn new(client: Arc<InMemoryAzure>) -> StubFactory {
        StubFactory {
            client,
            connects: AtomicUsize::new(0),
        }
    }

    /// Remote operations in total: token exchanges plus resource reads.
    pub fn remote_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst) + self.client.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for StubFactory {
    async fn connect(&self, _principal: &ServicePrincipal) -> anyhow::Result<SharedAzureClient> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
