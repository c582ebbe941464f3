use async_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::spawn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::azure::model::{
    ClusterName, OrchestratorType, ResourceGroupName, SharedClientFactory,
};
use crate::command::CommandState;
use crate::commands::cluster_info;
use crate::credentials::ServicePrincipal;

/// Work shipped to an agent. Plain data only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RemoteTask {
    FetchClusterInfo(ClusterInfoRequest),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterInfoRequest {
    pub principal: ServicePrincipal,
    pub resource_group: ResourceGroupName,
    pub cluster_name: ClusterName,
    pub expected_type: Option<OrchestratorType>,
}

/// What an agent sends back, including the log lines it produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub state: CommandState,
    pub orchestrator_type: Option<OrchestratorType>,
    pub fqdn: Option<String>,
    pub admin_username: Option<String>,
    pub log: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerError {
    #[error("no agent named '{0}'")]
    UnknownAgent(String),
    #[error("agent '{0}' is no longer accepting work")]
    Unavailable(String),
    #[error("agent '{0}' dropped the task without replying")]
    NoReply(String),
    #[error("remote call failed on agent '{agent}': {message}")]
    Remote { agent: String, message: String },
}

type TaskReply = Result<TaskResult, String>;

struct Request {
    task: RemoteTask,
    reply: oneshot::Sender<TaskReply>,
}

struct WorkerHandler {
    factory: SharedClientFactory,
}

impl WorkerHandler {
    async fn handle_request(&self, task: RemoteTask) -> TaskReply {
        match task {
            RemoteTask::FetchClusterInfo(request) => {
                let client = self
                    .factory
                    .connect(&request.principal)
                    .await
                    .map_err(|e| format!("{:#}", e))?;
                cluster_info::fetch_cluster_info(client.as_ref(), &request)
                    .await
                    .map_err(|e| format!("{:#}", e))
            }
        }
    }
}

pub struct Worker(pub JoinHandle<()>);

impl Worker {
    fn start_worker(
        name: String,
        factory: SharedClientFactory,
        request_queue_r: Receiver<Request>,
    ) -> Worker {
        Worker(spawn(async move {
            let state = Arc::new(WorkerHandler { factory });
            while let Ok(Request { task, reply }) = request_queue_r.recv().await {
                debug!(agent = %name, ?task, "task received");
                let local_state = state.clone();
                let agent = name.clone();
                spawn(async move {
                    let result = local_state.handle_request(task).await;
                    if reply.send(result).is_err() {
                        warn!(%agent, "caller left before the task finished");
                    }
                });
            }
            debug!(agent = %name, "request queue closed");
        }))
    }
}

/// Named agents, each draining its own request queue.
pub struct WorkerPool {
    agents: HashMap<String, Sender<Request>>,
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn start(names: &[String], factory: SharedClientFactory) -> WorkerPool {
        let mut agents = HashMap::with_capacity(names.len());
        let mut workers = Vec::with_capacity(names.len());
        for name in names {
            let (sender, receiver) = unbounded();
            workers.push(Worker::start_worker(name.clone(), factory.clone(), receiver));
            agents.insert(name.clone(), sender);
        }
        WorkerPool { agents, workers }
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Runs `task` on `agent` and waits for its single reply.
    pub async fn act(&self, agent: &str, task: RemoteTask) -> Result<TaskResult, WorkerError> {
        let queue = self
            .agents
            .get(agent)
            .ok_or_else(|| WorkerError::UnknownAgent(agent.to_string()))?;
        let (reply, response) = oneshot::channel();
        queue
            .send(Request { task, reply })
            .await
            .map_err(|_| WorkerError::Unavailable(agent.to_string()))?;

        match response.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(WorkerError::Remote {
                agent: agent.to_string(),
                message,
            }),
            Err(_) => Err(WorkerError::NoReply(agent.to_string())),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.0.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::model::ContainerService;
    use crate::azure::stubs::{principal, InMemoryAzure, StubFactory};

    fn request(name: &str) -> RemoteTask {
        RemoteTask::FetchClusterInfo(ClusterInfoRequest {
            principal: principal(),
            resource_group: ResourceGroupName("rg".to_string()),
            cluster_name: ClusterName(name.to_string()),
            expected_type: Some(OrchestratorType::Dcos),
        })
    }

    fn pool(azure: InMemoryAzure) -> WorkerPool {
        let factory = Arc::new(StubFactory::new(Arc::new(azure)));
        WorkerPool::start(&["built-in".to_string(), "linux-1".to_string()], factory)
    }

    #[tokio::test]
    async fn result_is_marshalled_back_with_log_lines() {
        let azure = InMemoryAzure::new().with_service(
            "rg",
            "acs",
            ContainerService {
                orchestrator_type: OrchestratorType::Dcos,
                master_fqdn: "acs.example".to_string(),
                admin_username: "azureuser".to_string(),
            },
        );
        let result = pool(azure).act("linux-1", request("acs")).await.unwrap();

        assert_eq!(result.state, CommandState::Success);
        assert_eq!(result.fqdn.as_deref(), Some("acs.example"));
        assert!(!result.log.is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected() {
        let err = pool(InMemoryAzure::new())
            .act("windows-9", request("acs"))
            .await
            .unwrap_err();
        assert_eq!(err, WorkerError::UnknownAgent("windows-9".to_string()));
    }

    #[tokio::test]
    async fn remote_failures_carry_the_message() {
        let err = pool(InMemoryAzure::new().failing("429 Too Many Requests"))
            .act("built-in", request("acs"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Remote { message, .. } if message.contains("429")));
    }
}
