use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

pub const START_DEPLOY: &str = "StartDeploy";
pub const GET_INFO_FAILURE: &str = "GetInfoFailure";
pub const MESSAGE: &str = "Message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub kind: String,
    pub service_type: String,
    pub run: String,
    pub properties: Vec<(String, String)>,
}

impl TelemetryEvent {
    pub fn new(kind: &str, service_type: &str, run: &str) -> TelemetryEvent {
        TelemetryEvent {
            kind: kind.to_string(),
            service_type: service_type.to_string(),
            run: run.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.push((key.to_string(), value.into()));
        self
    }

    /// Adds `value` hashed; used for subscription, group and cluster names.
    pub fn with_hashed(self, key: &str, value: &str) -> Self {
        self.with(key, hash(value))
    }
}

/// Lowercase hex SHA-256 of `value`.
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

pub trait Telemetry {
    fn send(&self, event: TelemetryEvent) -> anyhow::Result<()>;
}

pub type SharedTelemetry = Arc<dyn Telemetry + Send + Sync + 'static>;

/// Failures are dropped; telemetry never decides a command's outcome.
pub fn emit_best_effort(telemetry: &SharedTelemetry, event: TelemetryEvent) {
    let kind = event.kind.clone();
    if let Err(err) = telemetry.send(event) {
        debug!(%kind, error = %err, "telemetry event dropped");
    }
}

pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn send(&self, event: TelemetryEvent) -> anyhow::Result<()> {
        let properties = serde_json::to_string(&event.properties)?;
        info!(
            target: "telemetry",
            kind = %event.kind,
            service_type = %event.service_type,
            run = %event.run,
            %properties,
            "telemetry event"
        );
        Ok(())
    }
}

pub struct NoTelemetry;

impl Telemetry for NoTelemetry {
    fn send(&self, _event: TelemetryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
