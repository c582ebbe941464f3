use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use thiserror::Error;

use crate::azure::model::SubscriptionId;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials '{0}' not found")]
    Unknown(String),
    #[error("credentials '{id}' are not available to '{owner}'")]
    Unauthorized { id: String, owner: String },
    #[error("credentials '{id}' read their secret from ${var}, which is not set")]
    MissingSecret { id: String, var: String },
}

/// Service principal used to obtain control-plane tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServicePrincipal {
    pub id: String,
    pub subscription_id: SubscriptionId,
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
    /// Owner prefix the principal was released under, if any.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Debug for ServicePrincipal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("id", &self.id)
            .field("subscription_id", &self.subscription_id)
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

pub trait CredentialStore {
    /// Resolves `id`, optionally checked against the owner requesting it.
    fn lookup(&self, id: &str, owner: Option<&str>) -> Result<ServicePrincipal, CredentialError>;
}

#[derive(Debug, Deserialize)]
pub struct CredentialEntry {
    pub id: String,
    pub subscription_id: SubscriptionId,
    pub tenant: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_env: Option<String>,
    /// Owner prefix allowed to use the entry; unscoped entries are global.
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsFile {
    pub credentials: Vec<CredentialEntry>,
}

pub struct FileCredentialStore {
    entries: HashMap<String, CredentialEntry>,
}

impl FileCredentialStore {
    pub fn new(file: CredentialsFile) -> FileCredentialStore {
        let entries = file
            .credentials
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        FileCredentialStore { entries }
    }

    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<FileCredentialStore> {
        let file = std::fs::File::open(path)?;
        Ok(FileCredentialStore::new(serde_yaml::from_reader(file)?))
    }

    fn secret_of(entry: &CredentialEntry) -> Result<String, CredentialError> {
        if let Some(secret) = &entry.client_secret {
            return Ok(secret.clone());
        }
        let var = entry
            .client_secret_env
            .clone()
            .unwrap_or_else(|| "AZURE_CLIENT_SECRET".to_string());
        std::env::var(&var).map_err(|_| CredentialError::MissingSecret {
            id: entry.id.clone(),
            var,
        })
    }
}

impl CredentialStore for FileCredentialStore {
    fn lookup(&self, id: &str, owner: Option<&str>) -> Result<ServicePrincipal, CredentialError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| CredentialError::Unknown(id.to_string()))?;

        if let Some(scope) = &entry.scope {
            let owner = owner.unwrap_or_default();
            if !owner.starts_with(scope.as_str()) {
                return Err(CredentialError::Unauthorized {
                    id: id.to_string(),
                    owner: owner.to_string(),
                });
            }
        }

        Ok(ServicePrincipal {
            id: entry.id.clone(),
            subscription_id: entry.subscription_id.clone(),
            tenant: entry.tenant.clone(),
            client_id: entry.client_id.clone(),
            client_secret: Self::secret_of(entry)?,
            scope: entry.scope.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FileCredentialStore {
        let yaml = r#"
credentials:
  - id: global
    subscription_id: sub-1
    tenant: tenant-1
    client_id: app-1
    client_secret: s3cret
  - id: team-only
    subscription_id: sub-2
    tenant: tenant-2
    client_id: app-2
    client_secret: other
    scope: team-a/
  - id: from-env
    subscription_id: sub-3
    tenant: tenant-3
    client_id: app-3
    client_secret_env: ACS_DEPLOY_TEST_SECRET_THAT_IS_NEVER_SET
"#;
        FileCredentialStore::new(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn resolves_inline_secret() {
        let principal = store().lookup("global", None).unwrap();
        assert_eq!(principal.subscription_id.0, "sub-1");
        assert_eq!(principal.client_secret, "s3cret");
        assert!(principal.scope.is_none());
        assert!(!format!("{:?}", principal).contains("s3cret"));
    }

    #[test]
    fn unknown_id_fails() {
        assert!(matches!(
            store().lookup("nope", None),
            Err(CredentialError::Unknown(id)) if id == "nope"
        ));
    }

    #[test]
    fn scoped_entry_requires_matching_owner() {
        let store = store();
        let principal = store.lookup("team-only", Some("team-a/job")).unwrap();
        assert_eq!(principal.scope.as_deref(), Some("team-a/"));
        assert!(matches!(
            store.lookup("team-only", Some("team-b/job")),
            Err(CredentialError::Unauthorized { .. })
        ));
        assert!(matches!(
            store.lookup("team-only", None),
            Err(CredentialError::Unauthorized { .. })
        ));
    }

    #[test]
    fn unset_secret_variable_is_reported() {
        assert!(matches!(
            store().lookup("from-env", None),
            Err(CredentialError::MissingSecret { var, .. })
                if var == "ACS_DEPLOY_TEST_SECRET_THAT_IS_NEVER_SET"
        ));
    }
}
