use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::profile::is_confined;
use domain::FiscalProfile;

use super::{Credential, SigningError};

/// Resolves the signing credential of a tenant.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, profile: &FiscalProfile) -> Result<Arc<Credential>, SigningError>;
}

struct Loaded {
    paths: (String, String),
    credential: Arc<Credential>,
}

/// Reads the PEM files named on the profile from `<root>/<tenant_id>/` and
/// keeps each tenant's credential loaded.
pub struct FileCredentialProvider {
    root: PathBuf,
    loaded: RwLock<HashMap<Uuid, Loaded>>,
}

impl FileCredentialProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Drop cached credentials, e.g. after a certificate was replaced on disk.
    pub async fn clear(&self) {
        self.loaded.write().await.clear();
    }

    async fn read(&self, tenant_id: Uuid, relative: &str) -> Result<String, SigningError> {
        let io = |reason: String| SigningError::Io {
            path: relative.to_string(),
            reason,
        };
        if !is_confined(relative) {
            return Err(io("outside the tenant certificate directory".into()));
        }

        let tenant_dir = self.root.join(tenant_id.to_string());
        let path = tokio::fs::canonicalize(tenant_dir.join(relative))
            .await
            .map_err(|e| io(e.to_string()))?;
        // symlinks must not lead out either
        if !path.starts_with(&tenant_dir) {
            return Err(io("outside the tenant certificate directory".into()));
        }
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io(e.to_string()))
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn credential(&self, profile: &FiscalProfile) -> Result<Arc<Credential>, SigningError> {
        let paths = (
            profile.certificate_path.clone(),
            profile.private_key_path.clone(),
        );
        if let Some(found) = self.loaded.read().await.get(&profile.tenant_id) {
            if found.paths == paths {
                return Ok(found.credential.clone());
            }
        }

        let cert_pem = self.read(profile.tenant_id, &paths.0).await?;
        let key_pem = self.read(profile.tenant_id, &paths.1).await?;
        let credential = Arc::new(Credential::from_pem(&cert_pem, &key_pem)?);
        tracing::info!(
            tenant_id = %profile.tenant_id,
            fingerprint = %credential.fingerprint(),
            "Fiscal certificate loaded"
        );

        self.loaded.write().await.insert(
            profile.tenant_id,
            Loaded {
                paths,
                credential: credential.clone(),
            },
        );
        Ok(credential)
    }
}

/// Same credential for every tenant.
pub struct StaticCredentialProvider(Arc<Credential>);

impl StaticCredentialProvider {
    pub fn new(credential: Arc<Credential>) -> Self {
        Self(credential)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, _profile: &FiscalProfile) -> Result<Arc<Credential>, SigningError> {
        Ok(self.0.clone())
    }
}
