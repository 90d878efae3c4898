use crate::cluster::ClusterBackend;
use crate::constants::DEFAULT_LOB_NAMESPACE_PREFIX;
use crate::errors::EngineError;
use crate::policy::PolicyStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

static DNS1123_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap());

/// Derive the namespace name for a lob: `prefix + lowercase(lob_id)`.
pub fn namespace_for_lob_with_prefix(prefix: &str, lob_id: &str) -> String {
    format!("{prefix}{}", lob_id.to_lowercase())
}

fn validate_namespace_name(name: &str) -> Result<(), EngineError> {
    if name.len() > 63 || !DNS1123_LABEL.is_match(name) {
        return Err(EngineError::invalid_request(format!(
            "derived namespace `{name}` is not a valid DNS-1123 label"
        )));
    }
    Ok(())
}

/// Maps lobs to cluster namespaces and makes sure they exist. The prefix
/// comes from the admin configuration; readers that cannot await fall back
/// to the compiled-in default instead of blocking a worker on the cached
/// config read.
pub struct NamespaceResolver {
    policy: Arc<PolicyStore>,
    backend: Arc<dyn ClusterBackend>,
}

impl NamespaceResolver {
    pub fn new(policy: Arc<PolicyStore>, backend: Arc<dyn ClusterBackend>) -> Self {
        NamespaceResolver { policy, backend }
    }

    pub async fn namespace_for_lob(&self, lob_id: &str) -> Result<String, EngineError> {
        let config = self.policy.get_admin_configuration(true).await?;
        let name = namespace_for_lob_with_prefix(&config.cluster.lob_namespace_prefix, lob_id);
        validate_namespace_name(&name)?;
        Ok(name)
    }

    /// Non-blocking variant for synchronous callers: uses the cached prefix
    /// when fresh, the compiled-in default otherwise.
    pub fn namespace_for_lob_sync(&self, lob_id: &str) -> String {
        let prefix = self
            .policy
            .cached_namespace_prefix()
            .unwrap_or_else(|| DEFAULT_LOB_NAMESPACE_PREFIX.to_string());
        namespace_for_lob_with_prefix(&prefix, lob_id)
    }

    pub async fn ensure_namespace_exists(&self, lob_id: &str, cancel: &CancellationToken) -> Result<String, EngineError> {
        let name = self.namespace_for_lob(lob_id).await?;
        self.backend.create_namespace_if_not_exists(&name, cancel).await?;
        Ok(name)
    }
}
