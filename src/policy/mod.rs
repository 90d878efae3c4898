use crate::errors::EngineError;
use crate::io_models::config::{AdminConfiguration, UserConfiguration};
use crate::repository::{ConfigRepository, StoredConfig, StoredUserConfig};
use crate::unit_conversion::{parse_cpu_quantity, parse_memory_quantity};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// How long readers may observe a stale admin configuration.
pub const ADMIN_CONFIG_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedAdminConfig {
    config: AdminConfiguration,
    fetched_at: Instant,
}

/// Admin-owned global policy and tenant-owned per-user overrides. The admin
/// document round-trips as YAML; the in-process cache is reader-only soft
/// state invalidated on save.
pub struct PolicyStore {
    repo: Arc<dyn ConfigRepository>,
    cache: RwLock<Option<CachedAdminConfig>>,
    cache_ttl: Duration,
}

impl PolicyStore {
    pub fn new(repo: Arc<dyn ConfigRepository>) -> Self {
        PolicyStore {
            repo,
            cache: RwLock::new(None),
            cache_ttl: ADMIN_CONFIG_CACHE_TTL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_cache_ttl(repo: Arc<dyn ConfigRepository>, cache_ttl: Duration) -> Self {
        PolicyStore {
            repo,
            cache: RwLock::new(None),
            cache_ttl,
        }
    }

    pub async fn get_admin_configuration(&self, use_cache: bool) -> Result<AdminConfiguration, EngineError> {
        if use_cache {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.config.clone());
                }
            }
        }

        let config = match self.repo.latest_admin_config().await? {
            Some(row) => {
                let mut config: AdminConfiguration =
                    serde_yaml::from_str(&row.config_yaml).map_err(|e| EngineError::Repository {
                        raw_error_message: format!("stored admin configuration is unreadable: {e}"),
                    })?;
                config.id = row.id;
                config.name = row.name;
                config.created_at = row.created_at;
                config.updated_at = row.updated_at;
                config
            }
            None => {
                // self-healing first boot
                info!("No admin configuration found, writing the default one");
                let config = AdminConfiguration::default();
                self.persist_admin(&config).await?;
                config
            }
        };

        let mut guard = self.cache.write().await;
        *guard = Some(CachedAdminConfig {
            config: config.clone(),
            fetched_at: Instant::now(),
        });
        Ok(config)
    }

    pub async fn save_admin_configuration(&self, config: &AdminConfiguration) -> Result<(), EngineError> {
        self.persist_admin(config).await?;
        *self.cache.write().await = None;
        Ok(())
    }

    async fn persist_admin(&self, config: &AdminConfiguration) -> Result<(), EngineError> {
        let config_yaml = serde_yaml::to_string(config).map_err(|e| EngineError::Repository {
            raw_error_message: format!("cannot serialize admin configuration: {e}"),
        })?;
        self.repo
            .upsert_admin_config(StoredConfig {
                id: config.id,
                name: config.name.clone(),
                config_yaml,
                created_at: config.created_at,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Cached namespace prefix for callers that cannot await. `None` when the
    /// cache is cold, stale, or currently being written.
    pub fn cached_namespace_prefix(&self) -> Option<String> {
        let guard = self.cache.try_read().ok()?;
        let cached = guard.as_ref()?;
        if cached.fetched_at.elapsed() >= self.cache_ttl {
            return None;
        }
        Some(cached.config.cluster.lob_namespace_prefix.clone())
    }

    pub async fn create_user_configuration_from_yaml(
        &self,
        yaml: &str,
        lob_id: &str,
        team_id: &str,
        user_id: &str,
    ) -> Result<UserConfiguration, EngineError> {
        let mut config: UserConfiguration = serde_yaml::from_str(yaml)?;
        // identity is server-assigned, whatever the body claims
        config.id = Uuid::new_v4();
        config.lob_id = lob_id.to_string();
        config.team_id = team_id.to_string();
        config.user_id = user_id.to_string();
        config.created_at = Utc::now();

        let admin = self.get_admin_configuration(true).await?;
        validate_user_configuration(&config, &admin)?;

        self.repo.insert_user_config(to_stored_user_config(&config)?).await?;
        Ok(config)
    }

    pub async fn update_user_configuration(
        &self,
        config_id: Uuid,
        yaml: &str,
        lob_id: &str,
        team_id: &str,
    ) -> Result<UserConfiguration, EngineError> {
        let existing = self.owned_user_config_row(config_id, lob_id).await?;
        if existing.team_id != team_id {
            return Err(EngineError::Forbidden);
        }

        let mut config: UserConfiguration = serde_yaml::from_str(yaml)?;
        config.id = existing.id;
        config.lob_id = existing.lob_id.clone();
        config.team_id = existing.team_id.clone();
        config.user_id = existing.user_id.clone();
        config.created_at = existing.created_at;

        let admin = self.get_admin_configuration(true).await?;
        validate_user_configuration(&config, &admin)?;

        self.repo.update_user_config(to_stored_user_config(&config)?).await?;
        Ok(config)
    }

    pub async fn get_user_configuration(
        &self,
        config_id: Uuid,
        lob_id: &str,
    ) -> Result<UserConfiguration, EngineError> {
        let row = self.owned_user_config_row(config_id, lob_id).await?;
        from_stored_user_config(&row)
    }

    pub async fn list_user_configurations(
        &self,
        lob_id: &str,
        team_id: Option<&str>,
    ) -> Result<Vec<UserConfiguration>, EngineError> {
        let rows = self.repo.list_user_configs(lob_id, team_id, None).await?;
        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            match from_stored_user_config(row) {
                Ok(config) => configs.push(config),
                Err(err) => warn!("Skipping unreadable user configuration {}: {}", row.id, err),
            }
        }
        Ok(configs)
    }

    pub async fn delete_user_configuration(&self, config_id: Uuid, lob_id: &str) -> Result<(), EngineError> {
        let row = self.owned_user_config_row(config_id, lob_id).await?;
        self.repo.delete_user_config(row.id).await?;
        Ok(())
    }

    /// Cross-tenant probes get the same answer as a missing row.
    async fn owned_user_config_row(&self, config_id: Uuid, lob_id: &str) -> Result<StoredUserConfig, EngineError> {
        match self.repo.get_user_config(config_id).await? {
            Some(row) if row.lob_id == lob_id => Ok(row),
            _ => Err(EngineError::ConfigNotFound { config_id }),
        }
    }
}

fn to_stored_user_config(config: &UserConfiguration) -> Result<StoredUserConfig, EngineError> {
    let config_yaml = serde_yaml::to_string(config).map_err(|e| EngineError::Repository {
        raw_error_message: format!("cannot serialize user configuration: {e}"),
    })?;
    Ok(StoredUserConfig {
        id: config.id,
        name: config.name.clone(),
        config_yaml,
        lob_id: config.lob_id.clone(),
        team_id: config.team_id.clone(),
        user_id: config.user_id.clone(),
        created_at: config.created_at,
        updated_at: Utc::now(),
    })
}

fn from_stored_user_config(row: &StoredUserConfig) -> Result<UserConfiguration, EngineError> {
    let mut config: UserConfiguration = serde_yaml::from_str(&row.config_yaml).map_err(|e| EngineError::Repository {
        raw_error_message: format!("stored user configuration {} is unreadable: {e}", row.id),
    })?;
    // the row columns are the source of truth for identity
    config.id = row.id;
    config.lob_id = row.lob_id.clone();
    config.team_id = row.team_id.clone();
    config.user_id = row.user_id.clone();
    config.created_at = row.created_at;
    Ok(config)
}

/// User overrides never exceed the admin caps.
pub fn validate_user_configuration(
    config: &UserConfiguration,
    admin: &AdminConfiguration,
) -> Result<(), EngineError> {
    let admin_limits = &admin.resource_management.default_container_limits;

    if let Some(cpu_limit) = &config.cpu_limit {
        let requested = parse_cpu_quantity(cpu_limit).map_err(|e| EngineError::invalid_request(e.to_string()))?;
        let allowed =
            parse_cpu_quantity(&admin_limits.cpu_limit).map_err(|e| EngineError::invalid_request(e.to_string()))?;
        if requested > allowed {
            return Err(EngineError::invalid_request(format!(
                "CPU limit ({cpu_limit}) exceeds maximum allowed ({})",
                admin_limits.cpu_limit
            )));
        }
    }

    if let Some(memory_limit) = &config.memory_limit {
        let requested =
            parse_memory_quantity(memory_limit).map_err(|e| EngineError::invalid_request(e.to_string()))?;
        let allowed = parse_memory_quantity(&admin_limits.memory_limit)
            .map_err(|e| EngineError::invalid_request(e.to_string()))?;
        if requested > allowed {
            return Err(EngineError::invalid_request(format!(
                "Memory limit ({memory_limit}) exceeds maximum allowed ({})",
                admin_limits.memory_limit
            )));
        }
    }

    Ok(())
}
