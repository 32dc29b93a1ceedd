//! Keyed configuration loader, cached once on first use behind a
//! process-wide `OnceLock` via an explicit, idempotent `load`. Built on
//! the `config` crate's layered-source builder.

use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("configuration was already initialized by an earlier call to `load`")]
    AlreadyInitialized,
}

/// One backend connection's worth of shard topology: `{vault: {tenant:
/// [{engine, host, port, database, username, password, in_memory}…]}}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShardEndpoint {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub in_memory: bool,
}

/// `vault -> tenant -> ordered shard list`. Array position defines shard
/// order and must not be reordered across deploys.
pub type DatabaseTopology = std::collections::HashMap<String, std::collections::HashMap<String, Vec<ShardEndpoint>>>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    pub environment: String,
    pub communication_certificate: String,
    pub communication_key: String,
    pub communication_secret: String,
    pub database: DatabaseTopology,
    pub storage_bucket: String,
    pub storage_provider: String,
    pub storage_credentials: String,
}

impl Settings {
    /// `environment == "production"` disables non-production affordances
    /// such as the `Time-Now` header override.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Loads configuration from `path` (if given) layered under environment
/// variables prefixed `WARD_` (double underscore as the key separator,
/// e.g. `WARD_DATABASE__VAULT__TENANT`), then caches it for the life of
/// the process. Idempotent: a second call with an already-initialized
/// cache returns the cached value rather than erroring.
pub fn load(path: Option<&str>) -> Result<&'static Settings, ConfigError> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder = builder.add_source(config::Environment::with_prefix("WARD").separator("__"));

    let settings: Settings = builder.build()?.try_deserialize()?;
    Ok(SETTINGS.get_or_init(|| settings))
}

/// The cached settings, if [`load`] has already run.
pub fn get() -> Option<&'static Settings> {
    SETTINGS.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_production_checks_the_environment_tag() {
        let settings = Settings {
            environment: "production".to_string(),
            communication_certificate: String::new(),
            communication_key: String::new(),
            communication_secret: String::new(),
            database: Default::default(),
            storage_bucket: String::new(),
            storage_provider: String::new(),
            storage_credentials: String::new(),
        };
        assert!(settings.is_production());

        let settings = Settings { environment: "staging".to_string(), ..settings };
        assert!(!settings.is_production());
    }

    #[test]
    fn shard_topology_preserves_array_order_through_json() {
        let json = serde_json::json!({
            "vault-a": {
                "tenant-1": [
                    {"engine": "postgres", "host": "h1", "port": 5432, "database": "d", "username": "u", "password": "p"},
                    {"engine": "postgres", "host": "h2", "port": 5432, "database": "d", "username": "u", "password": "p"}
                ]
            }
        });
        let topology: DatabaseTopology = serde_json::from_value(json).unwrap();
        let shards = &topology["vault-a"]["tenant-1"];
        assert_eq!(shards[0].host, "h1");
        assert_eq!(shards[1].host, "h2");
    }
}
