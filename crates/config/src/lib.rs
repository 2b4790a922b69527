use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorefrontConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Name this process registers under; generated when absent
    #[serde(rename = "instance_name")]
    #[serde(default)]
    pub instance_name: Option<String>,
}

impl ServiceConfig {
    /// Configured instance name, or `<service>-<uuid>` when it is missing or
    /// still an unresolved `${..}` placeholder
    pub fn resolved_instance_name(&self) -> String {
        match &self.instance_name {
            Some(name) if !name.trim().is_empty() && !has_unresolved_env_vars(name) => name.clone(),
            _ => format!("{}-{}", self.name, uuid::Uuid::new_v4()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinationConfig {
    #[serde(rename = "lease_duration_seconds")]
    #[serde(default = "default_lease_duration_seconds")]
    pub lease_duration_seconds: u64,
    #[serde(rename = "max_cas_retries")]
    #[serde(default = "default_max_cas_retries")]
    pub max_cas_retries: u32,
    #[serde(rename = "cas_retry_backoff_ms")]
    #[serde(default = "default_cas_retry_backoff_ms")]
    pub cas_retry_backoff_ms: u64,
    #[serde(rename = "liveness_threshold_seconds")]
    #[serde(default = "default_liveness_threshold_seconds")]
    pub liveness_threshold_seconds: u64,
    #[serde(rename = "heartbeat_interval_seconds")]
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
    /// Partitions this instance serves
    #[serde(default)]
    pub datastores: Vec<DatastoreBinding>,
}

impl CoordinationConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }

    pub fn cas_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.cas_retry_backoff_ms)
    }

    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lease_duration_seconds: default_lease_duration_seconds(),
            max_cas_retries: default_max_cas_retries(),
            cas_retry_backoff_ms: default_cas_retry_backoff_ms(),
            liveness_threshold_seconds: default_liveness_threshold_seconds(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            datastores: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatastoreBinding {
    #[serde(rename = "store_id")]
    pub store_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    #[serde(default = "default_storage_type")]
    pub storage_type: String,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: default_storage_type(),
            postgres: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(rename = "ssl_mode")]
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(rename = "max_connections")]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(rename = "connection_timeout_seconds")]
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}
