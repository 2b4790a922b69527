pub fn default_service_name() -> String {
    "storefront".to_string()
}

// Coordination defaults
pub fn default_lease_duration_seconds() -> u64 {
    30
}

pub fn default_max_cas_retries() -> u32 {
    5
}

pub fn default_cas_retry_backoff_ms() -> u64 {
    20
}

pub fn default_liveness_threshold_seconds() -> u64 {
    90
}

pub fn default_heartbeat_interval_seconds() -> u64 {
    30
}

// Storage defaults
pub fn default_storage_type() -> String {
    "memory".to_string()
}

pub fn default_postgres_port() -> u16 {
    5432
}

pub fn default_ssl_mode() -> String {
    "require".to_string()
}

pub fn default_max_connections() -> u32 {
    20
}

pub fn default_connection_timeout() -> u64 {
    30
}

// Server defaults
pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    3000
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9100
}
