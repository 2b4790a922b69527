use crate::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("heartbeat_interval_seconds ({heartbeat}) must be below liveness_threshold_seconds ({threshold})")]
    HeartbeatNotBelowLiveness { heartbeat: u64, threshold: u64 },

    #[error("Datastore binding #{index}: {message}")]
    InvalidDatastoreBinding { index: usize, message: String },

    #[error("Storage: {message}")]
    InvalidStorage { message: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &StorefrontConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(&config.service, &mut report);
    validate_coordination(&config.coordination, &mut report);
    validate_storage(&config.storage, &mut report);
    validate_logging(&config.logging, &mut report);

    if config.metrics.enabled && config.metrics.port == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "metrics.port".to_string(),
        });
    }

    report
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }

    match &service.instance_name {
        Some(name) if has_unresolved_env_vars(name) => {
            report.add_warning(
                "service.instance_name",
                &format!("'{}' is unresolved; a generated instance name will be used", name),
            );
            report.add_default("service.instance_name", &format!("{}-<uuid>", service.name));
        }
        Some(name) if !name.trim().is_empty() => {}
        _ => {
            report.add_warning(
                "service.instance_name",
                "Not set; a generated instance name will be used",
            );
            report.add_default("service.instance_name", &format!("{}-<uuid>", service.name));
        }
    }
}

fn validate_coordination(coordination: &CoordinationConfig, report: &mut ValidationReport) {
    let positive = [
        ("coordination.lease_duration_seconds", coordination.lease_duration_seconds),
        ("coordination.max_cas_retries", u64::from(coordination.max_cas_retries)),
        ("coordination.liveness_threshold_seconds", coordination.liveness_threshold_seconds),
        ("coordination.heartbeat_interval_seconds", coordination.heartbeat_interval_seconds),
    ];
    for (field, value) in positive {
        if value == 0 {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: field.to_string(),
            });
        }
    }

    if coordination.heartbeat_interval_seconds > 0
        && coordination.heartbeat_interval_seconds >= coordination.liveness_threshold_seconds
    {
        report.add_error(ValidationError::HeartbeatNotBelowLiveness {
            heartbeat: coordination.heartbeat_interval_seconds,
            threshold: coordination.liveness_threshold_seconds,
        });
    }

    if coordination.lease_duration_seconds > 0
        && coordination.heartbeat_interval_seconds > coordination.lease_duration_seconds
    {
        report.add_warning(
            "coordination.heartbeat_interval_seconds",
            "Heartbeat interval is longer than the lease duration",
        );
    }

    if coordination.datastores.is_empty() {
        report.add_warning(
            "coordination.datastores",
            "No datastores configured; this instance will not register any replica",
        );
    }

    for (index, binding) in coordination.datastores.iter().enumerate() {
        if binding.store_id <= 0 {
            report.add_error(ValidationError::InvalidDatastoreBinding {
                index,
                message: format!("store_id must be positive, got {}", binding.store_id),
            });
        }
        if binding.name.trim().is_empty() {
            report.add_error(ValidationError::InvalidDatastoreBinding {
                index,
                message: "name must not be empty".to_string(),
            });
        }
    }
}

fn validate_storage(storage: &StorageConfig, report: &mut ValidationReport) {
    let valid_types = ["memory", "postgres"];
    if !valid_types.contains(&storage.storage_type.as_str()) {
        report.add_error(ValidationError::InvalidStorage {
            message: format!(
                "Invalid storage type '{}'. Must be one of: memory, postgres",
                storage.storage_type
            ),
        });
    }

    if storage.storage_type == "postgres" {
        if let Some(ref pg) = storage.postgres {
            validate_postgres_config(pg, report);
        } else {
            report.add_error(ValidationError::InvalidStorage {
                message: "Storage type is 'postgres' but postgres configuration is missing".to_string(),
            });
        }
    }
}

fn validate_postgres_config(pg: &PostgresConfig, report: &mut ValidationReport) {
    if pg.port == 0 {
        report.add_error(ValidationError::InvalidStorage {
            message: "port must be a positive integer".to_string(),
        });
    }

    if pg.max_connections == 0 {
        report.add_error(ValidationError::InvalidStorage {
            message: "max_connections must be a positive integer".to_string(),
        });
    }

    if pg.connection_timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidStorage {
            message: "connection_timeout_seconds must be a positive integer".to_string(),
        });
    }

    for (field, value) in [("host", &pg.host), ("user", &pg.user), ("password", &pg.password)] {
        if value.is_empty() || has_unresolved_env_vars(value) {
            report.add_error(ValidationError::InvalidEnvVar {
                var: format!("storage.postgres.{}", field),
                message: format!("postgres {} is missing or unresolved", field),
            });
        }
    }
}

fn validate_logging(logging: &LoggingConfig, report: &mut ValidationReport) {
    let valid_formats = ["pretty", "json", "compact"];
    if !valid_formats.contains(&logging.format.as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(logging.format.clone()));
    }
}
