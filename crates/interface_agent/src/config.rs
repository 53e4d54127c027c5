//! Agent configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use core_kernel::CoreError;
use domain_verification::VerificationConfig;
use infra_db::DatabaseConfig;

/// Errors raised while loading the agent configuration
#[derive(Debug, Error)]
pub enum AgentConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid agent settings: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Invalid verification settings: {0}")]
    Verification(#[from] CoreError),
}

/// Settings of the verification agent process
///
/// Read from `AGENT_`-prefixed environment variables. Nested verification
/// thresholds use a double underscore, e.g.
/// `AGENT_VERIFICATION__PRIMARY_THRESHOLD=0.8`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP host
    pub host: String,
    pub port: u16,
    #[validate(length(min = 1))]
    pub database_url: String,
    #[validate(range(min = 1, max = 50))]
    pub db_max_connections: u32,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    /// Directory evidence references are resolved against
    pub evidence_root: PathBuf,
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    #[validate(range(min = 1, max = 100))]
    pub batch_size: u32,
    pub claim_pause_ms: u64,
    #[validate(range(min = 1))]
    pub error_backoff_secs: u64,
    /// Command of the local first-tier engine
    #[validate(length(min = 1))]
    pub primary_engine: String,
    /// Command of the neural second-tier engine
    pub secondary_engine: Option<String>,
    /// Command of the budgeted cloud tier
    pub cloud_engine: Option<String>,
    pub verification: VerificationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/reimbursements".to_string(),
            db_max_connections: 5,
            log_level: "info".to_string(),
            log_json: false,
            evidence_root: PathBuf::from("uploads"),
            poll_interval_secs: 30,
            batch_size: 5,
            claim_pause_ms: 2_000,
            error_backoff_secs: 60,
            primary_engine: "ocr-tesseract".to_string(),
            secondary_engine: None,
            cloud_engine: None,
            verification: VerificationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from the environment
    ///
    /// `DATABASE_URL` and `RUST_LOG` are honoured when the prefixed
    /// variables are absent.
    pub fn from_env() -> Result<Self, AgentConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", url)?;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            builder = builder.set_default("log_level", level)?;
        }

        let config: AgentConfig = builder
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Validates the agent settings and the verification thresholds
    pub fn check(&self) -> Result<(), AgentConfigError> {
        Validate::validate(self)?;
        self.verification.validate()?;
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url).max_connections(self.db_max_connections)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn claim_pause(&self) -> Duration {
        Duration::from_millis(self.claim_pause_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}
