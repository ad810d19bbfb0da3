use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const CARRIER_SANDBOX_URL: &str = "https://sandbox.melhorenvio.com.br/api/v2";
const CARRIER_PRODUCTION_URL: &str = "https://melhorenvio.com.br/api/v2";
const DEFAULT_CARRIER_USER_AGENT: &str = "storefront-logistics (logistica@lojadebrinquedos.com.br)";
const DEFAULT_CARRIER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CANDIDATE_DELAY_MS: u64 = 500;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;
const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 30;
const DEFAULT_BACKUP_INTERVAL_MINUTES: u64 = 60;
const DEFAULT_DAILY_SYNC_TIMES: [&str; 4] = ["08:00", "12:00", "18:00", "22:00"];

/// Connection settings for the shipping carrier API
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CarrierConfig {
    /// Bearer token issued by the carrier; required by every carrier call
    #[serde(default)]
    pub token: Option<String>,

    /// Use the carrier sandbox instead of production
    #[serde(default = "default_true_bool")]
    pub sandbox: bool,

    /// User-Agent sent with every request (the carrier requires a contact address)
    #[serde(default = "default_carrier_user_agent")]
    #[validate(length(min = 1))]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_carrier_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            token: None,
            sandbox: true,
            user_agent: default_carrier_user_agent(),
            timeout_secs: default_carrier_timeout_secs(),
        }
    }
}

impl CarrierConfig {
    pub fn base_url(&self) -> &'static str {
        if self.sandbox {
            CARRIER_SANDBOX_URL
        } else {
            CARRIER_PRODUCTION_URL
        }
    }

    /// Returns the bearer token, failing when none is configured.
    pub fn bearer_token(&self) -> Result<&str, AppConfigError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppConfigError::MissingCarrierToken)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Merchant depot that receives customer returns. Every field falls back to
/// the storefront's own warehouse when unset.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct ReturnDepotConfig {
    #[validate(custom = "validate_postal_code")]
    pub postal_code: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub phone: String,
    #[validate(email)]
    pub email: String,
    /// CNPJ of the merchant
    pub document: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    #[validate(custom = "validate_state_abbr")]
    pub state_abbr: String,
}

impl Default for ReturnDepotConfig {
    fn default() -> Self {
        Self {
            postal_code: "01310100".to_string(),
            name: "Loja de Brinquedos - Devoluções".to_string(),
            phone: "11999999999".to_string(),
            email: "devolucoes@lojadebrinquedos.com.br".to_string(),
            document: "12345678000190".to_string(),
            street: "Avenida Paulista".to_string(),
            number: "1000".to_string(),
            complement: "Sala 101".to_string(),
            district: "Bela Vista".to_string(),
            city: "São Paulo".to_string(),
            state_abbr: "SP".to_string(),
        }
    }
}

/// Cadences for the carrier reconciliation job
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between two candidates of the same batch
    pub candidate_delay_ms: u64,

    /// Delay before the startup batch
    pub startup_delay_secs: u64,

    #[validate(range(min = 1))]
    pub interval_minutes: u64,

    /// Redundant backup cadence
    #[validate(range(min = 1))]
    pub backup_interval_minutes: u64,

    /// Local wall-clock times (`HH:MM`) at which a batch is triggered every day
    #[validate(custom = "validate_daily_times")]
    pub daily_times: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            candidate_delay_ms: DEFAULT_CANDIDATE_DELAY_MS,
            startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
            interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            backup_interval_minutes: DEFAULT_BACKUP_INTERVAL_MINUTES,
            daily_times: DEFAULT_DAILY_SYNC_TIMES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl SyncConfig {
    pub fn candidate_delay(&self) -> Duration {
        Duration::from_millis(self.candidate_delay_ms)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Bearer token accepted on the admin API; the API rejects every call when unset
    #[serde(default)]
    pub admin_api_token: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default)]
    pub carrier: CarrierConfig,

    #[serde(default)]
    pub return_depot: ReturnDepotConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            admin_api_token: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            carrier: CarrierConfig::default(),
            return_depot: ReturnDepotConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Validates the root and every section. Production must not talk to
    /// the carrier sandbox.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.carrier.validate()?;
        self.return_depot.validate()?;
        self.sync.validate()?;

        if self.is_production() && self.carrier.sandbox {
            let mut err = ValidationError::new("carrier_sandbox");
            err.message = Some("carrier.sandbox must be false in production".into());
            let mut errors = ValidationErrors::new();
            errors.add("carrier", err);
            return Err(errors);
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Carrier API token is not configured; set APP__CARRIER__TOKEN")]
    MissingCarrierToken,
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    8
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_carrier_user_agent() -> String {
    DEFAULT_CARRIER_USER_AGENT.to_string()
}

fn default_carrier_timeout_secs() -> u64 {
    DEFAULT_CARRIER_TIMEOUT_SECS
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_postal_code(postal_code: &str) -> Result<(), ValidationError> {
    let digits: String = postal_code.chars().filter(|c| *c != '-').collect();
    if digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("postal_code");
        err.message = Some("CEP must have 8 digits".into());
        Err(err)
    }
}

fn validate_state_abbr(state: &str) -> Result<(), ValidationError> {
    if state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("state_abbr");
        err.message = Some("UF must be a two-letter abbreviation".into());
        Err(err)
    }
}

fn validate_daily_times(times: &[String]) -> Result<(), ValidationError> {
    for time in times {
        if chrono::NaiveTime::parse_from_str(time, "%H:%M").is_err() {
            let mut err = ValidationError::new("daily_times");
            err.message = Some(format!("'{}' is not a valid HH:MM time", time).into());
            return Err(err);
        }
    }
    Ok(())
}

/// Installs the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_logistics={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, nested sections with `__`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        environment = %app_config.environment,
        carrier_sandbox = app_config.carrier.sandbox,
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
