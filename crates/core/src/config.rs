use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub carrier: CarrierConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CarrierConfig {
    pub base_url: String,
    pub tenant: String,
    pub client_id: SecretString,
    pub client_secret: SecretString,
    pub request_timeout_secs: u64,
    pub token_refresh_buffer_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub initial_poll_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub max_backoff_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub carrier_base_url: Option<String>,
    pub carrier_tenant: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://lineup.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            carrier: CarrierConfig {
                base_url: "https://api.carrier.example".to_string(),
                tenant: "default".to_string(),
                client_id: String::new().into(),
                client_secret: String::new().into(),
                request_timeout_secs: 30,
                token_refresh_buffer_secs: 60,
            },
            orchestrator: OrchestratorConfig {
                initial_poll_delay_ms: 2_000,
                poll_interval_ms: 3_000,
                max_poll_attempts: 10,
                max_backoff_delay_ms: 30_000,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    carrier: Option<CarrierPatch>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CarrierPatch {
    base_url: Option<String>,
    tenant: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    request_timeout_secs: Option<u64>,
    token_refresh_buffer_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    initial_poll_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    max_poll_attempts: Option<u32>,
    max_backoff_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("lineup.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(carrier) = patch.carrier {
            if let Some(base_url) = carrier.base_url {
                self.carrier.base_url = base_url;
            }
            if let Some(tenant) = carrier.tenant {
                self.carrier.tenant = tenant;
            }
            if let Some(client_id_value) = carrier.client_id {
                self.carrier.client_id = secret_value(client_id_value);
            }
            if let Some(client_secret_value) = carrier.client_secret {
                self.carrier.client_secret = secret_value(client_secret_value);
            }
            if let Some(request_timeout_secs) = carrier.request_timeout_secs {
                self.carrier.request_timeout_secs = request_timeout_secs;
            }
            if let Some(token_refresh_buffer_secs) = carrier.token_refresh_buffer_secs {
                self.carrier.token_refresh_buffer_secs = token_refresh_buffer_secs;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(initial_poll_delay_ms) = orchestrator.initial_poll_delay_ms {
                self.orchestrator.initial_poll_delay_ms = initial_poll_delay_ms;
            }
            if let Some(poll_interval_ms) = orchestrator.poll_interval_ms {
                self.orchestrator.poll_interval_ms = poll_interval_ms;
            }
            if let Some(max_poll_attempts) = orchestrator.max_poll_attempts {
                self.orchestrator.max_poll_attempts = max_poll_attempts;
            }
            if let Some(max_backoff_delay_ms) = orchestrator.max_backoff_delay_ms {
                self.orchestrator.max_backoff_delay_ms = max_backoff_delay_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LINEUP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LINEUP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LINEUP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LINEUP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LINEUP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LINEUP_CARRIER_BASE_URL") {
            self.carrier.base_url = value;
        }
        if let Some(value) = read_env("LINEUP_CARRIER_TENANT") {
            self.carrier.tenant = value;
        }
        if let Some(value) = read_env("LINEUP_CARRIER_CLIENT_ID") {
            self.carrier.client_id = secret_value(value);
        }
        if let Some(value) = read_env("LINEUP_CARRIER_CLIENT_SECRET") {
            self.carrier.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("LINEUP_CARRIER_REQUEST_TIMEOUT_SECS") {
            self.carrier.request_timeout_secs =
                parse_u64("LINEUP_CARRIER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LINEUP_CARRIER_TOKEN_REFRESH_BUFFER_SECS") {
            self.carrier.token_refresh_buffer_secs =
                parse_u64("LINEUP_CARRIER_TOKEN_REFRESH_BUFFER_SECS", &value)?;
        }

        if let Some(value) = read_env("LINEUP_ORCHESTRATOR_INITIAL_POLL_DELAY_MS") {
            self.orchestrator.initial_poll_delay_ms =
                parse_u64("LINEUP_ORCHESTRATOR_INITIAL_POLL_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("LINEUP_ORCHESTRATOR_POLL_INTERVAL_MS") {
            self.orchestrator.poll_interval_ms =
                parse_u64("LINEUP_ORCHESTRATOR_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("LINEUP_ORCHESTRATOR_MAX_POLL_ATTEMPTS") {
            self.orchestrator.max_poll_attempts =
                parse_u32("LINEUP_ORCHESTRATOR_MAX_POLL_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("LINEUP_ORCHESTRATOR_MAX_BACKOFF_DELAY_MS") {
            self.orchestrator.max_backoff_delay_ms =
                parse_u64("LINEUP_ORCHESTRATOR_MAX_BACKOFF_DELAY_MS", &value)?;
        }

        let log_level = read_env("LINEUP_LOGGING_LEVEL").or_else(|| read_env("LINEUP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LINEUP_LOGGING_FORMAT").or_else(|| read_env("LINEUP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(carrier_base_url) = overrides.carrier_base_url {
            self.carrier.base_url = carrier_base_url;
        }
        if let Some(carrier_tenant) = overrides.carrier_tenant {
            self.carrier.tenant = carrier_tenant;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_carrier(&self.carrier)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("lineup.toml"), PathBuf::from("config/lineup.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_carrier(carrier: &CarrierConfig) -> Result<(), ConfigError> {
    let base_url = carrier.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "carrier.base_url must be an http(s) URL".to_string(),
        ));
    }

    if carrier.tenant.trim().is_empty() {
        return Err(ConfigError::Validation("carrier.tenant must not be empty".to_string()));
    }

    if carrier.request_timeout_secs == 0 || carrier.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "carrier.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let id_present = !carrier.client_id.expose_secret().trim().is_empty();
    let secret_present = !carrier.client_secret.expose_secret().trim().is_empty();
    if id_present != secret_present {
        return Err(ConfigError::Validation(
            "carrier.client_id and carrier.client_secret must be configured together".to_string(),
        ));
    }

    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    if orchestrator.max_poll_attempts == 0 {
        return Err(ConfigError::Validation(
            "orchestrator.max_poll_attempts must be greater than zero".to_string(),
        ));
    }

    if orchestrator.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "orchestrator.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if orchestrator.max_backoff_delay_ms < orchestrator.poll_interval_ms {
        return Err(ConfigError::Validation(
            "orchestrator.max_backoff_delay_ms must be at least poll_interval_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
