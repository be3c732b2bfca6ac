use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::MonthlySchedule;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub batch: BatchConfig,
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub chunk_size: u32,
    pub restart_policy: RestartPolicy,
    pub stale_run_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub cron: String,
    pub utc_offset: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What a run does when the latest run for the same key failed part-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Continue after the failed run's last committed chunk.
    Resume,
    /// Start again from the first customer.
    Rerun,
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
    pub chunk_size: Option<u32>,
    pub restart_policy: Option<RestartPolicy>,
    pub schedule_enabled: Option<bool>,
    pub schedule_cron: Option<String>,
    pub schedule_utc_offset: Option<String>,
    pub health_check_port: Option<u16>,
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

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["tierbatch.toml", "config/tierbatch.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tierbatch.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            batch: BatchConfig {
                chunk_size: 1_000,
                restart_policy: RestartPolicy::Resume,
                stale_run_secs: 3_600,
            },
            schedule: ScheduleConfig {
                enabled: true,
                cron: "0 0 1 * *".to_string(),
                utc_offset: "+00:00".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for RestartPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resume" => Ok(Self::Resume),
            "rerun" => Ok(Self::Rerun),
            other => Err(ConfigError::Validation(format!(
                "unsupported restart policy `{other}` (expected resume|rerun)"
            ))),
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The parsed trigger schedule. Only fails on configs that skipped [`AppConfig::validate`].
    pub fn monthly_schedule(&self) -> Result<MonthlySchedule, ConfigError> {
        MonthlySchedule::parse(&self.schedule.cron, &self.schedule.utc_offset)
            .map_err(|error| ConfigError::Validation(format!("schedule: {error}")))
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

        if let Some(batch) = patch.batch {
            if let Some(chunk_size) = batch.chunk_size {
                self.batch.chunk_size = chunk_size;
            }
            if let Some(restart_policy) = batch.restart_policy {
                self.batch.restart_policy = restart_policy;
            }
            if let Some(stale_run_secs) = batch.stale_run_secs {
                self.batch.stale_run_secs = stale_run_secs;
            }
        }

        if let Some(schedule) = patch.schedule {
            if let Some(enabled) = schedule.enabled {
                self.schedule.enabled = enabled;
            }
            if let Some(cron) = schedule.cron {
                self.schedule.cron = cron;
            }
            if let Some(utc_offset) = schedule.utc_offset {
                self.schedule.utc_offset = utc_offset;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("TIERBATCH_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TIERBATCH_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TIERBATCH_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TIERBATCH_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TIERBATCH_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TIERBATCH_BATCH_CHUNK_SIZE") {
            self.batch.chunk_size = parse_u32("TIERBATCH_BATCH_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = read_env("TIERBATCH_BATCH_RESTART_POLICY") {
            self.batch.restart_policy = value.parse()?;
        }
        if let Some(value) = read_env("TIERBATCH_BATCH_STALE_RUN_SECS") {
            self.batch.stale_run_secs = parse_u64("TIERBATCH_BATCH_STALE_RUN_SECS", &value)?;
        }

        if let Some(value) = read_env("TIERBATCH_SCHEDULE_ENABLED") {
            self.schedule.enabled = parse_bool("TIERBATCH_SCHEDULE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TIERBATCH_SCHEDULE_CRON") {
            self.schedule.cron = value;
        }
        if let Some(value) = read_env("TIERBATCH_SCHEDULE_UTC_OFFSET") {
            self.schedule.utc_offset = value;
        }

        if let Some(value) = read_env("TIERBATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TIERBATCH_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TIERBATCH_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TIERBATCH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TIERBATCH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TIERBATCH_LOGGING_LEVEL").or_else(|| read_env("TIERBATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TIERBATCH_LOGGING_FORMAT").or_else(|| read_env("TIERBATCH_LOG_FORMAT"));
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
        if let Some(chunk_size) = overrides.chunk_size {
            self.batch.chunk_size = chunk_size;
        }
        if let Some(restart_policy) = overrides.restart_policy {
            self.batch.restart_policy = restart_policy;
        }
        if let Some(enabled) = overrides.schedule_enabled {
            self.schedule.enabled = enabled;
        }
        if let Some(cron) = overrides.schedule_cron {
            self.schedule.cron = cron;
        }
        if let Some(utc_offset) = overrides.schedule_utc_offset {
            self.schedule.utc_offset = utc_offset;
        }
        if let Some(port) = overrides.health_check_port {
            self.server.health_check_port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_batch(&self.batch)?;
        validate_schedule(&self.schedule)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_batch(batch: &BatchConfig) -> Result<(), ConfigError> {
    if batch.chunk_size == 0 || batch.chunk_size > 10_000 {
        return Err(ConfigError::Validation(
            "batch.chunk_size must be in range 1..=10000".to_string(),
        ));
    }

    if batch.stale_run_secs < 60 || batch.stale_run_secs > 604_800 {
        return Err(ConfigError::Validation(
            "batch.stale_run_secs must be in range 60..=604800".to_string(),
        ));
    }

    Ok(())
}

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
    MonthlySchedule::parse(&schedule.cron, &schedule.utc_offset)
        .map(|_| ())
        .map_err(|error| ConfigError::Validation(format!("schedule: {error}")))
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    batch: Option<BatchPatch>,
    schedule: Option<SchedulePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchPatch {
    chunk_size: Option<u32>,
    restart_policy: Option<RestartPolicy>,
    stale_run_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePatch {
    enabled: Option<bool>,
    cron: Option<String>,
    utc_offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, RestartPolicy};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.batch.chunk_size == 1_000, "default chunk size should be 1000")?;
        ensure(
            config.batch.restart_policy == RestartPolicy::Resume,
            "default restart policy should be resume",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.monthly_schedule().is_ok(), "default schedule should parse")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TIERBATCH_DB_PATH", "from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tierbatch.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_TIERBATCH_DB_PATH}"

[batch]
chunk_size = 250
restart_policy = "rerun"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.batch.chunk_size == 250, "chunk size should come from file")?;
            ensure(
                config.batch.restart_policy == RestartPolicy::Rerun,
                "restart policy should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TIERBATCH_DB_PATH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TIERBATCH_LOG_LEVEL", "warn");
        env::set_var("TIERBATCH_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TIERBATCH_LOG_LEVEL", "TIERBATCH_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TIERBATCH_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TIERBATCH_BATCH_CHUNK_SIZE", "500");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tierbatch.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[batch]
chunk_size = 200

[schedule]
cron = "0 30 2 1 * *"
utc_offset = "+09:00"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.batch.chunk_size == 500, "env chunk size should win over file")?;
            ensure(config.schedule.utc_offset == "+09:00", "file offset should win over default")?;
            Ok(())
        })();

        clear_vars(&["TIERBATCH_DATABASE_URL", "TIERBATCH_BATCH_CHUNK_SIZE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { chunk_size: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("batch.chunk_size")
        );
        ensure(has_message, "validation failure should mention batch.chunk_size")
    }

    #[test]
    fn non_monthly_schedule_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                schedule_cron: Some("0 0 * * 1".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let rejected = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.starts_with("schedule:")
        );
        ensure(rejected, "weekly cron should fail schedule validation")
    }

    #[test]
    fn invalid_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TIERBATCH_BATCH_STALE_RUN_SECS", "soon");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["TIERBATCH_BATCH_STALE_RUN_SECS"]);

        let reported = matches!(
            result,
            Err(ConfigError::InvalidEnvOverride { ref key, .. })
                if key == "TIERBATCH_BATCH_STALE_RUN_SECS"
        );
        ensure(reported, "invalid env override should name the variable")
    }
}
