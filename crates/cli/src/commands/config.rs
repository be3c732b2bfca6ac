use std::env;
use std::fs;
use std::path::Path;

use tierbatch_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries = [
        ("database.url", redact_url(&config.database.url), &["TIERBATCH_DATABASE_URL"][..]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["TIERBATCH_DATABASE_MAX_CONNECTIONS"][..],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["TIERBATCH_DATABASE_TIMEOUT_SECS"][..],
        ),
        (
            "batch.chunk_size",
            config.batch.chunk_size.to_string(),
            &["TIERBATCH_BATCH_CHUNK_SIZE"][..],
        ),
        (
            "batch.restart_policy",
            format!("{:?}", config.batch.restart_policy).to_lowercase(),
            &["TIERBATCH_BATCH_RESTART_POLICY"][..],
        ),
        (
            "batch.stale_run_secs",
            config.batch.stale_run_secs.to_string(),
            &["TIERBATCH_BATCH_STALE_RUN_SECS"][..],
        ),
        (
            "schedule.enabled",
            config.schedule.enabled.to_string(),
            &["TIERBATCH_SCHEDULE_ENABLED"][..],
        ),
        ("schedule.cron", config.schedule.cron.clone(), &["TIERBATCH_SCHEDULE_CRON"][..]),
        (
            "schedule.utc_offset",
            config.schedule.utc_offset.clone(),
            &["TIERBATCH_SCHEDULE_UTC_OFFSET"][..],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["TIERBATCH_SERVER_BIND_ADDRESS"][..],
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["TIERBATCH_SERVER_HEALTH_CHECK_PORT"][..],
        ),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["TIERBATCH_SERVER_GRACEFUL_SHUTDOWN_SECS"][..],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["TIERBATCH_LOGGING_LEVEL", "TIERBATCH_LOG_LEVEL"][..],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["TIERBATCH_LOGGING_FORMAT", "TIERBATCH_LOG_FORMAT"][..],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries {
        lines.push(render_line(key, &value, source(key, env_keys)));
    }
    if let Ok(schedule) = config.monthly_schedule() {
        lines.push(format!("- schedule (parsed) = {schedule}"));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Hides credentials embedded in a database URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source, redact_url};

    #[test]
    fn nested_keys_are_found_in_file_doc() {
        let doc: toml::Value = "[batch]\nchunk_size = 500\n".parse().expect("toml");

        assert!(contains_path(&doc, "batch.chunk_size"));
        assert!(!contains_path(&doc, "batch.restart_policy"));
        assert_eq!(
            field_source("batch.chunk_size", &["TIERBATCH_TEST_UNSET_KEY"], Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("schedule.cron", &[], Some(&doc), None), "default");
    }

    #[test]
    fn credentials_are_redacted_from_urls() {
        assert_eq!(redact_url("postgres://user:secret@db/tiers"), "postgres://***@db/tiers");
        assert_eq!(redact_url("sqlite://tierbatch.db"), "sqlite://tierbatch.db");
    }
}
