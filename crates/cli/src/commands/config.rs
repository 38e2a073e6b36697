use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rostergate_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Entry {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Entry {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry::new("database.url", "ROSTERGATE_DATABASE_URL", &config.database.url),
        Entry::new(
            "database.max_connections",
            "ROSTERGATE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Entry::new(
            "database.timeout_secs",
            "ROSTERGATE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Entry::new(
            "gateway.app_token",
            "ROSTERGATE_GATEWAY_APP_TOKEN",
            redact_token(config.gateway.app_token.expose_secret()),
        ),
        Entry::new(
            "gateway.bot_token",
            "ROSTERGATE_GATEWAY_BOT_TOKEN",
            redact_token(config.gateway.bot_token.expose_secret()),
        ),
        Entry::new("gateway.guild_id", "ROSTERGATE_GATEWAY_GUILD_ID", &config.gateway.guild_id),
        Entry::new(
            "gateway.landing_channel",
            "ROSTERGATE_GATEWAY_LANDING_CHANNEL",
            &config.gateway.landing_channel,
        ),
        Entry::new(
            "gateway.api_base_url",
            "ROSTERGATE_GATEWAY_API_BASE_URL",
            &config.gateway.api_base_url,
        ),
        Entry::new("roster.sheet_id", "ROSTERGATE_ROSTER_SHEET_ID", &config.roster.sheet_id),
        Entry::new("roster.range", "ROSTERGATE_ROSTER_RANGE", &config.roster.range),
        Entry::new("roster.base_url", "ROSTERGATE_ROSTER_BASE_URL", &config.roster.base_url),
        Entry::new(
            "roster.api_key",
            "ROSTERGATE_ROSTER_API_KEY",
            redact_optional(config.roster.api_key.as_ref()),
        ),
        Entry::new(
            "roster.fixed_headers",
            "ROSTERGATE_ROSTER_FIXED_HEADERS",
            config.roster.fixed_headers.join(","),
        ),
        Entry::new("mail.endpoint", "ROSTERGATE_MAIL_ENDPOINT", &config.mail.endpoint),
        Entry::new(
            "mail.api_key",
            "ROSTERGATE_MAIL_API_KEY",
            redact_optional(config.mail.api_key.as_ref()),
        ),
        Entry::new("mail.from_address", "ROSTERGATE_MAIL_FROM_ADDRESS", &config.mail.from_address),
        Entry::new(
            "verification.code_ttl_secs",
            "ROSTERGATE_VERIFICATION_CODE_TTL_SECS",
            config.verification.code_ttl_secs.to_string(),
        ),
        Entry::new(
            "verification.prompt_timeout_secs",
            "ROSTERGATE_VERIFICATION_PROMPT_TIMEOUT_SECS",
            config.verification.prompt_timeout_secs.to_string(),
        ),
        Entry::new(
            "verification.command_cooldown_secs",
            "ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS",
            config.verification.command_cooldown_secs.to_string(),
        ),
        Entry::new(
            "verification.verified_role_name",
            "ROSTERGATE_VERIFICATION_VERIFIED_ROLE_NAME",
            &config.verification.verified_role_name,
        ),
        Entry::new(
            "server.bind_address",
            "ROSTERGATE_SERVER_BIND_ADDRESS",
            &config.server.bind_address,
        ),
        Entry::new(
            "server.health_check_port",
            "ROSTERGATE_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        Entry::new("logging.level", "ROSTERGATE_LOGGING_LEVEL", &config.logging.level),
        Entry::new(
            "logging.format",
            "ROSTERGATE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("rostergate.toml"), PathBuf::from("config/rostergate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_optional(secret: Option<&SecretString>) -> String {
    secret.map_or_else(|| "<unset>".to_string(), |secret| redact_token(secret.expose_secret()))
}

/// Keeps at most a four-character prefix of a credential.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.char_indices().nth(4) {
        Some((cut, _)) if trimmed.len() > 8 => format!("{}***", &trimmed[..cut]),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        assert_eq!(redact_token("MTA5ODc2NTQzMjE.abc.def"), "MTA5***");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_inside_toml_tables() {
        let doc: toml::Value = "[gateway]\nguild_id = \"42\"\n".parse().unwrap();

        assert!(contains_path(&doc, "gateway.guild_id"));
        assert!(!contains_path(&doc, "gateway.bot_token"));
        assert!(!contains_path(&doc, "roster.sheet_id"));
    }
}
