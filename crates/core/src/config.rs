use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::roster::DEFAULT_FIXED_HEADERS;
use crate::verification::codes::{DEFAULT_NOTICE_BODY, DEFAULT_NOTICE_SUBJECT};

pub const MAX_CODE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const MAX_COMMAND_COOLDOWN_SECS: u64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub roster: RosterConfig,
    pub mail: MailConfig,
    pub verification: VerificationConfig,
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
pub struct GatewayConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub guild_id: String,
    pub landing_channel: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct RosterConfig {
    pub sheet_id: String,
    pub api_key: Option<SecretString>,
    pub range: String,
    pub base_url: String,
    pub fixed_headers: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    pub from_address: String,
    pub subject: String,
    pub body_template: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VerificationConfig {
    pub code_ttl_secs: u64,
    pub prompt_timeout_secs: u64,
    pub command_cooldown_secs: u64,
    pub verified_role_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
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
    pub gateway_app_token: Option<String>,
    pub gateway_bot_token: Option<String>,
    pub gateway_guild_id: Option<String>,
    pub roster_sheet_id: Option<String>,
    pub mail_endpoint: Option<String>,
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
                url: "sqlite://rostergate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                guild_id: String::new(),
                landing_channel: "verify-here".to_string(),
                api_base_url: "https://discord.com/api/v10".to_string(),
            },
            roster: RosterConfig {
                sheet_id: String::new(),
                api_key: None,
                range: "Sheet1".to_string(),
                base_url: "https://sheets.googleapis.com".to_string(),
                fixed_headers: DEFAULT_FIXED_HEADERS.iter().map(|h| (*h).to_string()).collect(),
                timeout_secs: 15,
            },
            mail: MailConfig {
                endpoint: String::new(),
                api_key: None,
                from_address: "verification@rostergate.local".to_string(),
                subject: DEFAULT_NOTICE_SUBJECT.to_string(),
                body_template: DEFAULT_NOTICE_BODY.to_string(),
                timeout_secs: 15,
            },
            verification: VerificationConfig {
                code_ttl_secs: 24 * 60 * 60,
                prompt_timeout_secs: 300,
                command_cooldown_secs: 10,
                verified_role_name: "Verified".to_string(),
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("rostergate.toml"));
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

        if let Some(gateway) = patch.gateway {
            if let Some(app_token) = gateway.app_token {
                self.gateway.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = gateway.bot_token {
                self.gateway.bot_token = secret_value(bot_token);
            }
            if let Some(guild_id) = gateway.guild_id {
                self.gateway.guild_id = guild_id;
            }
            if let Some(landing_channel) = gateway.landing_channel {
                self.gateway.landing_channel = landing_channel;
            }
            if let Some(api_base_url) = gateway.api_base_url {
                self.gateway.api_base_url = api_base_url;
            }
        }

        if let Some(roster) = patch.roster {
            if let Some(sheet_id) = roster.sheet_id {
                self.roster.sheet_id = sheet_id;
            }
            if let Some(api_key) = roster.api_key {
                self.roster.api_key = Some(secret_value(api_key));
            }
            if let Some(range) = roster.range {
                self.roster.range = range;
            }
            if let Some(base_url) = roster.base_url {
                self.roster.base_url = base_url;
            }
            if let Some(fixed_headers) = roster.fixed_headers {
                self.roster.fixed_headers = fixed_headers;
            }
            if let Some(timeout_secs) = roster.timeout_secs {
                self.roster.timeout_secs = timeout_secs;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(endpoint) = mail.endpoint {
                self.mail.endpoint = endpoint;
            }
            if let Some(api_key) = mail.api_key {
                self.mail.api_key = Some(secret_value(api_key));
            }
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = from_address;
            }
            if let Some(subject) = mail.subject {
                self.mail.subject = subject;
            }
            if let Some(body_template) = mail.body_template {
                self.mail.body_template = body_template;
            }
            if let Some(timeout_secs) = mail.timeout_secs {
                self.mail.timeout_secs = timeout_secs;
            }
        }

        if let Some(verification) = patch.verification {
            if let Some(code_ttl_secs) = verification.code_ttl_secs {
                self.verification.code_ttl_secs = code_ttl_secs;
            }
            if let Some(prompt_timeout_secs) = verification.prompt_timeout_secs {
                self.verification.prompt_timeout_secs = prompt_timeout_secs;
            }
            if let Some(command_cooldown_secs) = verification.command_cooldown_secs {
                self.verification.command_cooldown_secs = command_cooldown_secs;
            }
            if let Some(verified_role_name) = verification.verified_role_name {
                self.verification.verified_role_name = verified_role_name;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
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
        if let Some(value) = read_env("ROSTERGATE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ROSTERGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ROSTERGATE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROSTERGATE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ROSTERGATE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROSTERGATE_GATEWAY_APP_TOKEN") {
            self.gateway.app_token = secret_value(value);
        }
        if let Some(value) = read_env("ROSTERGATE_GATEWAY_BOT_TOKEN") {
            self.gateway.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("ROSTERGATE_GATEWAY_GUILD_ID") {
            self.gateway.guild_id = value;
        }
        if let Some(value) = read_env("ROSTERGATE_GATEWAY_LANDING_CHANNEL") {
            self.gateway.landing_channel = value;
        }
        if let Some(value) = read_env("ROSTERGATE_GATEWAY_API_BASE_URL") {
            self.gateway.api_base_url = value;
        }

        if let Some(value) = read_env("ROSTERGATE_ROSTER_SHEET_ID") {
            self.roster.sheet_id = value;
        }
        if let Some(value) = read_env("ROSTERGATE_ROSTER_API_KEY") {
            self.roster.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROSTERGATE_ROSTER_RANGE") {
            self.roster.range = value;
        }
        if let Some(value) = read_env("ROSTERGATE_ROSTER_BASE_URL") {
            self.roster.base_url = value;
        }
        if let Some(value) = read_env("ROSTERGATE_ROSTER_FIXED_HEADERS") {
            self.roster.fixed_headers = parse_list(&value);
        }
        if let Some(value) = read_env("ROSTERGATE_ROSTER_TIMEOUT_SECS") {
            self.roster.timeout_secs = parse_u64("ROSTERGATE_ROSTER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROSTERGATE_MAIL_ENDPOINT") {
            self.mail.endpoint = value;
        }
        if let Some(value) = read_env("ROSTERGATE_MAIL_API_KEY") {
            self.mail.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROSTERGATE_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }
        if let Some(value) = read_env("ROSTERGATE_MAIL_TIMEOUT_SECS") {
            self.mail.timeout_secs = parse_u64("ROSTERGATE_MAIL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROSTERGATE_VERIFICATION_CODE_TTL_SECS") {
            self.verification.code_ttl_secs =
                parse_u64("ROSTERGATE_VERIFICATION_CODE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ROSTERGATE_VERIFICATION_PROMPT_TIMEOUT_SECS") {
            self.verification.prompt_timeout_secs =
                parse_u64("ROSTERGATE_VERIFICATION_PROMPT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS") {
            self.verification.command_cooldown_secs =
                parse_u64("ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("ROSTERGATE_VERIFICATION_VERIFIED_ROLE_NAME") {
            self.verification.verified_role_name = value;
        }

        if let Some(value) = read_env("ROSTERGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROSTERGATE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("ROSTERGATE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("ROSTERGATE_LOGGING_LEVEL").or_else(|| read_env("ROSTERGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ROSTERGATE_LOGGING_FORMAT").or_else(|| read_env("ROSTERGATE_LOG_FORMAT"));
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
        if let Some(app_token) = overrides.gateway_app_token {
            self.gateway.app_token = secret_value(app_token);
        }
        if let Some(bot_token) = overrides.gateway_bot_token {
            self.gateway.bot_token = secret_value(bot_token);
        }
        if let Some(guild_id) = overrides.gateway_guild_id {
            self.gateway.guild_id = guild_id;
        }
        if let Some(sheet_id) = overrides.roster_sheet_id {
            self.roster.sheet_id = sheet_id;
        }
        if let Some(endpoint) = overrides.mail_endpoint {
            self.mail.endpoint = endpoint;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_roster(&self.roster)?;
        validate_mail(&self.mail)?;
        validate_verification(&self.verification)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rostergate.toml"), PathBuf::from("config/rostergate.toml")]
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

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.app_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.app_token is required to open the gateway event connection".to_string(),
        ));
    }

    if gateway.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.bot_token is required to manage roles and nicknames".to_string(),
        ));
    }

    if gateway.guild_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.guild_id is required (the community the bot provisions roles in)"
                .to_string(),
        ));
    }

    if gateway.landing_channel.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.landing_channel must not be empty".to_string(),
        ));
    }

    if !gateway.api_base_url.starts_with("http://") && !gateway.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "gateway.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_roster(roster: &RosterConfig) -> Result<(), ConfigError> {
    if roster.sheet_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "roster.sheet_id is required. Copy it from the spreadsheet URL (`/spreadsheets/d/<id>/`)"
                .to_string(),
        ));
    }

    if !roster.base_url.starts_with("http://") && !roster.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "roster.base_url must start with http:// or https://".to_string(),
        ));
    }

    if !roster.fixed_headers.iter().any(|header| header == "Email") {
        return Err(ConfigError::Validation(
            "roster.fixed_headers must include the `Email` column".to_string(),
        ));
    }

    if roster.timeout_secs == 0 || roster.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "roster.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "mail.endpoint is required (HTTP relay that delivers verification emails)".to_string(),
        ));
    }

    if !mail.endpoint.starts_with("http://") && !mail.endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mail.endpoint must start with http:// or https://".to_string(),
        ));
    }

    if !crate::verification::is_valid_email(&crate::verification::normalize_email(
        &mail.from_address,
    )) {
        return Err(ConfigError::Validation(format!(
            "mail.from_address `{}` is not a valid email address",
            mail.from_address
        )));
    }

    if !mail.body_template.contains("code") {
        return Err(ConfigError::Validation(
            "mail.body_template must reference the `code` variable".to_string(),
        ));
    }

    if mail.timeout_secs == 0 || mail.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mail.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_verification(verification: &VerificationConfig) -> Result<(), ConfigError> {
    if verification.code_ttl_secs == 0 || verification.code_ttl_secs > MAX_CODE_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "verification.code_ttl_secs must be in range 1..={MAX_CODE_TTL_SECS}"
        )));
    }

    if verification.command_cooldown_secs > MAX_COMMAND_COOLDOWN_SECS {
        return Err(ConfigError::Validation(format!(
            "verification.command_cooldown_secs must be at most {MAX_COMMAND_COOLDOWN_SECS}"
        )));
    }

    if verification.prompt_timeout_secs == 0 || verification.prompt_timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "verification.prompt_timeout_secs must be in range 1..=900".to_string(),
        ));
    }

    if verification.verified_role_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "verification.verified_role_name must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
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

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    roster: Option<RosterPatch>,
    mail: Option<MailPatch>,
    verification: Option<VerificationPatch>,
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
struct GatewayPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    guild_id: Option<String>,
    landing_channel: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RosterPatch {
    sheet_id: Option<String>,
    api_key: Option<String>,
    range: Option<String>,
    base_url: Option<String>,
    fixed_headers: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
    subject: Option<String>,
    body_template: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VerificationPatch {
    code_ttl_secs: Option<u64>,
    prompt_timeout_secs: Option<u64>,
    command_cooldown_secs: Option<u64>,
    verified_role_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
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

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, MAX_CODE_TTL_SECS,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("ROSTERGATE_GATEWAY_APP_TOKEN", "app-token-value"),
        ("ROSTERGATE_GATEWAY_BOT_TOKEN", "bot-token-value"),
        ("ROSTERGATE_GATEWAY_GUILD_ID", "guild-1"),
        ("ROSTERGATE_ROSTER_SHEET_ID", "sheet-1"),
        ("ROSTERGATE_MAIL_ENDPOINT", "https://mail.example.test/send"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required() {
        for (key, value) in REQUIRED_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for (key, _) in REQUIRED_VARS {
            env::remove_var(key);
        }
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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("TEST_ROSTER_API_KEY", "sheet-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rostergate.toml");
            fs::write(
                &path,
                r#"
[roster]
api_key = "${TEST_ROSTER_API_KEY}"
range = "Members!A1:Z"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.roster.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sheet-key-from-env".to_string()),
                "roster api key should be interpolated from environment",
            )?;
            ensure(config.roster.range == "Members!A1:Z", "range should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_ROSTER_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("ROSTERGATE_LOG_LEVEL", "warn");
        env::set_var("ROSTERGATE_LOG_FORMAT", "pretty");

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

        clear_vars(&["ROSTERGATE_LOG_LEVEL", "ROSTERGATE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("ROSTERGATE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ROSTERGATE_ROSTER_SHEET_ID", "sheet-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rostergate.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[roster]
sheet_id = "sheet-from-file"
fixed_headers = ["Email", "First Name", "Last Name", "Timestamp", "Pronouns"]

[verification]
code_ttl_secs = 600

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
            ensure(
                config.roster.sheet_id == "sheet-from-env",
                "env sheet id should win over file and defaults",
            )?;
            ensure(config.verification.code_ttl_secs == 600, "file code ttl should apply")?;
            ensure(
                config.roster.fixed_headers.iter().any(|header| header == "Pronouns"),
                "file fixed headers should replace the defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["ROSTERGATE_DATABASE_URL"]);
        result
    }

    #[test]
    fn defaults_use_day_long_codes_and_five_minute_prompts() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.verification.code_ttl_secs == 86_400, "codes should live 24 hours")?;
            ensure(config.verification.prompt_timeout_secs == 300, "prompts wait five minutes")?;
            ensure(config.verification.command_cooldown_secs == 10, "command cooldown is 10s")?;
            ensure(config.gateway.landing_channel == "verify-here", "default landing channel")?;
            Ok(())
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::remove_var("ROSTERGATE_ROSTER_SHEET_ID");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("roster.sheet_id")
            );
            ensure(has_message, "validation failure should mention roster.sheet_id")
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("ROSTERGATE_VERIFICATION_CODE_TTL_SECS", "one-day");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "ROSTERGATE_VERIFICATION_CODE_TTL_SECS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["ROSTERGATE_VERIFICATION_CODE_TTL_SECS"]);
        result
    }

    #[test]
    fn out_of_range_code_lifetime_and_cooldown_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("ROSTERGATE_VERIFICATION_CODE_TTL_SECS", "10000000000000");

        let result = (|| -> Result<(), String> {
            let ttl_error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("an unrepresentable code ttl should be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    ttl_error,
                    ConfigError::Validation(ref message)
                        if message.contains("verification.code_ttl_secs")
                ),
                "ttl failure should name verification.code_ttl_secs",
            )?;

            env::set_var("ROSTERGATE_VERIFICATION_CODE_TTL_SECS", MAX_CODE_TTL_SECS.to_string());
            env::set_var("ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS", "3601");
            let cooldown_error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("an hour-plus cooldown should be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    cooldown_error,
                    ConfigError::Validation(ref message)
                        if message.contains("verification.command_cooldown_secs")
                ),
                "cooldown failure should name verification.command_cooldown_secs",
            )?;

            env::set_var("ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS", "3600");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("upper bounds should be accepted: {err}"))?;
            ensure(config.verification.code_ttl_secs == MAX_CODE_TTL_SECS, "30 day ttl accepted")
        })();

        clear_vars(&[
            "ROSTERGATE_VERIFICATION_CODE_TTL_SECS",
            "ROSTERGATE_VERIFICATION_COMMAND_COOLDOWN_SECS",
        ]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("ROSTERGATE_GATEWAY_BOT_TOKEN", "bot-secret-value");
        env::set_var("ROSTERGATE_MAIL_API_KEY", "mail-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("bot-secret-value"),
                "debug output should not contain bot token",
            )?;
            ensure(
                !debug.contains("mail-secret-value"),
                "debug output should not contain mail api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["ROSTERGATE_MAIL_API_KEY"]);
        result
    }
}
