use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub twilio: TwilioConfig,
    pub whatsapp: WhatsappConfig,
    pub dialog: DialogConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Externally reachable base URL, used for Twilio signature computation
    /// and for the links under which rendered documents are served.
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct WhatsappConfig {
    pub enabled: bool,
    pub phone_number_id: String,
    pub access_token: SecretString,
    pub verify_token: SecretString,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct DialogConfig {
    /// Country code a leading `0` expands to during phone normalization.
    pub default_country_code: String,
    pub trial_days: u32,
}

#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub template_dir: String,
    pub output_dir: String,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub public_base_url: Option<String>,
    pub twilio_enabled: Option<bool>,
    pub twilio_auth_token: Option<String>,
    pub whatsapp_enabled: Option<bool>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub render_output_dir: Option<String>,
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
                url: "sqlite://karani.db".to_owned(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_owned(),
                port: 8080,
                public_base_url: "http://127.0.0.1:8080".to_owned(),
            },
            twilio: TwilioConfig {
                enabled: false,
                account_sid: String::new(),
                auth_token: String::new().into(),
                from_number: String::new(),
                api_base: "https://api.twilio.com".to_owned(),
            },
            whatsapp: WhatsappConfig {
                enabled: false,
                phone_number_id: String::new(),
                access_token: String::new().into(),
                verify_token: String::new().into(),
                api_base: "https://graph.facebook.com/v19.0".to_owned(),
            },
            dialog: DialogConfig { default_country_code: "254".to_owned(), trial_days: 14 },
            render: RenderConfig {
                template_dir: "templates".to_owned(),
                output_dir: "var/documents".to_owned(),
            },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("karani.toml"));
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = public_base_url;
            }
        }

        if let Some(twilio) = patch.twilio {
            if let Some(enabled) = twilio.enabled {
                self.twilio.enabled = enabled;
            }
            if let Some(account_sid) = twilio.account_sid {
                self.twilio.account_sid = account_sid;
            }
            if let Some(auth_token_value) = twilio.auth_token {
                self.twilio.auth_token = secret_value(auth_token_value);
            }
            if let Some(from_number) = twilio.from_number {
                self.twilio.from_number = from_number;
            }
            if let Some(api_base) = twilio.api_base {
                self.twilio.api_base = api_base;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(enabled) = whatsapp.enabled {
                self.whatsapp.enabled = enabled;
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(access_token_value) = whatsapp.access_token {
                self.whatsapp.access_token = secret_value(access_token_value);
            }
            if let Some(verify_token_value) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token_value);
            }
            if let Some(api_base) = whatsapp.api_base {
                self.whatsapp.api_base = api_base;
            }
        }

        if let Some(dialog) = patch.dialog {
            if let Some(default_country_code) = dialog.default_country_code {
                self.dialog.default_country_code = default_country_code;
            }
            if let Some(trial_days) = dialog.trial_days {
                self.dialog.trial_days = trial_days;
            }
        }

        if let Some(render) = patch.render {
            if let Some(template_dir) = render.template_dir {
                self.render.template_dir = template_dir;
            }
            if let Some(output_dir) = render.output_dir {
                self.render.output_dir = output_dir;
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
        if let Some(value) = read_env("KARANI_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KARANI_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("KARANI_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("KARANI_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("KARANI_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KARANI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KARANI_SERVER_PORT") {
            self.server.port = parse_u16("KARANI_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("KARANI_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = value;
        }

        if let Some(value) = read_env("KARANI_TWILIO_ENABLED") {
            self.twilio.enabled = parse_bool("KARANI_TWILIO_ENABLED", &value)?;
        }
        if let Some(value) = read_env("KARANI_TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = value;
        }
        if let Some(value) = read_env("KARANI_TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("KARANI_TWILIO_FROM_NUMBER") {
            self.twilio.from_number = value;
        }

        if let Some(value) = read_env("KARANI_WHATSAPP_ENABLED") {
            self.whatsapp.enabled = parse_bool("KARANI_WHATSAPP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("KARANI_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("KARANI_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = secret_value(value);
        }
        if let Some(value) = read_env("KARANI_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }

        if let Some(value) = read_env("KARANI_DIALOG_COUNTRY_CODE") {
            self.dialog.default_country_code = value;
        }
        if let Some(value) = read_env("KARANI_DIALOG_TRIAL_DAYS") {
            self.dialog.trial_days = parse_u32("KARANI_DIALOG_TRIAL_DAYS", &value)?;
        }

        if let Some(value) = read_env("KARANI_RENDER_TEMPLATE_DIR") {
            self.render.template_dir = value;
        }
        if let Some(value) = read_env("KARANI_RENDER_OUTPUT_DIR") {
            self.render.output_dir = value;
        }

        let log_level = read_env("KARANI_LOGGING_LEVEL").or_else(|| read_env("KARANI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KARANI_LOGGING_FORMAT").or_else(|| read_env("KARANI_LOG_FORMAT"));
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
        if let Some(public_base_url) = overrides.public_base_url {
            self.server.public_base_url = public_base_url;
        }
        if let Some(enabled) = overrides.twilio_enabled {
            self.twilio.enabled = enabled;
        }
        if let Some(auth_token) = overrides.twilio_auth_token {
            self.twilio.auth_token = secret_value(auth_token);
        }
        if let Some(enabled) = overrides.whatsapp_enabled {
            self.whatsapp.enabled = enabled;
        }
        if let Some(phone_number_id) = overrides.whatsapp_phone_number_id {
            self.whatsapp.phone_number_id = phone_number_id;
        }
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = secret_value(access_token);
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
        if let Some(output_dir) = overrides.render_output_dir {
            self.render.output_dir = output_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_twilio(&self.twilio)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_dialog(&self.dialog)?;
        validate_logging(&self.logging)?;

        if !self.twilio.enabled && !self.whatsapp.enabled {
            return Err(ConfigError::Validation(
                "no transport is enabled; set twilio.enabled or whatsapp.enabled".to_owned(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("karani.toml"), PathBuf::from("config/karani.toml")]
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
                .to_owned(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_owned(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_owned(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_owned()));
    }

    let base = server.public_base_url.trim();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "server.public_base_url must start with http:// or https://".to_owned(),
        ));
    }

    Ok(())
}

fn validate_twilio(twilio: &TwilioConfig) -> Result<(), ConfigError> {
    if !twilio.enabled {
        return Ok(());
    }

    if !twilio.account_sid.starts_with("AC") {
        return Err(ConfigError::Validation(
            "twilio.account_sid must start with `AC`. Get it from the Twilio console".to_owned(),
        ));
    }
    if twilio.auth_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "twilio.auth_token is required when twilio.enabled is true".to_owned(),
        ));
    }
    if twilio.from_number.trim().is_empty() {
        return Err(ConfigError::Validation(
            "twilio.from_number is required when twilio.enabled is true".to_owned(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsappConfig) -> Result<(), ConfigError> {
    if !whatsapp.enabled {
        return Ok(());
    }

    if whatsapp.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required when whatsapp.enabled is true".to_owned(),
        ));
    }
    if whatsapp.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.access_token is required when whatsapp.enabled is true".to_owned(),
        ));
    }
    if whatsapp.verify_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required when whatsapp.enabled is true (any shared string; it must match the value entered in the Meta app dashboard)"
                .to_owned(),
        ));
    }

    Ok(())
}

fn validate_dialog(dialog: &DialogConfig) -> Result<(), ConfigError> {
    let code = dialog.default_country_code.trim();
    if code.is_empty() || code.len() > 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::Validation(
            "dialog.default_country_code must be 1-3 digits (e.g. `254`)".to_owned(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_owned(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    twilio: Option<TwilioPatch>,
    whatsapp: Option<WhatsappPatch>,
    dialog: Option<DialogPatch>,
    render: Option<RenderPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TwilioPatch {
    enabled: Option<bool>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsappPatch {
    enabled: Option<bool>,
    phone_number_id: Option<String>,
    access_token: Option<String>,
    verify_token: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DialogPatch {
    default_country_code: Option<String>,
    trial_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderPatch {
    template_dir: Option<String>,
    output_dir: Option<String>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

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
            Err(message.to_owned())
        }
    }

    fn loadable_overrides() -> ConfigOverrides {
        ConfigOverrides {
            whatsapp_enabled: Some(true),
            whatsapp_phone_number_id: Some("1066".to_owned()),
            whatsapp_access_token: Some("EAAG-test".to_owned()),
            whatsapp_verify_token: Some("shared-verify".to_owned()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        env::set_var("TEST_WA_ACCESS_TOKEN", "EAAG-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("karani.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
enabled = true
phone_number_id = "1066"
access_token = "${TEST_WA_ACCESS_TOKEN}"
verify_token = "shared-verify"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.access_token.expose_secret() == "EAAG-from-env",
                "access token should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_WA_ACCESS_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        env::set_var("KARANI_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("karani.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_owned()),
                    log_level: Some("debug".to_owned()),
                    ..loadable_overrides()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")
        })();

        clear_vars(&["KARANI_DATABASE_URL"]);
        result
    }

    #[test]
    fn validation_requires_at_least_one_transport() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure with no transport".to_owned()),
            Err(error) => error,
        };
        let mentions_transport = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("transport")
        );
        ensure(mentions_transport, "validation failure should mention transports")
    }

    #[test]
    fn validation_fails_fast_with_actionable_twilio_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        env::set_var("KARANI_TWILIO_ENABLED", "true");
        env::set_var("KARANI_TWILIO_ACCOUNT_SID", "not-a-sid");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_owned()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("twilio.account_sid")
            );
            ensure(has_message, "validation failure should mention twilio.account_sid")
        })();

        clear_vars(&["KARANI_TWILIO_ENABLED", "KARANI_TWILIO_ACCOUNT_SID"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                whatsapp_access_token: Some("EAAG-secret-value".to_owned()),
                ..loadable_overrides()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        let debug = format!("{config:?}");

        ensure(
            !debug.contains("EAAG-secret-value"),
            "debug output should not contain the access token",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn country_code_grammar_is_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_owned())?;

        env::set_var("KARANI_DIALOG_COUNTRY_CODE", "+254");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: loadable_overrides(),
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected validation failure".to_owned()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref m) if m.contains("country_code")),
                "validation failure should mention the country code",
            )
        })();

        clear_vars(&["KARANI_DIALOG_COUNTRY_CODE"]);
        result
    }
}
