//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.faqrelay/config.json`) and environment.
//! Secrets and operator destinations may come from the environment so the file can be shared.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fatal configuration problems detected at startup. The process must not start when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("telegram bot token not configured (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN)")]
    MissingToken,
    #[error("invalid operator chat ids: {0}")]
    InvalidOperatorIds(String),
    #[error("invalid catalog: {0}")]
    Catalog(String),
    #[error("invalid relay setting: {0}")]
    InvalidRelay(String),
}

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener (health + Telegram webhook).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Operator relay: where unmatched questions go and who may answer them.
    #[serde(default)]
    pub relay: RelayConfig,

    /// FAQ catalog location.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// User-facing relay texts.
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). Use a public address when Telegram must reach the webhook directly.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// How an unmatched question reaches the operator chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// forwardMessage: operators see the original message with its author.
    #[default]
    Forward,
    /// sendMessage with `messages.operatorNotice`: works even when the user hides forwards.
    Notify,
}

/// Operator relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Operator chats (user or group ids) that receive relayed questions, in order of preference.
    /// Overridden by FAQRELAY_OPERATOR_CHAT_IDS (comma-separated). Empty means every question gets the apology.
    #[serde(default)]
    pub destinations: Vec<i64>,
    /// Extra operator user ids allowed to answer (destinations are always allowed).
    #[serde(default)]
    pub operator_ids: Vec<i64>,
    #[serde(default)]
    pub mode: RelayMode,
    /// Relayed questions without a reply are forgotten after this many seconds (default 7 days).
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
    /// How often expired entries are swept (default 1 hour).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Bound on one Telegram call made while relaying a question or a reply (default 30 seconds).
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_entry_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            operator_ids: Vec::new(),
            mode: RelayMode::default(),
            entry_ttl_secs: default_entry_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Catalog file location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    /// Path to catalog.yaml. Relative paths are resolved against the config file's parent.
    /// When unset, `catalog.yaml` next to the config file is used, falling back to the bundled catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Texts sent by the relay. `{user}`, `{text}` and `{reply}` are substituted where noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesConfig {
    /// Sent to the user after the question reached an operator.
    #[serde(default = "default_confirmation")]
    pub confirmation: String,
    /// Sent to the user when the question could not be relayed.
    #[serde(default = "default_apology")]
    pub apology: String,
    /// Wraps an operator reply; `{reply}` is the operator's text.
    #[serde(default = "default_reply_template")]
    pub reply_template: String,
    /// Operator-side notice in notify mode; `{user}` and `{text}`.
    #[serde(default = "default_operator_notice")]
    pub operator_notice: String,
}

fn default_confirmation() -> String {
    "Ваш вопрос передан менеджеру. Ожидайте ответа.".to_string()
}

fn default_apology() -> String {
    "Не удалось передать вопрос менеджеру. Попробуйте позже.".to_string()
}

fn default_reply_template() -> String {
    "Ответ менеджера:\n{reply}".to_string()
}

fn default_operator_notice() -> String {
    "Новый вопрос от пользователя {user}:\n{text}".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            confirmation: default_confirmation(),
            apology: default_apology(),
            reply_template: default_reply_template(),
            operator_notice: default_operator_notice(),
        }
    }
}

impl MessagesConfig {
    /// Text delivered to the requester for an operator reply.
    pub fn render_reply(&self, reply: &str) -> String {
        self.reply_template.replace("{reply}", reply)
    }

    /// Text posted to the operator chat in notify mode.
    pub fn render_operator_notice(&self, user: &str, text: &str) -> String {
        self.operator_notice
            .replace("{user}", user)
            .replace("{text}", text)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    pick_telegram_token(non_empty_env("TELEGRAM_BOT_TOKEN"), config)
}

fn pick_telegram_token(env: Option<String>, config: &Config) -> Option<String> {
    env.or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve operator destinations: env FAQRELAY_OPERATOR_CHAT_IDS overrides config.
pub fn resolve_operator_destinations(config: &Config) -> Result<Vec<i64>, ConfigError> {
    match non_empty_env("FAQRELAY_OPERATOR_CHAT_IDS") {
        Some(raw) => parse_chat_ids(&raw),
        None => Ok(config.relay.destinations.clone()),
    }
}

/// Reject relay timings that would make the relay useless: a zero ttl forgets every question
/// before its reply arrives, a zero send timeout fails every forward.
pub fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    if relay.entry_ttl_secs == 0 {
        return Err(ConfigError::InvalidRelay(
            "entryTtlSecs must be greater than 0".to_string(),
        ));
    }
    if relay.send_timeout_secs == 0 {
        return Err(ConfigError::InvalidRelay(
            "sendTimeoutSecs must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Parse a comma-separated list of chat ids (e.g. "-1001234,5678").
pub fn parse_chat_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ConfigError::InvalidOperatorIds(s.to_string()))
        })
        .collect()
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("FAQRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".faqrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or FAQRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the catalog).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the catalog file: `catalog.path` if set (relative paths resolved against the config file's parent), otherwise `catalog.yaml` next to the config file.
pub fn resolve_catalog_path(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.catalog.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join("catalog.yaml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15152);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.relay.destinations.is_empty());
        assert_eq!(config.relay.mode, RelayMode::Forward);
        assert_eq!(config.relay.entry_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(
            config.messages.confirmation,
            "Ваш вопрос передан менеджеру. Ожидайте ответа."
        );
    }

    #[test]
    fn relay_section_parses_camel_case() {
        let config: Config = serde_json::from_str(
            r#"{"relay":{"destinations":[-100123],"operatorIds":[42],"mode":"notify","entryTtlSecs":60}}"#,
        )
        .unwrap();
        assert_eq!(config.relay.destinations, vec![-100123]);
        assert_eq!(config.relay.operator_ids, vec![42]);
        assert_eq!(config.relay.mode, RelayMode::Notify);
        assert_eq!(config.relay.entry_ttl_secs, 60);
        assert_eq!(config.relay.sweep_interval_secs, 60 * 60);
    }

    #[test]
    fn token_env_overrides_config() {
        let mut config = Config::default();
        config.channels.telegram.bot_token = Some("  from-file ".to_string());
        assert_eq!(
            pick_telegram_token(None, &config).as_deref(),
            Some("from-file")
        );
        assert_eq!(
            pick_telegram_token(Some("from-env".to_string()), &config).as_deref(),
            Some("from-env")
        );
        config.channels.telegram.bot_token = Some("   ".to_string());
        assert_eq!(pick_telegram_token(None, &config), None);
    }

    #[test]
    fn zero_relay_timings_are_rejected() {
        assert!(validate_relay(&RelayConfig::default()).is_ok());
        let config: Config = serde_json::from_str(r#"{"relay":{"entryTtlSecs":0}}"#).unwrap();
        assert!(matches!(
            validate_relay(&config.relay),
            Err(ConfigError::InvalidRelay(_))
        ));
        let config: Config = serde_json::from_str(r#"{"relay":{"sendTimeoutSecs":0}}"#).unwrap();
        assert!(matches!(
            validate_relay(&config.relay),
            Err(ConfigError::InvalidRelay(_))
        ));
    }

    #[test]
    fn parse_chat_ids_accepts_list_and_rejects_garbage() {
        assert_eq!(parse_chat_ids("-1001, 42,,").unwrap(), vec![-1001, 42]);
        assert!(matches!(
            parse_chat_ids("12,abc"),
            Err(ConfigError::InvalidOperatorIds(s)) if s == "abc"
        ));
    }

    #[test]
    fn render_templates() {
        let m = MessagesConfig::default();
        assert_eq!(m.render_reply("Next Tuesday"), "Ответ менеджера:\nNext Tuesday");
        assert_eq!(
            m.render_operator_notice("@donor", "hi"),
            "Новый вопрос от пользователя @donor:\nhi"
        );
    }

    #[test]
    fn resolve_catalog_path_default_and_overrides() {
        let path = Path::new("/home/user/.faqrelay/config.json");
        let mut config = Config::default();
        assert_eq!(
            resolve_catalog_path(&config, path),
            PathBuf::from("/home/user/.faqrelay/catalog.yaml")
        );
        config.catalog.path = Some(PathBuf::from("faq/donors.yaml"));
        assert_eq!(
            resolve_catalog_path(&config, path),
            PathBuf::from("/home/user/.faqrelay/faq/donors.yaml")
        );
        config.catalog.path = Some(PathBuf::from("/srv/catalog.yaml"));
        assert_eq!(
            resolve_catalog_path(&config, path),
            PathBuf::from("/srv/catalog.yaml")
        );
    }
}
