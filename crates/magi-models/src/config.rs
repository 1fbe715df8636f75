use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::trade::TradeMode;

/// LLM vendors this deployment can drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Groq,
    Mistral,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Xai,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::DeepSeek,
        ProviderKind::Xai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
            ProviderKind::Mistral => "mistral",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Xai => "xai",
        }
    }

    /// Env var holding the API key when the config does not name one.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::Xai => "XAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// Top-level configuration for a MAGI deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MagiConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Overrides the vendor's default model.
    #[serde(default)]
    pub model: Option<String>,
    /// Env var holding the API key. Falls back to `ProviderKind::default_api_key_env`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Overrides the vendor's default endpoint (proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            model: None,
            api_key_env: None,
            base_url: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Agent loop limits and retry/polling policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_fill_poll_interval")]
    pub fill_poll_interval_ms: u64,
    #[serde(default = "default_fill_poll_attempts")]
    pub fill_poll_max_attempts: u32,
    /// Optional persona file; the built-in persona is used when absent.
    #[serde(default)]
    pub system_prompt_path: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            retry_max_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
            fill_poll_interval_ms: default_fill_poll_interval(),
            fill_poll_max_attempts: default_fill_poll_attempts(),
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingConfig {
    #[serde(default)]
    pub mode: TradeMode,
    /// Symbols the agent watches. Also the vocabulary for symbol inference.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    /// Daily bars fetched for indicator computation.
    #[serde(default = "default_bars_lookback")]
    pub bars_lookback: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradeMode::Paper,
            watchlist: default_watchlist(),
            bars_lookback: default_bars_lookback(),
        }
    }
}

/// Direction guard thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_win_rate")]
    pub max_win_rate: f64,
    #[serde(default = "default_min_losses")]
    pub min_losses: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_win_rate: default_max_win_rate(),
            min_losses: default_min_losses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetWeight {
    pub provider: ProviderKind,
    pub mode: TradeMode,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    #[serde(default = "default_weights")]
    pub weights: Vec<BudgetWeight>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default = "default_paper_url")]
    pub paper_url: String,
    #[serde(default = "default_live_url")]
    pub live_url: String,
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_key_id_env")]
    pub key_id_env: String,
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            paper_url: default_paper_url(),
            live_url: default_live_url(),
            data_url: default_data_url(),
            key_id_env: default_key_id_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_telegram_url(),
            bot_token_env: default_bot_token_env(),
            chat_id_env: default_chat_id_env(),
        }
    }
}

/// ATR-relative win/lose thresholds for the trade evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    #[serde(default = "default_win_multiplier")]
    pub win_atr_multiplier: f64,
    #[serde(default = "default_lose_multiplier")]
    pub lose_atr_multiplier: f64,
    #[serde(default = "default_min_age_hours")]
    pub min_age_hours: i64,
    #[serde(default = "default_surge_threshold")]
    pub surge_threshold_pct: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            win_atr_multiplier: default_win_multiplier(),
            lose_atr_multiplier: default_lose_multiplier(),
            min_age_hours: default_min_age_hours(),
            surge_threshold_pct: default_surge_threshold(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}
fn default_max_turns() -> u32 {
    8
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    30
}
fn default_fill_poll_interval() -> u64 {
    1000
}
fn default_fill_poll_attempts() -> u32 {
    10
}
fn default_watchlist() -> Vec<String> {
    ["AAPL", "MSFT", "GOOGL", "NVDA", "META", "TSLA", "AMD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_bars_lookback() -> u32 {
    30
}
fn default_true() -> bool {
    true
}
fn default_max_win_rate() -> f64 {
    0.30
}
fn default_min_losses() -> u32 {
    3
}
fn default_weights() -> Vec<BudgetWeight> {
    ProviderKind::ALL
        .into_iter()
        .map(|provider| BudgetWeight {
            provider,
            mode: TradeMode::Paper,
            weight: 1.0,
        })
        .collect()
}
fn default_sqlite_path() -> String {
    "data/magi.db".to_string()
}
fn default_paper_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}
fn default_live_url() -> String {
    "https://api.alpaca.markets".to_string()
}
fn default_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}
fn default_key_id_env() -> String {
    "ALPACA_API_KEY".to_string()
}
fn default_secret_key_env() -> String {
    "ALPACA_SECRET_KEY".to_string()
}
fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
fn default_chat_id_env() -> String {
    "TELEGRAM_CHAT_ID".to_string()
}
fn default_win_multiplier() -> f64 {
    2.0
}
fn default_lose_multiplier() -> f64 {
    1.5
}
fn default_min_age_hours() -> i64 {
    24
}
fn default_surge_threshold() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let toml_str = r#"
[provider]
kind = "gemini"
"#;
        let config: MagiConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Gemini);
        assert_eq!(config.agent.max_turns, 8);
        assert_eq!(config.agent.retry_max_attempts, 3);
        assert_eq!(config.agent.retry_delay_seconds, 30);
        assert_eq!(config.guard.max_win_rate, 0.30);
        assert_eq!(config.guard.min_losses, 3);
        assert_eq!(config.trading.mode, TradeMode::Paper);
        assert_eq!(config.budget.weights.len(), ProviderKind::ALL.len());
        assert_eq!(config.evaluation.win_atr_multiplier, 2.0);
    }

    #[test]
    fn full_config_from_toml() {
        let toml_str = r#"
[provider]
kind = "deepseek"
model = "deepseek-chat"
api_key_env = "MY_DEEPSEEK_KEY"

[agent]
max_turns = 5
retry_delay_seconds = 10

[trading]
mode = "live"
watchlist = ["NVDA", "AMD"]

[guard]
enabled = false

[[budget.weights]]
provider = "deepseek"
mode = "live"
weight = 3.0

[[budget.weights]]
provider = "groq"
mode = "paper"
weight = 1.0

[store]
sqlite_path = "/tmp/magi.db"
"#;
        let config: MagiConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::DeepSeek);
        assert_eq!(config.provider.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.agent.retry_max_attempts, 3);
        assert_eq!(config.trading.mode, TradeMode::Live);
        assert_eq!(config.trading.watchlist, vec!["NVDA", "AMD"]);
        assert!(!config.guard.enabled);
        assert_eq!(config.budget.weights.len(), 2);
        assert_eq!(config.store.sqlite_path, "/tmp/magi.db");
    }

    #[test]
    fn provider_kind_from_str() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("xai".parse::<ProviderKind>().unwrap(), ProviderKind::Xai);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn roundtrip_config() {
        let config = MagiConfig {
            provider: ProviderConfig {
                kind: ProviderKind::Groq,
                model: None,
                api_key_env: None,
                base_url: None,
                request_timeout_seconds: 60,
            },
            agent: AgentConfig::default(),
            trading: TradingConfig::default(),
            guard: GuardConfig::default(),
            budget: BudgetConfig::default(),
            store: StoreConfig::default(),
            broker: BrokerConfig::default(),
            notify: NotifyConfig::default(),
            evaluation: EvaluationConfig::default(),
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: MagiConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
