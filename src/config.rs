use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::models::ProviderLanguagePolicy;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub places: PlacesConfig,
    pub ws: WsConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Which job-store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Retention of terminal job records in the store.
    pub job_ttl_s: u64,
    /// Heartbeat-staleness threshold for RUNNING jobs.
    pub max_running_job_age_ms: i64,
    /// Window in which a DONE_SUCCESS job satisfies an identical request.
    pub done_success_fresh_window_ms: i64,
    pub heartbeat_interval_ms: u64,
    /// How often the stale sweeper scans RUNNING jobs.
    pub stale_sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1_max_entries: usize,
    pub l1_max_ttl_s: u64,
    pub l2_default_ttl_s: u64,
    /// Shorter TTL for cached empty result sets.
    pub l2_empty_ttl_s: u64,
    pub l1_empty_ttl_s: u64,
    /// Fraction of DEBUG cache events actually logged.
    pub sampling_rate: f64,
    pub canonical_query_ttl_s: u64,
    pub landmark_resolution_ttl_s: u64,
}

/// Per-stage LLM call budgets in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeouts {
    pub gate_ms: u64,
    pub intent_ms: u64,
    pub filters_ms: u64,
    pub mapper_ms: u64,
    pub assistant_ms: u64,
    pub enforcer_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeouts: LlmTimeouts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacesConfig {
    pub api_base: String,
    pub geocode_base: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub ticket_ttl_s: u64,
    /// Events retained per request for late-subscriber replay.
    pub backlog_max: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider_language_policy: ProviderLanguagePolicy,
    /// Per-process cap on concurrently running search jobs.
    pub max_concurrent_jobs: usize,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "savor")]
#[command(version, about = "Savor - async restaurant search service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Redis URL for the shared store (overrides config file)
    #[arg(long, value_name = "URL")]
    pub redis_url: Option<String>,

    /// Job store backend: memory or redis (overrides config file)
    #[arg(long, value_name = "BACKEND")]
    pub store_backend: Option<String>,

    /// Logging level (overrides config file, e.g., "info,savor=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT / APP_LOG_LEVEL / APP_REDIS_URL
    /// - APP_STORE_BACKEND: memory | redis
    /// - MAX_RUNNING_JOB_AGE_MS: staleness threshold (default 90000)
    /// - DONE_SUCCESS_FRESH_WINDOW_MS: dedup reuse window (default 5000)
    /// - HEARTBEAT_INTERVAL_MS: default 15000
    /// - CANONICAL_QUERY_TTL_S: default 86400
    /// - LANDMARK_RESOLUTION_TTL_S: default 604800
    /// - L1_MAX_ENTRIES / L1_MAX_TTL_S / L2_DEFAULT_TTL_S / L2_EMPTY_TTL_S
    /// - LLM_TIMEOUTS_MS: JSON map, e.g. {"gate":3500,"intent":3500}
    /// - CACHE_SAMPLING_RATE: fraction of DEBUG cache events logged
    /// - FILTER_ENFORCER_TIMEOUT_MS: default 4000
    /// - PROVIDER_LANGUAGE_POLICY: queryLanguage | regionDefault
    /// - LLM_API_BASE / LLM_API_KEY / LLM_MODEL
    /// - PLACES_API_BASE / PLACES_API_KEY / GEOCODE_API_BASE
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(url) = std::env::var("APP_REDIS_URL") {
            self.store.redis_url = url;
            tracing::info!("Override store.redis_url from env");
        }

        if let Ok(backend) = std::env::var("APP_STORE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "redis" => self.store.backend = StoreBackend::Redis,
                other => tracing::warn!("Invalid APP_STORE_BACKEND '{}', keeping current", other),
            }
        }

        env_override_i64("MAX_RUNNING_JOB_AGE_MS", &mut self.store.max_running_job_age_ms);
        env_override_i64(
            "DONE_SUCCESS_FRESH_WINDOW_MS",
            &mut self.store.done_success_fresh_window_ms,
        );
        env_override_u64("HEARTBEAT_INTERVAL_MS", &mut self.store.heartbeat_interval_ms);
        env_override_u64("CANONICAL_QUERY_TTL_S", &mut self.cache.canonical_query_ttl_s);
        env_override_u64("LANDMARK_RESOLUTION_TTL_S", &mut self.cache.landmark_resolution_ttl_s);
        env_override_usize("L1_MAX_ENTRIES", &mut self.cache.l1_max_entries);
        env_override_u64("L1_MAX_TTL_S", &mut self.cache.l1_max_ttl_s);
        env_override_u64("L2_DEFAULT_TTL_S", &mut self.cache.l2_default_ttl_s);
        env_override_u64("L2_EMPTY_TTL_S", &mut self.cache.l2_empty_ttl_s);
        env_override_u64("FILTER_ENFORCER_TIMEOUT_MS", &mut self.llm.timeouts.enforcer_ms);

        if let Ok(rate) = std::env::var("CACHE_SAMPLING_RATE") {
            match rate.parse::<f64>() {
                Ok(val) if (0.0..=1.0).contains(&val) => {
                    self.cache.sampling_rate = val;
                    tracing::info!("Override cache.sampling_rate from env: {}", val);
                }
                _ => tracing::warn!(
                    "Invalid CACHE_SAMPLING_RATE '{}' (keep {})",
                    rate,
                    self.cache.sampling_rate
                ),
            }
        }

        if let Ok(raw) = std::env::var("LLM_TIMEOUTS_MS") {
            match serde_json::from_str::<HashMap<String, u64>>(&raw) {
                Ok(map) => {
                    for (stage, ms) in map {
                        match stage.as_str() {
                            "gate" => self.llm.timeouts.gate_ms = ms,
                            "intent" => self.llm.timeouts.intent_ms = ms,
                            "filters" => self.llm.timeouts.filters_ms = ms,
                            "mapper" => self.llm.timeouts.mapper_ms = ms,
                            "assistant" => self.llm.timeouts.assistant_ms = ms,
                            "enforcer" => self.llm.timeouts.enforcer_ms = ms,
                            other => {
                                tracing::warn!("Unknown LLM_TIMEOUTS_MS stage '{}'", other)
                            }
                        }
                    }
                    tracing::info!("Override llm.timeouts from env");
                }
                Err(e) => tracing::warn!("Invalid LLM_TIMEOUTS_MS: {}", e),
            }
        }

        if let Ok(policy) = std::env::var("PROVIDER_LANGUAGE_POLICY") {
            match policy.as_str() {
                "queryLanguage" => {
                    self.search.provider_language_policy = ProviderLanguagePolicy::QueryLanguage
                }
                "regionDefault" => {
                    self.search.provider_language_policy = ProviderLanguagePolicy::RegionDefault
                }
                other => {
                    tracing::warn!("Invalid PROVIDER_LANGUAGE_POLICY '{}', keeping current", other)
                }
            }
        }

        if let Ok(base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(base) = std::env::var("PLACES_API_BASE") {
            self.places.api_base = base;
        }
        if let Ok(key) = std::env::var("PLACES_API_KEY") {
            self.places.api_key = key;
        }
        if let Ok(base) = std::env::var("GEOCODE_API_BASE") {
            self.places.geocode_base = base;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(url) = &args.redis_url {
            self.store.redis_url = url.clone();
            tracing::info!("Override store.redis_url from CLI");
        }

        if let Some(backend) = &args.store_backend {
            match backend.to_lowercase().as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "redis" => self.store.backend = StoreBackend::Redis,
                other => tracing::warn!("Invalid --store-backend '{}', keeping current", other),
            }
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_empty() {
            anyhow::bail!("store.redis_url is required for the redis backend");
        }
        if self.store.max_running_job_age_ms <= 0 {
            anyhow::bail!("store.max_running_job_age_ms must be > 0");
        }
        if self.store.heartbeat_interval_ms == 0 {
            anyhow::bail!("store.heartbeat_interval_ms must be > 0");
        }
        if self.cache.l1_max_entries == 0 {
            anyhow::bail!("cache.l1_max_entries must be > 0");
        }
        if !(0.0..=1.0).contains(&self.cache.sampling_rate) {
            anyhow::bail!("cache.sampling_rate must be in [0, 1]");
        }
        if self.search.max_concurrent_jobs == 0 {
            anyhow::bail!("search.max_concurrent_jobs must be > 0");
        }
        if self.llm.api_key.is_empty() {
            tracing::warn!("LLM API key is not configured; LLM stages will fail over to fallbacks");
        }
        if self.places.api_key.is_empty() {
            tracing::warn!("Places API key is not configured; provider calls will fail");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

// =========================
// Env parsing helpers
// =========================

fn env_override_u64(name: &str, slot: &mut u64) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(val) => {
                *slot = val;
                tracing::info!("Override {} from env: {}", name, val);
            }
            Err(_) => tracing::warn!("Invalid {} '{}' (keep {})", name, raw, slot),
        }
    }
}

fn env_override_i64(name: &str, slot: &mut i64) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(val) => {
                *slot = val;
                tracing::info!("Override {} from env: {}", name, val);
            }
            Err(_) => tracing::warn!("Invalid {} '{}' (keep {})", name, raw, slot),
        }
    }
}

fn env_override_usize(name: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(val) => {
                *slot = val;
                tracing::info!("Override {} from env: {}", name, val);
            }
            Err(_) => tracing::warn!("Invalid {} '{}' (keep {})", name, raw, slot),
        }
    }
}

// =========================
// Defaults
// =========================

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,savor=debug".to_string(), file: Some("logs/savor.log".to_string()) }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            job_ttl_s: 3600,
            max_running_job_age_ms: 90_000,
            done_success_fresh_window_ms: 5_000,
            heartbeat_interval_ms: 15_000,
            stale_sweep_interval_ms: 30_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 500,
            l1_max_ttl_s: 60,
            l2_default_ttl_s: 900,
            l2_empty_ttl_s: 120,
            l1_empty_ttl_s: 30,
            sampling_rate: 0.05,
            canonical_query_ttl_s: 86_400,
            landmark_resolution_ttl_s: 604_800,
        }
    }
}

impl Default for LlmTimeouts {
    fn default() -> Self {
        Self {
            gate_ms: 3_500,
            intent_ms: 3_500,
            filters_ms: 4_500,
            mapper_ms: 3_500,
            assistant_ms: 3_000,
            enforcer_ms: 4_000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 1024,
            timeouts: LlmTimeouts::default(),
        }
    }
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_base: "https://places.googleapis.com/v1".to_string(),
            geocode_base: "https://maps.googleapis.com/maps/api/geocode".to_string(),
            api_key: String::new(),
            timeout_ms: 6_000,
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { ticket_ttl_s: 60, backlog_max: 32 }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider_language_policy: ProviderLanguagePolicy::QueryLanguage,
            max_concurrent_jobs: 64,
        }
    }
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.store.max_running_job_age_ms, 90_000);
        assert_eq!(config.store.done_success_fresh_window_ms, 5_000);
        assert_eq!(config.store.heartbeat_interval_ms, 15_000);
        assert_eq!(config.cache.l1_max_entries, 500);
        assert_eq!(config.cache.l2_default_ttl_s, 900);
        assert_eq!(config.cache.l2_empty_ttl_s, 120);
        assert_eq!(config.cache.canonical_query_ttl_s, 86_400);
        assert_eq!(config.cache.landmark_resolution_ttl_s, 604_800);
        assert_eq!(config.llm.timeouts.enforcer_ms, 4_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_sections_parse() {
        let raw = r#"
            [server]
            port = 9090

            [store]
            backend = "redis"
            redis_url = "redis://cache:6379"
            max_running_job_age_ms = 300000

            [search]
            provider_language_policy = "queryLanguage"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.max_running_job_age_ms, 300_000);
        assert_eq!(config.cache.l1_max_entries, 500);
    }
}
