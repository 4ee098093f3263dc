use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub fleet: FleetConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    pub db_workers: usize,
    pub http_workers: usize,
    /// Per-worker reply timeout for one collection round.
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,
    /// Minimum interval between collection rounds; scrapes inside it are
    /// served from the cache.
    #[serde(default = "default_cache_interval_ms")]
    pub cache_interval_ms: u64,
    /// Background refresh cadence, so the cache stays warm without scrapes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_collect_timeout_ms() -> u64 {
    1000
}

fn default_cache_interval_ms() -> u64 {
    5000
}

fn default_refresh_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub enabled: bool,
    /// host:port of the live endpoint to probe.
    pub endpoint: String,
    /// Well-known channel joined once to learn the history keeper identity.
    #[serde(default = "default_channel")]
    pub channel: String,
    pub http_port: u16,
    pub http_host: String,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_channel() -> String {
    "0".repeat(32)
}

fn default_ping_interval_ms() -> u64 {
    10000
}

fn default_reconnect_backoff_ms() -> u64 {
    5000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.fleet.db_workers + self.fleet.http_workers > 0,
            "fleet must have at least one worker"
        );
        anyhow::ensure!(
            self.fleet.collect_timeout_ms > 0,
            "fleet.collect_timeout_ms must be > 0, got {}",
            self.fleet.collect_timeout_ms
        );
        anyhow::ensure!(
            self.fleet.cache_interval_ms > 0,
            "fleet.cache_interval_ms must be > 0, got {}",
            self.fleet.cache_interval_ms
        );
        anyhow::ensure!(
            self.fleet.refresh_interval_secs > 0,
            "fleet.refresh_interval_secs must be > 0, got {}",
            self.fleet.refresh_interval_secs
        );
        if self.probe.enabled {
            anyhow::ensure!(
                !self.probe.endpoint.is_empty(),
                "probe.endpoint must be non-empty when the probe is enabled"
            );
            anyhow::ensure!(
                !self.probe.channel.is_empty(),
                "probe.channel must be non-empty"
            );
            anyhow::ensure!(
                self.probe.http_port > 0,
                "probe.http_port must be between 1 and 65535, got {}",
                self.probe.http_port
            );
            anyhow::ensure!(
                self.probe.ping_interval_ms > 0,
                "probe.ping_interval_ms must be > 0, got {}",
                self.probe.ping_interval_ms
            );
            anyhow::ensure!(
                self.probe.reconnect_backoff_ms > 0,
                "probe.reconnect_backoff_ms must be > 0, got {}",
                self.probe.reconnect_backoff_ms
            );
        }
        Ok(())
    }
}
