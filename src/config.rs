use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    // Pairing codes
    pub code_ttl_secs: u64,

    // Rooms
    pub idle_room_timeout_secs: u64,

    // Background sweep
    pub sweep_interval_secs: u64,

    // Largest inbound WebSocket text frame accepted; whole file payloads
    // arrive as single frames.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().unwrap(),
            code_ttl_secs: 300, // 5 minutes to type 4 digits
            idle_room_timeout_secs: 600,
            sweep_interval_secs: 30,
            max_frame_bytes: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PAIRLINK_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(ttl) = std::env::var("PAIRLINK_CODE_TTL_SECS") {
            config.code_ttl_secs = ttl.parse()?;
        }

        if let Ok(idle) = std::env::var("PAIRLINK_IDLE_ROOM_TIMEOUT_SECS") {
            config.idle_room_timeout_secs = idle.parse()?;
        }

        if let Ok(interval) = std::env::var("PAIRLINK_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = interval.parse()?;
        }

        if let Ok(size) = std::env::var("PAIRLINK_MAX_FRAME_BYTES") {
            config.max_frame_bytes = size.parse()?;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.code_ttl_secs == 0 {
            anyhow::bail!("code_ttl_secs must be > 0");
        }

        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be > 0");
        }

        if self.max_frame_bytes == 0 {
            anyhow::bail!("max_frame_bytes must be > 0");
        }

        Ok(())
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    pub fn idle_room_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_room_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = ServerConfig {
            code_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = ServerConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.code_ttl_secs, config.code_ttl_secs);
    }
}
