use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{ai, food, room};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrent rooms
    pub max_rooms: usize,
    /// Maximum human players per room (bots not counted)
    pub max_players_per_room: usize,
    /// Bots seeded into every new room
    pub bots_per_room: usize,
    /// Pellets kept in every room
    pub food_per_room: usize,
    /// Region used when a client sends none or an invalid one
    pub default_region: String,
    /// How long a room may stay without players before it is destroyed
    pub room_idle_timeout: Duration,
    /// Port for the Prometheus/JSON metrics endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file (PEM)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (PEM)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            max_rooms: 100,
            max_players_per_room: room::MAX_PLAYERS,
            bots_per_room: ai::COUNT,
            food_per_room: food::PELLETS_PER_ROOM,
            default_region: "global".to_string(),
            room_idle_timeout: Duration::from_secs(room::IDLE_TIMEOUT_SECS),
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source; invalid values keep the default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<IpAddr, _>(&lookup, "BIND_ADDRESS", |_| true) {
            config.bind_address = addr;
        }
        if let Some(port) = parse_var(&lookup, "PORT", |p: &u16| *p > 0) {
            config.port = port;
        }
        if let Some(max_rooms) = parse_var(&lookup, "MAX_ROOMS", |n: &usize| (1..=10_000).contains(n)) {
            config.max_rooms = max_rooms;
        }
        if let Some(max_players) = parse_var(&lookup, "MAX_PLAYERS_PER_ROOM", |n: &usize| (1..=500).contains(n)) {
            config.max_players_per_room = max_players;
        }
        if let Some(bots) = parse_var(&lookup, "BOTS_PER_ROOM", |n: &usize| *n <= 200) {
            config.bots_per_room = bots;
        }
        if let Some(pellets) = parse_var(&lookup, "FOOD_PER_ROOM", |n: &usize| *n <= 20_000) {
            config.food_per_room = pellets;
        }
        if let Some(region) = lookup("DEFAULT_REGION") {
            let region = region.trim().to_ascii_lowercase();
            if !region.is_empty() {
                config.default_region = region;
            } else {
                tracing::warn!("DEFAULT_REGION is empty, using default");
            }
        }
        if let Some(secs) = parse_var(&lookup, "ROOM_IDLE_TIMEOUT_SECS", |_: &u64| true) {
            config.room_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(port) = parse_var(&lookup, "METRICS_PORT", |p: &u16| *p > 0) {
            config.metrics_port = port;
        }

        config.tls_cert_path = lookup("TLS_CERT_PATH");
        config.tls_key_path = lookup("TLS_KEY_PATH");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.metrics_port == self.port {
            return Err("METRICS_PORT must differ from PORT".to_string());
        }
        if self.max_rooms == 0 {
            return Err("max_rooms must be at least 1".to_string());
        }
        if self.max_players_per_room == 0 {
            return Err("max_players_per_room must be at least 1".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Some(value),
        Ok(_) => {
            tracing::warn!("{} '{}' out of range, using default", key, raw);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.max_rooms, 100);
        assert_eq!(config.max_players_per_room, room::MAX_PLAYERS);
        assert_eq!(config.default_region, "global");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "5000"),
            ("MAX_PLAYERS_PER_ROOM", "5"),
            ("BOTS_PER_ROOM", "0"),
            ("DEFAULT_REGION", " EU "),
            ("ROOM_IDLE_TIMEOUT_SECS", "5"),
            ("BIND_ADDRESS", "127.0.0.1"),
        ]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_players_per_room, 5);
        assert_eq!(config.bots_per_room, 0);
        assert_eq!(config.default_region, "eu");
        assert_eq!(config.room_idle_timeout, Duration::from_secs(5));
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[
            ("PORT", "0"),
            ("MAX_ROOMS", "lots"),
            ("MAX_PLAYERS_PER_ROOM", "0"),
            ("BIND_ADDRESS", "not-an-ip"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.port, defaults.port);
        assert_eq!(config.max_rooms, defaults.max_rooms);
        assert_eq!(config.max_players_per_room, defaults.max_players_per_room);
        assert_eq!(config.bind_address, defaults.bind_address);
    }

    #[test]
    fn test_validate_cross_field() {
        let config = from_pairs(&[("METRICS_PORT", "4433")]);
        assert!(config.validate().is_err());

        let config = from_pairs(&[("TLS_CERT_PATH", "cert.pem")]);
        assert!(config.validate().is_err());

        let config = from_pairs(&[("TLS_CERT_PATH", "cert.pem"), ("TLS_KEY_PATH", "key.pem")]);
        assert!(config.validate().is_ok());
    }
}
