use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::game::constants::{arena, food, net, player, round};

/// Configuration errors reported by `ServerConfig::validate`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    ZeroPort,
    #[error("outbound queue must hold at least one frame")]
    EmptyOutboundQueue,
    #[error("{0} must be a positive finite number")]
    NotPositive(&'static str),
    #[error("food radius ({food}) must be smaller than the starting radius ({player})")]
    FoodNotSmaller { food: f32, player: f32 },
    #[error("win score must be at least 1")]
    ZeroWinScore,
}

/// Gameplay configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Arena width in world units
    pub arena_width: f32,
    /// Arena height in world units
    pub arena_height: f32,
    /// Food particles kept in the field
    pub food_count: usize,
    /// Radius of each food particle
    pub food_radius: f32,
    /// Score that wins the round
    pub win_score: u32,
    /// Radius of a freshly spawned player
    pub starting_radius: f32,
    /// Radius gained per consumed particle
    pub growth_per_food: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_width: arena::WIDTH,
            arena_height: arena::HEIGHT,
            food_count: food::COUNT,
            food_radius: food::RADIUS,
            win_score: round::WIN_SCORE,
            starting_radius: player::STARTING_RADIUS,
            growth_per_food: player::GROWTH_PER_FOOD,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("arena width", self.arena_width),
            ("arena height", self.arena_height),
            ("food radius", self.food_radius),
            ("starting radius", self.starting_radius),
            ("growth per food", self.growth_per_food),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.food_radius >= self.starting_radius {
            return Err(ConfigError::FoodNotSmaller {
                food: self.food_radius,
                player: self.starting_radius,
            });
        }
        if self.win_score == 0 {
            return Err(ConfigError::ZeroWinScore);
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port of the metrics HTTP endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file (falls back to certs/cert.pem)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (falls back to certs/key.pem)
    pub tls_key_path: Option<String>,
    /// JSON file backing the player store; in-memory when unset
    pub store_path: Option<String>,
    /// Frames buffered per connection before broadcasts to it are dropped
    pub outbound_queue: usize,
    /// Gameplay settings
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
            store_path: None,
            outbound_queue: net::OUTBOUND_QUEUE,
            game: GameConfig::default(),
        }
    }
}

/// Overwrite `target` with the parsed value of `key` when present, parsable and accepted
fn apply_var<T, F>(lookup: &F, key: &str, target: &mut T, accept: impl Fn(&T) -> bool)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => *target = parsed,
        Ok(_) => tracing::warn!("{} '{}' out of range, using default", key, raw),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary variable source
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        apply_var(&lookup, "BIND_ADDRESS", &mut config.bind_address, |_| true);
        apply_var(&lookup, "PORT", &mut config.port, |p| *p > 0);
        apply_var(&lookup, "METRICS_PORT", &mut config.metrics_port, |p| *p > 0);
        apply_var(&lookup, "OUTBOUND_QUEUE", &mut config.outbound_queue, |q| {
            (1..=4096).contains(q)
        });

        config.tls_cert_path = lookup("TLS_CERT_PATH");
        config.tls_key_path = lookup("TLS_KEY_PATH");
        config.store_path = lookup("STORE_PATH").filter(|p| !p.trim().is_empty());

        let positive = |v: &f32| v.is_finite() && *v > 0.0;
        let game = &mut config.game;
        apply_var(&lookup, "ARENA_WIDTH", &mut game.arena_width, positive);
        apply_var(&lookup, "ARENA_HEIGHT", &mut game.arena_height, positive);
        apply_var(&lookup, "FOOD_COUNT", &mut game.food_count, |c| *c <= 100_000);
        apply_var(&lookup, "FOOD_RADIUS", &mut game.food_radius, positive);
        apply_var(&lookup, "WIN_SCORE", &mut game.win_score, |s| *s > 0);
        apply_var(&lookup, "START_RADIUS", &mut game.starting_radius, positive);
        apply_var(&lookup, "GROWTH_PER_FOOD", &mut game.growth_per_food, positive);

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::EmptyOutboundQueue);
        }
        self.game.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.game.arena_width, 2000.0);
        assert_eq!(config.game.arena_height, 2000.0);
        assert_eq!(config.game.food_count, 100);
        assert_eq!(config.game.food_radius, 5.0);
        assert_eq!(config.game.win_score, 700);
        assert_eq!(config.game.starting_radius, 20.0);
        assert_eq!(config.game.growth_per_food, 1.0);
        assert!(config.store_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_overrides() {
        let config = ServerConfig::load_from(lookup(&[
            ("PORT", "4433"),
            ("BIND_ADDRESS", "127.0.0.1"),
            ("WIN_SCORE", "50"),
            ("FOOD_COUNT", "12"),
            ("ARENA_WIDTH", "800.5"),
            ("STORE_PATH", "data/players.json"),
        ]));
        assert_eq!(config.port, 4433);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.game.win_score, 50);
        assert_eq!(config.game.food_count, 12);
        assert_eq!(config.game.arena_width, 800.5);
        assert_eq!(config.store_path.as_deref(), Some("data/players.json"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::load_from(lookup(&[
            ("PORT", "0"),
            ("WIN_SCORE", "lots"),
            ("ARENA_HEIGHT", "-10"),
            ("FOOD_RADIUS", "NaN"),
            ("STORE_PATH", "  "),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.game.win_score, 700);
        assert_eq!(config.game.arena_height, 2000.0);
        assert_eq!(config.game.food_radius, 5.0);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_food_must_be_smaller_than_player() {
        let config = ServerConfig::load_from(lookup(&[("FOOD_RADIUS", "25")]));
        assert_eq!(
            config.validate(),
            Err(ConfigError::FoodNotSmaller {
                food: 25.0,
                player: 20.0
            })
        );
    }

    #[test]
    fn test_zero_outbound_queue_rejected() {
        let config = ServerConfig {
            outbound_queue: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyOutboundQueue));
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }
}
