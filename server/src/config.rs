use shared::ProtocolVersion;
use std::time::Duration;

/// Settings of the display engine itself.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// Protocol generation all clients speak; chosen once at startup
    pub protocol: ProtocolVersion,
    /// Ticks after an actor spawn before its profile is removed from the client list
    pub actor_profile_removal_delay: u64,
    /// Default squared distance within which actors are shown
    pub default_max_distance_squared: f64,
    /// Default cosine of the widest view angle at which actors appear
    pub default_max_view_angle_cos: f64,
    /// Seed for group names and actor profile ids; random when `None`
    pub rng_seed: Option<u64>,
    /// First entity id handed to hologram lines and actors
    pub first_entity_id: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolVersion::Modern,
            actor_profile_removal_delay: 20,
            default_max_distance_squared: 10_000.0,
            default_max_view_angle_cos: 0.5,
            rng_seed: None,
            first_entity_id: 1_000_000,
        }
    }
}

/// Settings of the UDP server that hosts the engine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Engine ticks per second
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Silence after which a client is dropped
    pub client_timeout: Duration,
    pub display: DisplayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            tick_rate: 20,
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
            display: DisplayConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
