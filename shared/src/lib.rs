pub mod display;
pub mod geometry;
pub mod style;
pub mod team;
pub mod wire;

use serde::{Deserialize, Serialize};

pub use display::{
    ActorProfile, DisplayPacket, EntityMetadata, ScoreboardAction, ScoreboardPosition, UseAction,
};
pub use geometry::{Location, Vec3, PLAYER_EYE_HEIGHT};
pub use team::{CollisionRule, Team, TeamColor, TeamOptions, VisibilityRule};
pub use wire::{ProtocolVersion, WireMessage};

/// Stable identity of a connected client, assigned by the server.
pub type ClientId = u32;

/// Client version the bundled test client speaks.
pub const CLIENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
        location: Location,
    },
    /// First in-game packet after connecting; completes the join handshake.
    Ready,
    Move {
        location: Location,
    },
    Teleport {
        location: Location,
    },
    Respawn {
        location: Location,
    },
    Crouch {
        crouching: bool,
    },
    UseEntity {
        entity_id: i32,
        action: UseAction,
    },
    Disconnect,

    Connected {
        client_id: ClientId,
        protocol: ProtocolVersion,
    },
    Display {
        messages: Vec<WireMessage>,
    },
    Disconnected {
        reason: String,
    },
}
