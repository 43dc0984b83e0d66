//! Version independent display messages.
//!
//! The engine only ever produces these; a protocol encoder turns each one
//! into the concrete wire shape of one protocol version.

use crate::geometry::Location;
use crate::team::Team;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreboardAction {
    Create,
    Remove,
    Update,
}

impl ScoreboardAction {
    pub fn mode(&self) -> u8 {
        match self {
            ScoreboardAction::Create => 0,
            ScoreboardAction::Remove => 1,
            ScoreboardAction::Update => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreboardPosition {
    List,
    Sidebar,
    BelowName,
}

impl ScoreboardPosition {
    pub fn slot(&self) -> u8 {
        match self {
            ScoreboardPosition::List => 0,
            ScoreboardPosition::Sidebar => 1,
            ScoreboardPosition::BelowName => 2,
        }
    }
}

/// How a client interacted with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseAction {
    Interact,
    Attack,
    InteractAt,
}

/// Identity and skin data announced before a player-shaped actor spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub uuid: u128,
    pub name: String,
    pub texture: String,
    pub signature: String,
}

/// The subset of entity metadata the display layer controls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub custom_name: Option<String>,
    pub custom_name_visible: bool,
    pub invisible: bool,
    pub marker: bool,
    pub crouching: bool,
    pub skin_parts: Option<u8>,
}

impl EntityMetadata {
    /// Metadata for an invisible, non-colliding text carrier.
    pub fn marker_line(text: &str) -> Self {
        Self {
            custom_name: Some(text.to_string()),
            custom_name_visible: true,
            invisible: true,
            marker: true,
            crouching: false,
            skin_parts: None,
        }
    }

    /// Metadata for a player-shaped actor.
    pub fn actor(crouching: bool, skin_parts: u8) -> Self {
        Self {
            custom_name: None,
            custom_name_visible: false,
            invisible: false,
            marker: false,
            crouching,
            skin_parts: Some(skin_parts),
        }
    }
}

/// One display message addressed to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayPacket {
    ObjectiveAction {
        objective: String,
        title: String,
        action: ScoreboardAction,
    },
    DisplayObjective {
        objective: String,
        position: ScoreboardPosition,
    },
    SetScore {
        objective: String,
        entry: String,
        score: i32,
    },
    RemoveScore {
        objective: String,
        entry: String,
    },
    TeamAction {
        team: Team,
        action: ScoreboardAction,
    },
    TeamMembers {
        team: String,
        members: Vec<String>,
        add: bool,
    },
    SpawnMarker {
        entity_id: i32,
        location: Location,
    },
    PlayerInfo {
        profile: ActorProfile,
        add: bool,
    },
    SpawnActor {
        entity_id: i32,
        uuid: u128,
        location: Location,
    },
    EntityMetadata {
        entity_id: i32,
        metadata: EntityMetadata,
    },
    HeadRotation {
        entity_id: i32,
        yaw: f32,
    },
    EntityLook {
        entity_id: i32,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    DestroyEntities {
        entity_ids: Vec<i32>,
    },
}

impl DisplayPacket {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayPacket::ObjectiveAction { .. } => "objective",
            DisplayPacket::DisplayObjective { .. } => "display_objective",
            DisplayPacket::SetScore { .. } => "set_score",
            DisplayPacket::RemoveScore { .. } => "remove_score",
            DisplayPacket::TeamAction { .. } => "team",
            DisplayPacket::TeamMembers { .. } => "team_members",
            DisplayPacket::SpawnMarker { .. } => "spawn_marker",
            DisplayPacket::PlayerInfo { .. } => "player_info",
            DisplayPacket::SpawnActor { .. } => "spawn_actor",
            DisplayPacket::EntityMetadata { .. } => "metadata",
            DisplayPacket::HeadRotation { .. } => "head_rotation",
            DisplayPacket::EntityLook { .. } => "look",
            DisplayPacket::DestroyEntities { .. } => "destroy",
        }
    }
}
