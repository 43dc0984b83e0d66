//! Wire shapes of display messages as sent inside [`crate::Packet::Display`].
//!
//! Unlike [`crate::display::DisplayPacket`] these carry version specific
//! details: numeric modes, packed angles and raw metadata indices.

use serde::{Deserialize, Serialize};

/// Protocol generation spoken by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Short team affixes (16 chars) and objective titles (32 chars).
    Legacy,
    /// No length limits on affixes or titles.
    #[default]
    Modern,
}

impl ProtocolVersion {
    pub fn number(&self) -> u32 {
        match self {
            ProtocolVersion::Legacy => 340,
            ProtocolVersion::Modern => 754,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            340 => Some(ProtocolVersion::Legacy),
            754 => Some(ProtocolVersion::Modern),
            _ => None,
        }
    }
}

/// Team mode numbers used by [`WireMessage::Team`].
pub const TEAM_MODE_CREATE: u8 = 0;
pub const TEAM_MODE_REMOVE: u8 = 1;
pub const TEAM_MODE_UPDATE: u8 = 2;
pub const TEAM_MODE_ADD_MEMBERS: u8 = 3;
pub const TEAM_MODE_REMOVE_MEMBERS: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTeamInfo {
    pub display_name: String,
    pub prefix: String,
    pub suffix: String,
    pub flags: u8,
    pub name_tag_visibility: String,
    pub collision_rule: String,
    pub color: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    Byte(u8),
    VarInt(i32),
    Text(String),
    OptionalText(Option<String>),
    Bool(bool),
    Pose(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub index: u8,
    pub value: MetaValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    Objective {
        name: String,
        display_name: String,
        mode: u8,
    },
    DisplayObjective {
        slot: u8,
        name: String,
    },
    Score {
        entry: String,
        objective: String,
        /// `None` removes the score.
        value: Option<i32>,
    },
    Team {
        name: String,
        mode: u8,
        info: Option<WireTeamInfo>,
        members: Vec<String>,
    },
    SpawnLiving {
        entity_id: i32,
        type_id: i32,
        x: f64,
        y: f64,
        z: f64,
        yaw: i8,
        pitch: i8,
        head_yaw: i8,
    },
    PlayerInfo {
        /// 0 adds, 4 removes.
        action: u8,
        uuid: u128,
        name: String,
        properties: Vec<ProfileProperty>,
    },
    SpawnPlayer {
        entity_id: i32,
        uuid: u128,
        x: f64,
        y: f64,
        z: f64,
        yaw: i8,
        pitch: i8,
    },
    Metadata {
        entity_id: i32,
        entries: Vec<MetaEntry>,
    },
    HeadLook {
        entity_id: i32,
        head_yaw: i8,
    },
    EntityLook {
        entity_id: i32,
        yaw: i8,
        pitch: i8,
        on_ground: bool,
    },
    Destroy {
        entity_ids: Vec<i32>,
    },
}
