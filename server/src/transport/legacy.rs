use super::ProtocolEncoder;
use shared::geometry::angle_to_byte;
use shared::wire::{
    MetaEntry, MetaValue, ProfileProperty, WireTeamInfo, TEAM_MODE_ADD_MEMBERS,
    TEAM_MODE_REMOVE_MEMBERS,
};
use shared::{
    DisplayPacket, EntityMetadata, ProtocolVersion, ScoreboardAction, Team, WireMessage,
};

const ARMOR_STAND_TYPE: i32 = 30;

const INDEX_FLAGS: u8 = 0;
const INDEX_CUSTOM_NAME: u8 = 2;
const INDEX_CUSTOM_NAME_VISIBLE: u8 = 3;
const INDEX_ARMOR_STAND_FLAGS: u8 = 11;
const INDEX_SKIN_PARTS: u8 = 13;

/// Encoder for the legacy protocol: plain text components and the older
/// metadata layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyEncoder;

impl LegacyEncoder {
    fn team_info(team: &Team) -> WireTeamInfo {
        let options = &team.options;
        WireTeamInfo {
            display_name: team.name.clone(),
            prefix: options.prefix.clone(),
            suffix: options.suffix.clone(),
            flags: options.flags(),
            name_tag_visibility: options.name_tag_visibility.wire_name().to_string(),
            collision_rule: options.collision_rule.wire_name().to_string(),
            color: options.color.index(),
        }
    }

    fn metadata(metadata: &EntityMetadata) -> Vec<MetaEntry> {
        let mut flags = 0u8;
        if metadata.crouching {
            flags |= 0x02;
        }
        if metadata.invisible {
            flags |= 0x20;
        }

        let mut entries = vec![MetaEntry {
            index: INDEX_FLAGS,
            value: MetaValue::Byte(flags),
        }];

        if let Some(name) = &metadata.custom_name {
            entries.push(MetaEntry {
                index: INDEX_CUSTOM_NAME,
                value: MetaValue::Text(name.clone()),
            });
            entries.push(MetaEntry {
                index: INDEX_CUSTOM_NAME_VISIBLE,
                value: MetaValue::Bool(metadata.custom_name_visible),
            });
        }

        if metadata.marker {
            entries.push(MetaEntry {
                index: INDEX_ARMOR_STAND_FLAGS,
                value: MetaValue::Byte(0x10 | 0x08),
            });
        }

        if let Some(parts) = metadata.skin_parts {
            entries.push(MetaEntry {
                index: INDEX_SKIN_PARTS,
                value: MetaValue::Byte(parts),
            });
        }

        entries
    }
}

impl ProtocolEncoder for LegacyEncoder {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Legacy
    }

    fn encode(&self, packet: &DisplayPacket) -> Vec<WireMessage> {
        let message = match packet {
            DisplayPacket::ObjectiveAction {
                objective,
                title,
                action,
            } => WireMessage::Objective {
                name: objective.clone(),
                display_name: title.clone(),
                mode: action.mode(),
            },
            DisplayPacket::DisplayObjective {
                objective,
                position,
            } => WireMessage::DisplayObjective {
                slot: position.slot(),
                name: objective.clone(),
            },
            DisplayPacket::SetScore {
                objective,
                entry,
                score,
            } => WireMessage::Score {
                entry: entry.clone(),
                objective: objective.clone(),
                value: Some(*score),
            },
            DisplayPacket::RemoveScore { objective, entry } => WireMessage::Score {
                entry: entry.clone(),
                objective: objective.clone(),
                value: None,
            },
            DisplayPacket::TeamAction { team, action } => WireMessage::Team {
                name: team.name.clone(),
                mode: action.mode(),
                info: match action {
                    ScoreboardAction::Remove => None,
                    _ => Some(Self::team_info(team)),
                },
                members: Vec::new(),
            },
            DisplayPacket::TeamMembers { team, members, add } => WireMessage::Team {
                name: team.clone(),
                mode: if *add {
                    TEAM_MODE_ADD_MEMBERS
                } else {
                    TEAM_MODE_REMOVE_MEMBERS
                },
                info: None,
                members: members.clone(),
            },
            DisplayPacket::SpawnMarker {
                entity_id,
                location,
            } => WireMessage::SpawnLiving {
                entity_id: *entity_id,
                type_id: ARMOR_STAND_TYPE,
                x: location.x,
                y: location.y,
                z: location.z,
                yaw: angle_to_byte(location.yaw),
                pitch: angle_to_byte(location.pitch),
                head_yaw: angle_to_byte(location.yaw),
            },
            DisplayPacket::PlayerInfo { profile, add } => WireMessage::PlayerInfo {
                action: if *add { 0 } else { 4 },
                uuid: profile.uuid,
                name: profile.name.clone(),
                properties: vec![ProfileProperty {
                    name: "textures".to_string(),
                    value: profile.texture.clone(),
                    signature: profile.signature.clone(),
                }],
            },
            DisplayPacket::SpawnActor {
                entity_id,
                uuid,
                location,
            } => WireMessage::SpawnPlayer {
                entity_id: *entity_id,
                uuid: *uuid,
                x: location.x,
                y: location.y,
                z: location.z,
                yaw: angle_to_byte(location.yaw),
                pitch: angle_to_byte(location.pitch),
            },
            DisplayPacket::EntityMetadata {
                entity_id,
                metadata,
            } => WireMessage::Metadata {
                entity_id: *entity_id,
                entries: Self::metadata(metadata),
            },
            DisplayPacket::HeadRotation { entity_id, yaw } => WireMessage::HeadLook {
                entity_id: *entity_id,
                head_yaw: angle_to_byte(*yaw),
            },
            DisplayPacket::EntityLook {
                entity_id,
                yaw,
                pitch,
                on_ground,
            } => WireMessage::EntityLook {
                entity_id: *entity_id,
                yaw: angle_to_byte(*yaw),
                pitch: angle_to_byte(*pitch),
                on_ground: *on_ground,
            },
            DisplayPacket::DestroyEntities { entity_ids } => WireMessage::Destroy {
                entity_ids: entity_ids.clone(),
            },
        };

        vec![message]
    }
}
