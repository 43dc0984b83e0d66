use super::{LegacyEncoder, ProtocolEncoder};
use shared::wire::{MetaEntry, MetaValue, WireTeamInfo};
use shared::geometry::angle_to_byte;
use shared::{
    DisplayPacket, EntityMetadata, ProtocolVersion, ScoreboardAction, Team, WireMessage,
};

const ARMOR_STAND_TYPE: i32 = 1;

const INDEX_FLAGS: u8 = 0;
const INDEX_CUSTOM_NAME: u8 = 2;
const INDEX_CUSTOM_NAME_VISIBLE: u8 = 3;
const INDEX_POSE: u8 = 6;
const INDEX_ARMOR_STAND_FLAGS: u8 = 14;
const INDEX_SKIN_PARTS: u8 = 16;

const POSE_STANDING: i32 = 0;
const POSE_CROUCHING: i32 = 5;

/// Wraps legacy styled text into a chat component.
fn component(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

/// Encoder for the modern protocol: chat components, pose metadata and the
/// newer entity type registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernEncoder;

impl ModernEncoder {
    fn team_info(team: &Team) -> WireTeamInfo {
        let options = &team.options;
        WireTeamInfo {
            display_name: component(&team.name),
            prefix: component(&options.prefix),
            suffix: component(&options.suffix),
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
                value: MetaValue::OptionalText(Some(component(name))),
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
            let pose = if metadata.crouching {
                POSE_CROUCHING
            } else {
                POSE_STANDING
            };
            entries.push(MetaEntry {
                index: INDEX_POSE,
                value: MetaValue::Pose(pose),
            });
            entries.push(MetaEntry {
                index: INDEX_SKIN_PARTS,
                value: MetaValue::Byte(parts),
            });
        }

        entries
    }
}

impl ProtocolEncoder for ModernEncoder {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Modern
    }

    fn encode(&self, packet: &DisplayPacket) -> Vec<WireMessage> {
        match packet {
            DisplayPacket::ObjectiveAction {
                objective,
                title,
                action,
            } => vec![WireMessage::Objective {
                name: objective.clone(),
                display_name: component(title),
                mode: action.mode(),
            }],
            DisplayPacket::TeamAction { team, action } => vec![WireMessage::Team {
                name: team.name.clone(),
                mode: action.mode(),
                info: match action {
                    ScoreboardAction::Remove => None,
                    _ => Some(Self::team_info(team)),
                },
                members: Vec::new(),
            }],
            DisplayPacket::SpawnMarker {
                entity_id,
                location,
            } => vec![WireMessage::SpawnLiving {
                entity_id: *entity_id,
                type_id: ARMOR_STAND_TYPE,
                x: location.x,
                y: location.y,
                z: location.z,
                yaw: angle_to_byte(location.yaw),
                pitch: angle_to_byte(location.pitch),
                head_yaw: angle_to_byte(location.yaw),
            }],
            DisplayPacket::EntityMetadata {
                entity_id,
                metadata,
            } => vec![WireMessage::Metadata {
                entity_id: *entity_id,
                entries: Self::metadata(metadata),
            }],
            // Unchanged between versions
            _ => LegacyEncoder.encode(packet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TeamOptions;

    #[test]
    fn test_text_is_wrapped_in_components() {
        let encoded = ModernEncoder.encode(&DisplayPacket::ObjectiveAction {
            objective: "sidebar".to_string(),
            title: "§6Stats".to_string(),
            action: ScoreboardAction::Create,
        });

        match &encoded[0] {
            WireMessage::Objective { display_name, .. } => {
                let parsed: serde_json::Value = serde_json::from_str(display_name).unwrap();
                assert_eq!(parsed["text"], "§6Stats");
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_team_prefix_component() {
        let team = Team::with_options("t", TeamOptions::default().with_prefix("a\"b"));
        let encoded = ModernEncoder.encode(&DisplayPacket::TeamAction {
            team,
            action: ScoreboardAction::Update,
        });

        match &encoded[0] {
            WireMessage::Team { mode, info, .. } => {
                assert_eq!(*mode, 2);
                let prefix = &info.as_ref().unwrap().prefix;
                let parsed: serde_json::Value = serde_json::from_str(prefix).unwrap();
                assert_eq!(parsed["text"], "a\"b");
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_actor_metadata_carries_pose() {
        let encoded = ModernEncoder.encode(&DisplayPacket::EntityMetadata {
            entity_id: 3,
            metadata: EntityMetadata::actor(true, 0x7e),
        });

        match &encoded[0] {
            WireMessage::Metadata { entries, .. } => {
                assert!(entries.contains(&MetaEntry {
                    index: INDEX_POSE,
                    value: MetaValue::Pose(POSE_CROUCHING),
                }));
                assert!(entries.contains(&MetaEntry {
                    index: INDEX_SKIN_PARTS,
                    value: MetaValue::Byte(0x7e),
                }));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_shared_shapes_match_legacy() {
        let packet = DisplayPacket::DestroyEntities {
            entity_ids: vec![1, 2, 3],
        };
        assert_eq!(ModernEncoder.encode(&packet), LegacyEncoder.encode(&packet));
    }
}
