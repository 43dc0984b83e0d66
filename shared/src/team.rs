//! Named groups ("teams") and their display attributes.

use serde::{Deserialize, Serialize};

/// Color applied to member names of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TeamColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
    #[default]
    Reset,
}

impl TeamColor {
    /// Index used on the wire; the reset color is `-1`.
    pub fn index(&self) -> i32 {
        match self {
            TeamColor::Reset => -1,
            other => *other as i32,
        }
    }

    /// The style code character for this color.
    pub fn code(&self) -> char {
        match self {
            TeamColor::Reset => 'r',
            other => {
                let index = *other as u32;
                std::char::from_digit(index, 16).unwrap_or('r')
            }
        }
    }
}

/// Whether members of a team push other entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CollisionRule {
    #[default]
    Always,
    Never,
    PushOtherTeams,
    PushOwnTeam,
}

impl CollisionRule {
    pub fn wire_name(&self) -> &'static str {
        match self {
            CollisionRule::Always => "always",
            CollisionRule::Never => "never",
            CollisionRule::PushOtherTeams => "pushOtherTeams",
            CollisionRule::PushOwnTeam => "pushOwnTeam",
        }
    }
}

/// Visibility of name tags or death messages of team members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisibilityRule {
    #[default]
    Always,
    Never,
    HideForOtherTeams,
    HideForOwnTeam,
}

impl VisibilityRule {
    pub fn wire_name(&self) -> &'static str {
        match self {
            VisibilityRule::Always => "always",
            VisibilityRule::Never => "never",
            VisibilityRule::HideForOtherTeams => "hideForOtherTeams",
            VisibilityRule::HideForOwnTeam => "hideForOwnTeam",
        }
    }
}

/// Style attributes of a team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamOptions {
    pub prefix: String,
    pub suffix: String,
    pub color: TeamColor,
    pub friendly_fire: bool,
    pub see_friendly_invisibles: bool,
    pub collision_rule: CollisionRule,
    pub name_tag_visibility: VisibilityRule,
    pub death_message_visibility: VisibilityRule,
}

impl Default for TeamOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            color: TeamColor::Reset,
            friendly_fire: true,
            see_friendly_invisibles: true,
            collision_rule: CollisionRule::Always,
            name_tag_visibility: VisibilityRule::Always,
            death_message_visibility: VisibilityRule::Always,
        }
    }
}

impl TeamOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_color(mut self, color: TeamColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_friendly_fire(mut self, friendly_fire: bool) -> Self {
        self.friendly_fire = friendly_fire;
        self
    }

    pub fn with_see_friendly_invisibles(mut self, see: bool) -> Self {
        self.see_friendly_invisibles = see;
        self
    }

    pub fn with_collision_rule(mut self, rule: CollisionRule) -> Self {
        self.collision_rule = rule;
        self
    }

    pub fn with_name_tag_visibility(mut self, rule: VisibilityRule) -> Self {
        self.name_tag_visibility = rule;
        self
    }

    pub fn with_death_message_visibility(mut self, rule: VisibilityRule) -> Self {
        self.death_message_visibility = rule;
        self
    }

    /// Packed friendly-fire / see-invisibles flags byte.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.friendly_fire {
            flags |= 0x01;
        }
        if self.see_friendly_invisibles {
            flags |= 0x02;
        }
        flags
    }
}

/// A named group object as the client knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub options: TeamOptions,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: TeamOptions::default(),
        }
    }

    pub fn with_options(name: impl Into<String>, options: TeamOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_codes() {
        assert_eq!(TeamColor::Black.code(), '0');
        assert_eq!(TeamColor::Green.code(), 'a');
        assert_eq!(TeamColor::White.code(), 'f');
        assert_eq!(TeamColor::Reset.code(), 'r');
        assert_eq!(TeamColor::Reset.index(), -1);
        assert_eq!(TeamColor::Yellow.index(), 14);
    }

    #[test]
    fn test_default_options() {
        let options = TeamOptions::default();
        assert!(options.prefix.is_empty());
        assert_eq!(options.flags(), 0x03);
        assert_eq!(options.collision_rule.wire_name(), "always");
    }

    #[test]
    fn test_option_chaining() {
        let options = TeamOptions::default()
            .with_prefix("[A] ")
            .with_friendly_fire(false)
            .with_collision_rule(CollisionRule::Never)
            .with_name_tag_visibility(VisibilityRule::Never);

        assert_eq!(options.prefix, "[A] ");
        assert_eq!(options.flags(), 0x02);
        assert_eq!(options.collision_rule, CollisionRule::Never);
        assert_eq!(options.name_tag_visibility.wire_name(), "never");
    }
}
