//! Named group handles and the uniqueness of their names
//!
//! Group names share one namespace on a client, so the engine keeps a single
//! registry of every name that is currently live. Fixed handles (the sidebar
//! line teams and the actor flag teams) are reserved up front; generated
//! handles draw a random suffix until the name is free.

use log::debug;
use rand::Rng;
use shared::{CollisionRule, DisplayPacket, ScoreboardAction, Team, TeamOptions, VisibilityRule};
use std::collections::HashSet;

/// Number of sidebar lines, and of the fixed handles backing them.
pub const SIDEBAR_POOL_SIZE: usize = 15;

/// Exclusive upper bound of generated name suffixes.
const SUFFIX_RANGE: u32 = 1_000_000;

/// Set of group names that exist right now.
#[derive(Debug, Default)]
pub struct NameRegistry {
    live: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a name `prefix + n` that no live handle uses and claims it.
    pub fn acquire<R: Rng + ?Sized>(&mut self, prefix: &str, rng: &mut R) -> String {
        loop {
            let name = format!("{}{}", prefix, rng.gen_range(0..SUFFIX_RANGE));
            if self.live.insert(name.clone()) {
                debug!("Acquired group name {}", name);
                return name;
            }
        }
    }

    /// Claims a fixed name. Returns false if it is already live.
    pub fn reserve(&mut self, name: impl Into<String>) -> bool {
        self.live.insert(name.into())
    }

    /// Frees a name. Returns false if it was not live.
    pub fn release(&mut self, name: &str) -> bool {
        self.live.remove(name)
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live.contains(name)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Name of the fixed team backing sidebar line `index`.
pub fn sidebar_team_name(index: usize) -> String {
    format!("sidebar_{}", index)
}

/// Invisible score entry of sidebar line `index`: a style escape `§0`..`§e`.
pub fn sidebar_score_entry(index: usize) -> String {
    let code = std::char::from_digit(index as u32, 16).unwrap_or('0');
    format!("§{}", code)
}

/// One of the four fixed actor teams.
#[derive(Debug, Clone)]
struct FlagTeam {
    collidable: bool,
    name_tag_visible: bool,
    team: Team,
}

impl FlagTeam {
    fn matches(&self, collidable: bool, name_tag_visible: bool) -> bool {
        self.collidable == collidable && self.name_tag_visible == name_tag_visible
    }
}

/// The four fixed teams that carry actor collision and name tag flags.
///
/// Created on every client when it connects and never released.
#[derive(Debug, Clone)]
pub struct FlagTeams {
    teams: Vec<FlagTeam>,
}

impl FlagTeams {
    pub fn new() -> Self {
        let teams = [
            (true, true, "npc_normal"),
            (false, true, "npc_nocoll"),
            (true, false, "npc_notag"),
            (false, false, "npc_nocoll_notag"),
        ]
        .into_iter()
        .map(|(collidable, name_tag_visible, name)| {
            let mut options = TeamOptions::default();
            if !collidable {
                options = options.with_collision_rule(CollisionRule::Never);
            }
            if !name_tag_visible {
                options = options.with_name_tag_visibility(VisibilityRule::Never);
            }
            FlagTeam {
                collidable,
                name_tag_visible,
                team: Team::with_options(name, options),
            }
        })
        .collect();

        Self { teams }
    }

    /// Claims the four names in `registry`.
    pub fn reserve_names(&self, registry: &mut NameRegistry) {
        for flag_team in &self.teams {
            registry.reserve(flag_team.team.name.clone());
        }
    }

    pub fn team_for(&self, collidable: bool, name_tag_visible: bool) -> &Team {
        // The four entries cover every flag combination
        self.teams
            .iter()
            .find(|flag_team| flag_team.matches(collidable, name_tag_visible))
            .map(|flag_team| &flag_team.team)
            .unwrap_or(&self.teams[0].team)
    }

    /// Messages that create all four teams on a client.
    pub fn create_batch(&self) -> Vec<DisplayPacket> {
        self.teams
            .iter()
            .map(|flag_team| DisplayPacket::TeamAction {
                team: flag_team.team.clone(),
                action: ScoreboardAction::Create,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.teams
            .iter()
            .map(|flag_team| flag_team.team.name.as_str())
            .collect()
    }
}

impl Default for FlagTeams {
    fn default() -> Self {
        Self::new()
    }
}
