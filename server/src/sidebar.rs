//! The sidebar: one objective whose lines are backed by fixed teams
//!
//! Line `i` is the invisible score entry `§i` with score `count - i`, so the
//! client sorts lines top to bottom. The visible text lives in the prefix
//! and suffix of team `sidebar_i`, which has the entry as its only member;
//! changing a line is a single team update.

use crate::client_manager::Client;
use crate::error::{ConfigError, DisplayError};
use crate::identity::{sidebar_score_entry, sidebar_team_name, SIDEBAR_POOL_SIZE};
use crate::line_diff::{split_line, CycleReport, LineContent, LineOptions, LineSurface, LineSync};
use crate::transport::{ProtocolProfile, Transport};
use log::{info, warn};
use shared::style::truncate_styled;
use shared::{DisplayPacket, ScoreboardAction, ScoreboardPosition, Team, TeamOptions};

/// Objective name of the sidebar.
pub const SIDEBAR_OBJECTIVE: &str = "sidebar";

/// Key used for the sidebar in logs and errors.
pub const SIDEBAR_KEY: &str = "sidebar";

#[derive(Debug)]
pub struct SidebarConfig {
    pub title: String,
    pub content: LineContent,
}

impl SidebarConfig {
    pub fn new<I, S>(title: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            content: LineContent::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

impl LineOptions for SidebarConfig {
    fn content_mut(&mut self) -> &mut LineContent {
        &mut self.content
    }
}

/// Messages of the sidebar for one protocol profile.
#[derive(Debug)]
struct SidebarSurface {
    title: String,
    line_count: usize,
    max_affix_length: Option<usize>,
}

impl SidebarSurface {
    fn team(&self, index: usize, line: &str) -> Team {
        let (prefix, suffix) = split_line(line, self.max_affix_length);
        Team::with_options(
            sidebar_team_name(index),
            TeamOptions::default().with_prefix(prefix).with_suffix(suffix),
        )
    }
}

impl LineSurface for SidebarSurface {
    fn create_batch(&self, lines: Option<&[String]>) -> Vec<DisplayPacket> {
        let mut batch = vec![
            DisplayPacket::ObjectiveAction {
                objective: SIDEBAR_OBJECTIVE.to_string(),
                title: self.title.clone(),
                action: ScoreboardAction::Create,
            },
            DisplayPacket::DisplayObjective {
                objective: SIDEBAR_OBJECTIVE.to_string(),
                position: ScoreboardPosition::Sidebar,
            },
        ];

        for index in 0..self.line_count {
            let entry = sidebar_score_entry(index);
            let text = lines
                .and_then(|lines| lines.get(index))
                .map(String::as_str)
                .unwrap_or("");
            let team = self.team(index, text);
            let team_name = team.name.clone();

            batch.push(DisplayPacket::SetScore {
                objective: SIDEBAR_OBJECTIVE.to_string(),
                entry: entry.clone(),
                score: (self.line_count - index) as i32,
            });
            batch.push(DisplayPacket::TeamAction {
                team,
                action: ScoreboardAction::Create,
            });
            batch.push(DisplayPacket::TeamMembers {
                team: team_name,
                members: vec![entry],
                add: true,
            });
        }

        batch
    }

    fn line_update(&self, index: usize, line: &str) -> DisplayPacket {
        DisplayPacket::TeamAction {
            team: self.team(index, line),
            action: ScoreboardAction::Update,
        }
    }

    fn destroy_batch(&self) -> Vec<DisplayPacket> {
        let mut batch = vec![DisplayPacket::ObjectiveAction {
            objective: SIDEBAR_OBJECTIVE.to_string(),
            title: String::new(),
            action: ScoreboardAction::Remove,
        }];
        batch.extend((0..self.line_count).map(|index| DisplayPacket::TeamAction {
            team: Team::new(sidebar_team_name(index)),
            action: ScoreboardAction::Remove,
        }));
        batch
    }
}

/// The active sidebar and its per-client state.
#[derive(Debug)]
pub struct Sidebar {
    surface: SidebarSurface,
    content: LineContent,
    sync: LineSync,
}

impl Sidebar {
    /// Validates `config` for `profile`.
    ///
    /// More lines than the pool holds are cut off; the title is shortened to
    /// the protocol limit without leaving half an escape behind.
    pub fn new(mut config: SidebarConfig, profile: ProtocolProfile) -> Result<Self, ConfigError> {
        config.content.validate(SIDEBAR_KEY)?;

        if config.content.lines.len() > SIDEBAR_POOL_SIZE {
            warn!(
                "Sidebar has {} lines, only the first {} are shown",
                config.content.lines.len(),
                SIDEBAR_POOL_SIZE
            );
            config.content.lines.truncate(SIDEBAR_POOL_SIZE);
        }

        let title = match profile.max_objective_title_length {
            Some(max) => truncate_styled(&config.title, max),
            None => config.title,
        };

        info!(
            "Sidebar set with {} lines ({} mode)",
            config.content.lines.len(),
            if config.content.is_per_client() {
                "per-client"
            } else {
                "general"
            }
        );

        Ok(Self {
            surface: SidebarSurface {
                title,
                line_count: config.content.lines.len(),
                max_affix_length: profile.max_team_affix_length,
            },
            sync: LineSync::new(config.content.is_per_client()),
            content: config.content,
        })
    }

    /// Runs one update cycle for the connected `clients`.
    pub fn update<T: Transport + ?Sized>(
        &mut self,
        clients: &[&Client],
        transport: &mut T,
    ) -> Result<CycleReport, DisplayError> {
        self.sync
            .run_cycle(SIDEBAR_KEY, &self.surface, &mut self.content, clients, transport)
    }

    /// Drops the state of a client that left.
    pub fn forget(&mut self, client: shared::ClientId) -> bool {
        self.sync.forget(client)
    }

    /// Removes the sidebar from every client that shows it.
    pub fn destroy<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        self.sync.destroy_all(&self.surface, transport)
    }

    pub fn title(&self) -> &str {
        &self.surface.title
    }

    pub fn line_count(&self) -> usize {
        self.surface.line_count
    }

    pub fn update_interval(&self) -> Option<u32> {
        self.content.update_interval
    }

    pub fn is_initialized(&self, client: shared::ClientId) -> bool {
        self.sync.is_initialized(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Outbox;
    use shared::{Location, ProtocolVersion};

    fn client(id: u32) -> Client {
        Client::new(id, format!("player{}", id), Location::new("world", 0.0, 64.0, 0.0))
    }

    fn legacy() -> ProtocolProfile {
        ProtocolProfile::for_version(ProtocolVersion::Legacy)
    }

    #[test]
    fn test_create_batch_layout() {
        let mut sidebar = Sidebar::new(SidebarConfig::new("Stats", ["a", "b"]), legacy()).unwrap();
        let mut outbox = Outbox::new(ProtocolVersion::Legacy);
        let viewer = client(1);

        sidebar.update(&[&viewer], &mut outbox).unwrap();

        let kinds: Vec<&str> = outbox.packets_for(1).iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "objective",
                "display_objective",
                "set_score",
                "team",
                "team_members",
                "set_score",
                "team",
                "team_members",
            ]
        );

        match outbox.packets_for(1)[2] {
            DisplayPacket::SetScore { entry, score, .. } => {
                assert_eq!(entry, "§0");
                assert_eq!(*score, 2);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
        match outbox.packets_for(1)[3] {
            DisplayPacket::TeamAction { team, action } => {
                assert_eq!(team.name, "sidebar_0");
                assert_eq!(team.options.prefix, "a");
                assert_eq!(*action, ScoreboardAction::Create);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_update_sends_changed_line_only() {
        let mut sidebar =
            Sidebar::new(SidebarConfig::new("Stats", ["a", "b", "c"]), legacy()).unwrap();
        let mut outbox = Outbox::new(ProtocolVersion::Legacy);
        let viewer = client(1);

        sidebar.update(&[&viewer], &mut outbox).unwrap();
        outbox.drain();

        sidebar.content.lines[1] = "x".to_string();
        sidebar.update(&[&viewer], &mut outbox).unwrap();

        let packets = outbox.packets_for(1);
        assert_eq!(packets.len(), 1);
        match packets[0] {
            DisplayPacket::TeamAction { team, action } => {
                assert_eq!(team.name, "sidebar_1");
                assert_eq!(team.options.prefix, "x");
                assert_eq!(*action, ScoreboardAction::Update);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_per_client_create_uses_blank_teams() {
        let config = SidebarConfig::new("Stats", ["Hi"])
            .with_client_modifier(|client: &Client, lines: &[String]| {
                Ok(vec![format!("{} {}", lines[0], client.name)])
            });
        let mut sidebar = Sidebar::new(config, legacy()).unwrap();
        let mut outbox = Outbox::new(ProtocolVersion::Legacy);
        let viewer = client(3);

        sidebar.update(&[&viewer], &mut outbox).unwrap();

        let packets = outbox.packets_for(3);
        match packets[3] {
            DisplayPacket::TeamAction { team, .. } => assert_eq!(team.options.prefix, ""),
            other => panic!("Unexpected packet {:?}", other),
        }
        match packets.last().unwrap() {
            DisplayPacket::TeamAction { team, action } => {
                assert_eq!(team.options.prefix, "Hi player3");
                assert_eq!(*action, ScoreboardAction::Update);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_long_lines_split_on_legacy() {
        let mut sidebar = Sidebar::new(
            SidebarConfig::new("Stats", ["§aabcdefghijklmnopqr"]),
            legacy(),
        )
        .unwrap();
        let mut outbox = Outbox::new(ProtocolVersion::Legacy);

        sidebar.update(&[&client(1)], &mut outbox).unwrap();

        match outbox.packets_for(1)[3] {
            DisplayPacket::TeamAction { team, .. } => {
                assert_eq!(team.options.prefix, "§aabcdefghijklmn");
                assert_eq!(team.options.suffix, "§ropqr");
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_title_truncated_on_legacy() {
        let title = format!("{}§6Gold", "t".repeat(31));
        let sidebar = Sidebar::new(SidebarConfig::new(title, ["a"]), legacy()).unwrap();
        assert_eq!(sidebar.title(), "t".repeat(31));

        let modern = ProtocolProfile::for_version(ProtocolVersion::Modern);
        let long_title = "t".repeat(64);
        let sidebar = Sidebar::new(SidebarConfig::new(long_title.clone(), ["a"]), modern).unwrap();
        assert_eq!(sidebar.title(), long_title);
    }

    #[test]
    fn test_too_many_lines_truncated() {
        let lines: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let sidebar = Sidebar::new(SidebarConfig::new("Stats", lines), legacy()).unwrap();
        assert_eq!(sidebar.line_count(), SIDEBAR_POOL_SIZE);
    }

    #[test]
    fn test_empty_sidebar_rejected() {
        let lines: Vec<String> = Vec::new();
        let error = Sidebar::new(SidebarConfig::new("Stats", lines), legacy()).unwrap_err();
        assert_eq!(
            error,
            ConfigError::EmptyLines {
                key: SIDEBAR_KEY.to_string()
            }
        );
    }

    #[test]
    fn test_destroy_reaches_initialized_clients() {
        let mut sidebar = Sidebar::new(SidebarConfig::new("Stats", ["a", "b"]), legacy()).unwrap();
        let mut outbox = Outbox::new(ProtocolVersion::Legacy);
        let viewer = client(1);

        sidebar.update(&[&viewer], &mut outbox).unwrap();
        outbox.drain();

        assert_eq!(sidebar.destroy(&mut outbox), 1);
        let packets = outbox.packets_for(1);
        assert_eq!(packets.len(), 3);
        assert!(matches!(
            packets[0],
            DisplayPacket::ObjectiveAction {
                action: ScoreboardAction::Remove,
                ..
            }
        ));
        assert!(!sidebar.is_initialized(1));
    }
}
