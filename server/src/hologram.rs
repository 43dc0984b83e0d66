//! Holograms: floating text built from one invisible marker actor per line
//!
//! Lines are stacked downwards with a fixed spacing. Only clients in the
//! hologram's world are eligible; a client that changes world loses the
//! actors on its side and gets them back from the retained snapshot when it
//! returns.

use crate::client_manager::Client;
use crate::error::{ConfigError, DisplayError};
use crate::line_diff::{CycleReport, LineContent, LineOptions, LineSurface, LineSync};
use crate::transport::Transport;
use log::{debug, info};
use shared::{ClientId, DisplayPacket, EntityMetadata, Location};

/// Vertical distance between two lines.
pub const LINE_SPACING: f64 = 0.25;

/// Height of a marker's name tag above its position.
pub const NAME_TAG_OFFSET: f64 = 0.5;

/// Where the lines sit relative to the hologram location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlignment {
    /// First line directly below the location
    Top,
    /// Lines centered around the location
    #[default]
    Center,
    /// Last line directly above the location
    Bottom,
}

impl VerticalAlignment {
    /// Height of the first line's name tag relative to the location.
    fn top_offset(&self, line_count: usize) -> f64 {
        let height = line_count.saturating_sub(1) as f64 * LINE_SPACING;
        match self {
            VerticalAlignment::Top => 0.0,
            VerticalAlignment::Center => height / 2.0,
            VerticalAlignment::Bottom => height,
        }
    }
}

#[derive(Debug)]
pub struct HologramConfig {
    pub identifier: String,
    pub location: Location,
    pub alignment: VerticalAlignment,
    pub content: LineContent,
}

impl HologramConfig {
    pub fn new<I, S>(identifier: impl Into<String>, location: Location, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            location,
            alignment: VerticalAlignment::default(),
            content: LineContent::new(lines.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_alignment(mut self, alignment: VerticalAlignment) -> Self {
        self.alignment = alignment;
        self
    }
}

impl LineOptions for HologramConfig {
    fn content_mut(&mut self) -> &mut LineContent {
        &mut self.content
    }
}

#[derive(Debug)]
struct HologramSurface {
    /// Entity id and position of each line marker
    markers: Vec<(i32, Location)>,
}

impl HologramSurface {
    fn entity_ids(&self) -> Vec<i32> {
        self.markers.iter().map(|(entity_id, _)| *entity_id).collect()
    }
}

impl LineSurface for HologramSurface {
    fn create_batch(&self, lines: Option<&[String]>) -> Vec<DisplayPacket> {
        let mut batch = Vec::with_capacity(self.markers.len() * 2);
        for (index, (entity_id, location)) in self.markers.iter().enumerate() {
            batch.push(DisplayPacket::SpawnMarker {
                entity_id: *entity_id,
                location: location.clone(),
            });
            if let Some(line) = lines.and_then(|lines| lines.get(index)) {
                batch.push(self.line_update(index, line));
            }
        }
        batch
    }

    fn line_update(&self, index: usize, line: &str) -> DisplayPacket {
        DisplayPacket::EntityMetadata {
            entity_id: self.markers[index].0,
            metadata: EntityMetadata::marker_line(line),
        }
    }

    fn destroy_batch(&self) -> Vec<DisplayPacket> {
        vec![DisplayPacket::DestroyEntities {
            entity_ids: self.entity_ids(),
        }]
    }
}

#[derive(Debug)]
pub struct Hologram {
    identifier: String,
    location: Location,
    surface: HologramSurface,
    content: LineContent,
    sync: LineSync,
}

impl Hologram {
    /// Builds a hologram whose line markers use the ids
    /// `first_entity_id..first_entity_id + line_count`.
    pub fn new(config: HologramConfig, first_entity_id: i32) -> Result<Self, ConfigError> {
        config.content.validate(&config.identifier)?;

        let line_count = config.content.lines.len();
        let top = config.location.y - NAME_TAG_OFFSET + config.alignment.top_offset(line_count);
        let markers = (0..line_count)
            .map(|index| {
                let mut location = config.location.clone();
                location.y = top - index as f64 * LINE_SPACING;
                (first_entity_id + index as i32, location)
            })
            .collect();

        info!(
            "Hologram '{}' added with {} lines in world '{}'",
            config.identifier, line_count, config.location.world
        );

        Ok(Self {
            identifier: config.identifier,
            location: config.location,
            surface: HologramSurface { markers },
            sync: LineSync::new(config.content.is_per_client()),
            content: config.content,
        })
    }

    /// Runs one update cycle; clients outside the hologram's world are skipped.
    pub fn update<T: Transport + ?Sized>(
        &mut self,
        clients: &[&Client],
        transport: &mut T,
    ) -> Result<CycleReport, DisplayError> {
        let in_world: Vec<&Client> = clients
            .iter()
            .copied()
            .filter(|client| client.location.same_world(&self.location))
            .collect();

        self.sync.run_cycle(
            &self.identifier,
            &self.surface,
            &mut self.content,
            &in_world,
            transport,
        )
    }

    /// Handles `client` arriving in a new world.
    ///
    /// Returns true when a regular cycle is needed to show the hologram.
    pub fn client_changed_world<T: Transport + ?Sized>(
        &mut self,
        client: &Client,
        transport: &mut T,
    ) -> bool {
        if !client.location.same_world(&self.location) {
            // The client dropped the markers together with the old world
            self.sync.forget(client.id);
            return false;
        }

        match self.content.viewers.admits(client.id) {
            Some(false) => false,
            Some(true) => match self.sync.respawn(&self.surface, client.id) {
                Some(batch) => {
                    debug!(
                        "Respawning hologram '{}' for client {}",
                        self.identifier, client.id
                    );
                    transport.send(client.id, batch);
                    false
                }
                None => true,
            },
            None => true,
        }
    }

    pub fn forget(&mut self, client: ClientId) -> bool {
        self.sync.forget(client)
    }

    /// Destroys the markers on every client that shows them.
    pub fn destroy<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        self.sync.destroy_all(&self.surface, transport)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn entity_ids(&self) -> Vec<i32> {
        self.surface.entity_ids()
    }

    pub fn line_locations(&self) -> Vec<&Location> {
        self.surface
            .markers
            .iter()
            .map(|(_, location)| location)
            .collect()
    }

    pub fn update_interval(&self) -> Option<u32> {
        self.content.update_interval
    }

    pub fn is_initialized(&self, client: ClientId) -> bool {
        self.sync.is_initialized(client)
    }
}
