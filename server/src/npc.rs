//! Player shaped actors shown per client
//!
//! Every actor owns a [`VisibilityTracker`]. The messages that spawn,
//! rotate, crouch and destroy an actor on one client are built here; when to
//! send them is decided by the context from client events.

use crate::client_manager::Client;
use crate::error::ConfigError;
use crate::identity::FlagTeams;
use crate::visibility::{Eligibility, Transition, VisibilityRules, VisibilityTracker};
use log::{debug, info};
use shared::{
    ActorProfile, ClientId, DisplayPacket, EntityMetadata, Location, UseAction, PLAYER_EYE_HEIGHT,
};
use std::collections::HashSet;
use std::fmt;

/// Every skin part except the cape.
pub const DEFAULT_SKIN_PARTS: u8 = 0x7E;

/// Ticks a client has to wait between two use interactions.
pub const DEFAULT_LISTENER_COOLDOWN: u64 = 20;

/// Skin texture and the enabled skin layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcSkin {
    pub texture: String,
    pub signature: String,
    pub parts: u8,
}

impl NpcSkin {
    pub fn new(texture: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            signature: signature.into(),
            parts: DEFAULT_SKIN_PARTS,
        }
    }

    pub fn with_parts(mut self, parts: u8) -> Self {
        self.parts = parts;
        self
    }
}

impl Default for NpcSkin {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Called when a client uses an actor.
pub type UseListener = Box<dyn FnMut(&Client) + Send>;

pub struct NpcConfig {
    pub identifier: String,
    pub name: String,
    pub skin: NpcSkin,
    pub location: Location,
    pub eligibility: Eligibility,
    pub crouching: bool,
    pub collidable: bool,
    pub name_tag_visible: bool,
    pub look_at_client: bool,
    pub mirror_crouch: bool,
    /// Falls back to the engine default when `None`
    pub max_distance_squared: Option<f64>,
    /// Falls back to the engine default when `None`
    pub max_view_angle_cos: Option<f64>,
    pub use_listener: Option<UseListener>,
    pub listener_cooldown: u64,
}

impl NpcConfig {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, location: Location) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            skin: NpcSkin::default(),
            location,
            eligibility: Eligibility::everyone(),
            crouching: false,
            collidable: true,
            name_tag_visible: true,
            look_at_client: false,
            mirror_crouch: false,
            max_distance_squared: None,
            max_view_angle_cos: None,
            use_listener: None,
            listener_cooldown: DEFAULT_LISTENER_COOLDOWN,
        }
    }

    pub fn with_skin(mut self, skin: NpcSkin) -> Self {
        self.skin = skin;
        self
    }

    /// Restricts the actor to the given clients.
    pub fn with_included<I: IntoIterator<Item = ClientId>>(mut self, clients: I) -> Self {
        self.eligibility.include = Some(clients.into_iter().collect());
        self
    }

    pub fn with_excluded<I: IntoIterator<Item = ClientId>>(mut self, clients: I) -> Self {
        self.eligibility.exclude = clients.into_iter().collect();
        self
    }

    pub fn with_crouching(mut self, crouching: bool) -> Self {
        self.crouching = crouching;
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    pub fn with_name_tag_visible(mut self, visible: bool) -> Self {
        self.name_tag_visible = visible;
        self
    }

    pub fn with_look_at_client(mut self, look: bool) -> Self {
        self.look_at_client = look;
        self
    }

    pub fn with_mirror_crouch(mut self, mirror: bool) -> Self {
        self.mirror_crouch = mirror;
        self
    }

    pub fn with_max_distance_squared(mut self, distance_squared: f64) -> Self {
        self.max_distance_squared = Some(distance_squared);
        self
    }

    pub fn with_max_view_angle_cos(mut self, cos: f64) -> Self {
        self.max_view_angle_cos = Some(cos);
        self
    }

    pub fn with_use_listener<F>(mut self, listener: F) -> Self
    where
        F: FnMut(&Client) + Send + 'static,
    {
        self.use_listener = Some(Box::new(listener));
        self
    }

    /// Cooldown in ticks; values below one are raised to one.
    pub fn with_listener_cooldown(mut self, ticks: u64) -> Self {
        self.listener_cooldown = ticks;
        self
    }
}

impl fmt::Debug for NpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NpcConfig")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("listener_cooldown", &self.listener_cooldown)
            .finish_non_exhaustive()
    }
}

/// What a visibility change produced for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    pub transition: Transition,
    pub packets: Vec<DisplayPacket>,
}

pub struct Npc {
    identifier: String,
    entity_id: i32,
    profile: ActorProfile,
    location: Location,
    eligibility: Eligibility,
    crouching: bool,
    collidable: bool,
    name_tag_visible: bool,
    look_at_client: bool,
    mirror_crouch: bool,
    skin_parts: u8,
    tracker: VisibilityTracker,
    use_listener: Option<UseListener>,
    listener_cooldown: u64,
    /// Clients whose use interactions are ignored until their cooldown ends
    cooling_down: HashSet<ClientId>,
}

impl Npc {
    pub fn new(
        config: NpcConfig,
        entity_id: i32,
        uuid: u128,
        defaults: VisibilityRules,
    ) -> Result<Self, ConfigError> {
        let rules = VisibilityRules {
            max_distance_squared: config
                .max_distance_squared
                .unwrap_or(defaults.max_distance_squared),
            max_view_angle_cos: config
                .max_view_angle_cos
                .unwrap_or(defaults.max_view_angle_cos),
        };
        rules.validate(&config.identifier)?;

        info!(
            "NPC '{}' added as entity {} in world '{}'",
            config.identifier, entity_id, config.location.world
        );

        Ok(Self {
            profile: ActorProfile {
                uuid,
                name: config.name,
                texture: config.skin.texture,
                signature: config.skin.signature,
            },
            identifier: config.identifier,
            entity_id,
            location: config.location,
            eligibility: config.eligibility,
            crouching: config.crouching,
            collidable: config.collidable,
            name_tag_visible: config.name_tag_visible,
            look_at_client: config.look_at_client,
            mirror_crouch: config.mirror_crouch,
            skin_parts: config.skin.parts,
            tracker: VisibilityTracker::new(rules),
            use_listener: config.use_listener,
            listener_cooldown: config.listener_cooldown.max(1),
            cooling_down: HashSet::new(),
        })
    }

    /// Re-evaluates `client` and builds the spawn or destroy batch for it.
    ///
    /// Head rotation and crouch posture are not remembered per client. Every
    /// spawn batch carries the current facing, and look or crouch events are
    /// sent as they happen, so a visibility flip leaves nothing to reset.
    pub fn update_visibility(&mut self, client: &Client, flag_teams: &FlagTeams) -> VisibilityChange {
        let transition = self
            .tracker
            .evaluate(&self.location, &self.eligibility, client);

        let packets = match transition {
            Transition::BecameVisible => {
                debug!("NPC '{}' now visible to client {}", self.identifier, client.id);
                self.spawn_batch(client, flag_teams)
            }
            Transition::BecameInvisible => {
                debug!("NPC '{}' hidden from client {}", self.identifier, client.id);
                self.destroy_batch()
            }
            Transition::NoChange => Vec::new(),
        };

        VisibilityChange { transition, packets }
    }

    fn spawn_batch(&self, client: &Client, flag_teams: &FlagTeams) -> Vec<DisplayPacket> {
        let team = flag_teams.team_for(self.collidable, self.name_tag_visible);
        let mut batch = vec![
            DisplayPacket::PlayerInfo {
                profile: self.profile.clone(),
                add: true,
            },
            DisplayPacket::SpawnActor {
                entity_id: self.entity_id,
                uuid: self.profile.uuid,
                location: self.location.clone(),
            },
            DisplayPacket::EntityMetadata {
                entity_id: self.entity_id,
                metadata: EntityMetadata::actor(self.crouching, self.skin_parts),
            },
            DisplayPacket::HeadRotation {
                entity_id: self.entity_id,
                yaw: self.location.yaw,
            },
            DisplayPacket::TeamMembers {
                team: team.name.clone(),
                members: vec![self.profile.name.clone()],
                add: true,
            },
        ];

        if self.look_at_client {
            batch.extend(self.rotation_towards(client));
        }
        if self.mirror_crouch {
            batch.push(self.crouch_metadata(client.crouching));
        }
        batch
    }

    pub fn destroy_batch(&self) -> Vec<DisplayPacket> {
        vec![DisplayPacket::DestroyEntities {
            entity_ids: vec![self.entity_id],
        }]
    }

    /// Removes the actor's profile from the client list once it has spawned.
    pub fn profile_removal(&self) -> Vec<DisplayPacket> {
        vec![DisplayPacket::PlayerInfo {
            profile: self.profile.clone(),
            add: false,
        }]
    }

    /// Turns the actor's head towards `client`, if the client sees it.
    pub fn look_at(&self, client: &Client) -> Option<Vec<DisplayPacket>> {
        if !self.tracker.is_visible(client.id) {
            return None;
        }
        Some(self.rotation_towards(client))
    }

    fn rotation_towards(&self, client: &Client) -> Vec<DisplayPacket> {
        let eye = self.location.eye(PLAYER_EYE_HEIGHT);
        let towards = client.eye_location().position().sub(&eye.position());
        let (yaw, pitch) = eye.rotation_towards(&towards);

        vec![
            DisplayPacket::EntityLook {
                entity_id: self.entity_id,
                yaw,
                pitch,
                on_ground: true,
            },
            DisplayPacket::HeadRotation {
                entity_id: self.entity_id,
                yaw,
            },
        ]
    }

    /// Shows the actor crouching like `client`, if the client sees it.
    pub fn mirror_crouch(&self, client: &Client, crouching: bool) -> Option<Vec<DisplayPacket>> {
        if !self.tracker.is_visible(client.id) {
            return None;
        }
        Some(vec![self.crouch_metadata(crouching)])
    }

    fn crouch_metadata(&self, crouching: bool) -> DisplayPacket {
        DisplayPacket::EntityMetadata {
            entity_id: self.entity_id,
            metadata: EntityMetadata::actor(crouching, self.skin_parts),
        }
    }

    /// Handles a use interaction by `client`.
    ///
    /// Returns the cooldown after which [`Npc::clear_cooldown`] must be
    /// called, or `None` when the interaction was ignored.
    pub fn on_use(&mut self, client: &Client, action: UseAction) -> Option<u64> {
        if action == UseAction::Attack {
            return None;
        }
        let listener = self.use_listener.as_mut()?;
        if !self.cooling_down.insert(client.id) {
            return None;
        }

        debug!("Client {} used NPC '{}'", client.id, self.identifier);
        listener(client);
        Some(self.listener_cooldown)
    }

    pub fn clear_cooldown(&mut self, client: ClientId) -> bool {
        self.cooling_down.remove(&client)
    }

    /// Drops all state about a client that left.
    pub fn forget(&mut self, client: ClientId) {
        self.tracker.forget(client);
        self.cooling_down.remove(&client);
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn entity_id(&self) -> i32 {
        self.entity_id
    }

    pub fn profile(&self) -> &ActorProfile {
        &self.profile
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn looks_at_client(&self) -> bool {
        self.look_at_client
    }

    pub fn mirrors_crouch(&self) -> bool {
        self.mirror_crouch
    }

    pub fn listener_cooldown(&self) -> u64 {
        self.listener_cooldown
    }

    pub fn is_visible(&self, client: ClientId) -> bool {
        self.tracker.is_visible(client)
    }

    pub fn viewers(&self) -> Vec<ClientId> {
        self.tracker.viewers()
    }
}

impl fmt::Debug for Npc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Npc")
            .field("identifier", &self.identifier)
            .field("entity_id", &self.entity_id)
            .field("location", &self.location)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
