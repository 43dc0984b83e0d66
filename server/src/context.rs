//! The display engine: every element, every client, one update thread
//!
//! `DisplayContext` owns the roster, the elements and the scheduler. It is
//! driven from outside by exactly two things:
//! - `tick()`, called once per server tick, which runs due update cycles and
//!   deferred follow-ups
//! - client events (connect, join finished, move, teleport, respawn, crouch,
//!   use, disconnect)
//!
//! All state is mutated on the caller's thread. Message batches are handed to
//! the [`Transport`] as soon as they are built.

use crate::client_manager::{Client, ClientManager};
use crate::config::DisplayConfig;
use crate::error::{ConfigError, DisplayError, InvariantViolation};
use crate::hologram::{Hologram, HologramConfig};
use crate::identity::{sidebar_team_name, FlagTeams, NameRegistry, SIDEBAR_POOL_SIZE};
use crate::npc::{Npc, NpcConfig, VisibilityChange};
use crate::scheduler::{TaskHandle, UpdateScheduler};
use crate::sidebar::{Sidebar, SidebarConfig};
use crate::tablist::{Tablist, TablistConfig};
use crate::transport::Transport;
use crate::visibility::{Transition, VisibilityRules};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ClientId, Location, UseAction};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Identifies one active element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKey {
    Sidebar,
    Tablist,
    Hologram(String),
    Npc(String),
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKey::Sidebar => write!(f, "sidebar"),
            ElementKey::Tablist => write!(f, "tablist"),
            ElementKey::Hologram(identifier) => write!(f, "hologram:{}", identifier),
            ElementKey::Npc(identifier) => write!(f, "npc:{}", identifier),
        }
    }
}

/// Configuration of any element, as accepted by [`DisplayContext::set_element`].
#[derive(Debug)]
pub enum ElementConfig {
    Sidebar(SidebarConfig),
    Tablist(TablistConfig),
    Hologram(HologramConfig),
    Npc(NpcConfig),
}

impl From<SidebarConfig> for ElementConfig {
    fn from(config: SidebarConfig) -> Self {
        ElementConfig::Sidebar(config)
    }
}

impl From<TablistConfig> for ElementConfig {
    fn from(config: TablistConfig) -> Self {
        ElementConfig::Tablist(config)
    }
}

impl From<HologramConfig> for ElementConfig {
    fn from(config: HologramConfig) -> Self {
        ElementConfig::Hologram(config)
    }
}

impl From<NpcConfig> for ElementConfig {
    fn from(config: NpcConfig) -> Self {
        ElementConfig::Npc(config)
    }
}

/// Deferred work run from the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    Update(ElementKey),
    RemoveActorProfile { npc: String, client: ClientId },
    ExpireCooldown { npc: String, client: ClientId },
    RefreshActors { client: ClientId },
}

impl Job {
    fn concerns_client(&self, id: ClientId) -> bool {
        match self {
            Job::Update(_) => false,
            Job::RemoveActorProfile { client, .. }
            | Job::ExpireCooldown { client, .. }
            | Job::RefreshActors { client } => *client == id,
        }
    }

    fn concerns_npc(&self, identifier: &str) -> bool {
        match self {
            Job::Update(ElementKey::Npc(npc))
            | Job::RemoveActorProfile { npc, .. }
            | Job::ExpireCooldown { npc, .. } => npc == identifier,
            _ => false,
        }
    }
}

/// Sends a visibility change and schedules the profile removal that follows
/// a spawn. Returns true when the client's view of the actor changed.
fn deliver_visibility<T: Transport + ?Sized>(
    transport: &mut T,
    scheduler: &mut UpdateScheduler<Job>,
    removal_delay: u64,
    npc: &str,
    client: ClientId,
    change: VisibilityChange,
) -> bool {
    match change.transition {
        Transition::NoChange => false,
        Transition::BecameVisible => {
            transport.send(client, change.packets);
            scheduler.schedule_delayed(
                Job::RemoveActorProfile {
                    npc: npc.to_string(),
                    client,
                },
                removal_delay,
            );
            true
        }
        Transition::BecameInvisible => {
            transport.send(client, change.packets);
            true
        }
    }
}

pub struct DisplayContext<T: Transport> {
    config: DisplayConfig,
    transport: T,
    clients: ClientManager,
    scheduler: UpdateScheduler<Job>,
    names: NameRegistry,
    rng: StdRng,
    next_entity_id: i32,
    flag_teams: FlagTeams,
    sidebar: Option<Sidebar>,
    tablist: Option<Tablist>,
    holograms: BTreeMap<String, Hologram>,
    npcs: BTreeMap<String, Npc>,
    /// Repeating update task of each element that has an interval
    update_tasks: HashMap<ElementKey, TaskHandle>,
    errors: Vec<DisplayError>,
}

impl<T: Transport> DisplayContext<T> {
    pub fn new(config: DisplayConfig, max_clients: usize, transport: T) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut names = NameRegistry::new();
        for index in 0..SIDEBAR_POOL_SIZE {
            names.reserve(sidebar_team_name(index));
        }
        let flag_teams = FlagTeams::new();
        flag_teams.reserve_names(&mut names);

        info!(
            "Display context ready for up to {} clients ({:?} protocol)",
            max_clients,
            transport.profile().version
        );

        Self {
            next_entity_id: config.first_entity_id,
            config,
            transport,
            clients: ClientManager::new(max_clients),
            scheduler: UpdateScheduler::new(),
            names,
            rng,
            flag_teams,
            sidebar: None,
            tablist: None,
            holograms: BTreeMap::new(),
            npcs: BTreeMap::new(),
            update_tasks: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Activates an element and shows it to the connected clients.
    ///
    /// The sidebar and the tablist replace the active one; holograms and
    /// NPCs must use a fresh identifier. Configuration errors leave
    /// everything as it was. A failing first cycle does not undo the
    /// element; the failure is queued for [`DisplayContext::take_errors`].
    pub fn set_element(&mut self, config: impl Into<ElementConfig>) -> Result<ElementKey, ConfigError> {
        let (key, interval) = match config.into() {
            ElementConfig::Sidebar(config) => {
                let sidebar = Sidebar::new(config, self.transport.profile())?;
                self.remove_element(&ElementKey::Sidebar);
                let interval = sidebar.update_interval();
                self.sidebar = Some(sidebar);
                (ElementKey::Sidebar, interval)
            }
            ElementConfig::Tablist(config) => {
                let tablist = Tablist::new(config)?;
                self.remove_element(&ElementKey::Tablist);
                let interval = tablist.update_interval();
                self.tablist = Some(tablist);
                (ElementKey::Tablist, interval)
            }
            ElementConfig::Hologram(config) => {
                let key = ElementKey::Hologram(config.identifier.clone());
                if self.holograms.contains_key(&config.identifier) {
                    return Err(ConfigError::DuplicateKey { key: key.to_string() });
                }

                let line_count = config.content.lines.len() as i32;
                let hologram = Hologram::new(config, self.next_entity_id)?;
                self.next_entity_id += line_count;

                let interval = hologram.update_interval();
                self.holograms
                    .insert(hologram.identifier().to_string(), hologram);
                (key, interval)
            }
            ElementConfig::Npc(config) => {
                let key = ElementKey::Npc(config.identifier.clone());
                if self.npcs.contains_key(&config.identifier) {
                    return Err(ConfigError::DuplicateKey { key: key.to_string() });
                }

                let defaults = VisibilityRules {
                    max_distance_squared: self.config.default_max_distance_squared,
                    max_view_angle_cos: self.config.default_max_view_angle_cos,
                };
                let uuid = self.rng.gen::<u128>();
                let npc = Npc::new(config, self.next_entity_id, uuid, defaults)?;
                self.next_entity_id += 1;

                self.npcs.insert(npc.identifier().to_string(), npc);
                (key, None)
            }
        };

        if let Some(interval) = interval {
            let handle = self
                .scheduler
                .schedule_repeating(Job::Update(key.clone()), u64::from(interval));
            self.update_tasks.insert(key.clone(), handle);
        }

        let result = self.update_element(&key);
        self.record(result);
        Ok(key)
    }

    /// Destroys an element on every client that shows it.
    ///
    /// Returns false if no element with that key was active.
    pub fn remove_element(&mut self, key: &ElementKey) -> bool {
        if let Some(handle) = self.update_tasks.remove(key) {
            self.scheduler.cancel(handle);
        }

        let removed = match key {
            ElementKey::Sidebar => match self.sidebar.take() {
                Some(mut sidebar) => {
                    sidebar.destroy(&mut self.transport);
                    true
                }
                None => false,
            },
            ElementKey::Tablist => match self.tablist.take() {
                Some(mut tablist) => {
                    let (clients, batch) = tablist.destroy(&mut self.names);
                    if !batch.is_empty() {
                        for client in clients {
                            self.transport.send(client, batch.clone());
                        }
                    }
                    true
                }
                None => false,
            },
            ElementKey::Hologram(identifier) => match self.holograms.remove(identifier) {
                Some(mut hologram) => {
                    hologram.destroy(&mut self.transport);
                    true
                }
                None => false,
            },
            ElementKey::Npc(identifier) => match self.npcs.remove(identifier) {
                Some(npc) => {
                    for client in npc.viewers() {
                        self.transport.send(client, npc.destroy_batch());
                    }
                    self.scheduler.cancel_where(|job| job.concerns_npc(identifier));
                    true
                }
                None => false,
            },
        };

        if removed {
            info!("Removed {}", key);
        }
        removed
    }

    /// Runs the update cycle of one element right away.
    pub fn update_now(&mut self, key: &ElementKey) -> Result<(), DisplayError> {
        self.update_element(key)
    }

    /// Keys of all active elements.
    pub fn list_active_keys(&self) -> Vec<ElementKey> {
        let mut keys = Vec::new();
        if self.sidebar.is_some() {
            keys.push(ElementKey::Sidebar);
        }
        if self.tablist.is_some() {
            keys.push(ElementKey::Tablist);
        }
        keys.extend(self.holograms.keys().cloned().map(ElementKey::Hologram));
        keys.extend(self.npcs.keys().cloned().map(ElementKey::Npc));
        keys
    }

    fn update_element(&mut self, key: &ElementKey) -> Result<(), DisplayError> {
        let unknown = || InvariantViolation::UnknownElement {
            key: key.to_string(),
        };

        match key {
            ElementKey::Sidebar => {
                let sidebar = self.sidebar.as_mut().ok_or_else(unknown)?;
                let clients = self.clients.clients();
                sidebar.update(&clients, &mut self.transport)?;
            }
            ElementKey::Tablist => {
                let tablist = self.tablist.as_mut().ok_or_else(unknown)?;
                let online = self.clients.names();
                let clients = self.clients.ids();
                let batches = tablist.sync(&online, &clients, &mut self.names, &mut self.rng)?;
                for (client, batch) in batches {
                    self.transport.send(client, batch);
                }
            }
            ElementKey::Hologram(identifier) => {
                let hologram = self.holograms.get_mut(identifier).ok_or_else(unknown)?;
                let clients = self.clients.clients();
                hologram.update(&clients, &mut self.transport)?;
            }
            ElementKey::Npc(identifier) => {
                let npc = self.npcs.get_mut(identifier).ok_or_else(unknown)?;
                let delay = self.config.actor_profile_removal_delay;
                for client in self.clients.clients() {
                    let change = npc.update_visibility(client, &self.flag_teams);
                    deliver_visibility(
                        &mut self.transport,
                        &mut self.scheduler,
                        delay,
                        identifier,
                        client.id,
                        change,
                    );
                }
            }
        }

        Ok(())
    }

    /// Advances the scheduler by one tick and runs everything that is due.
    ///
    /// Returns the number of jobs that ran.
    pub fn tick(&mut self) -> usize {
        let jobs = self.scheduler.advance();
        let count = jobs.len();

        for job in jobs {
            match job {
                Job::Update(key) => {
                    let result = self.update_element(&key);
                    self.record(result);
                }
                Job::RemoveActorProfile { npc, client } => {
                    if let Some(npc) = self.npcs.get(&npc) {
                        if self.clients.contains(&client) {
                            self.transport.send(client, npc.profile_removal());
                        }
                    }
                }
                Job::ExpireCooldown { npc, client } => {
                    if let Some(npc) = self.npcs.get_mut(&npc) {
                        npc.clear_cooldown(client);
                    }
                }
                Job::RefreshActors { client } => self.refresh_actors(client),
            }
        }

        count
    }

    /// Adds a client to the roster and shows it every element it is eligible for.
    ///
    /// Actors stay hidden until [`DisplayContext::client_join_finished`].
    pub fn client_connected(
        &mut self,
        name: impl Into<String>,
        location: Location,
    ) -> Result<ClientId, ConfigError> {
        let id = self
            .clients
            .add_client(name, location)
            .ok_or(ConfigError::ServerFull {
                max_clients: self.clients.max_clients(),
            })?;

        self.transport.send(id, self.flag_teams.create_batch());

        if self.sidebar.is_some() {
            let result = self.update_element(&ElementKey::Sidebar);
            self.record(result);
        }

        let holograms: Vec<String> = self.holograms.keys().cloned().collect();
        for identifier in holograms {
            let result = self.update_element(&ElementKey::Hologram(identifier));
            self.record(result);
        }

        if self.tablist.is_some() {
            let result = self.update_element(&ElementKey::Tablist);
            self.record(result);
        }

        Ok(id)
    }

    /// Completes the join handshake; actors become eligible for the client.
    pub fn client_join_finished(&mut self, id: ClientId) -> bool {
        if !self.clients.mark_join_finished(&id) {
            return false;
        }
        debug!("Client {} finished joining", id);
        self.refresh_actors(id);
        true
    }

    /// Removes a client and every piece of state kept about it.
    pub fn client_disconnected(&mut self, id: ClientId) -> bool {
        if self.clients.remove_client(&id).is_none() {
            return false;
        }

        if let Some(sidebar) = self.sidebar.as_mut() {
            sidebar.forget(id);
        }
        for hologram in self.holograms.values_mut() {
            hologram.forget(id);
        }
        for npc in self.npcs.values_mut() {
            npc.forget(id);
        }
        if let Some(tablist) = self.tablist.as_mut() {
            tablist.forget(id);
        }
        let cancelled = self.scheduler.cancel_where(|job| job.concerns_client(id));
        if cancelled > 0 {
            debug!("Cancelled {} pending jobs of client {}", cancelled, id);
        }

        if self.tablist.is_some() {
            let result = self.update_element(&ElementKey::Tablist);
            self.record(result);
        }

        true
    }

    /// Applies a regular movement.
    pub fn client_moved(&mut self, id: ClientId, location: Location) -> bool {
        if !self.relocate(id, location) {
            return false;
        }
        self.refresh_actors(id);
        true
    }

    /// Applies a teleport; actors are re-evaluated on the next tick.
    pub fn client_teleported(&mut self, id: ClientId, location: Location) -> bool {
        self.defer_refresh(id, location)
    }

    /// Applies a respawn; actors are re-evaluated on the next tick.
    pub fn client_respawned(&mut self, id: ClientId, location: Location) -> bool {
        self.defer_refresh(id, location)
    }

    /// Mirrors the client's crouch state on the actors that copy it.
    pub fn client_toggled_crouch(&mut self, id: ClientId, crouching: bool) -> bool {
        if !self.clients.set_crouching(&id, crouching) {
            return false;
        }
        let Some(client) = self.clients.get(&id) else {
            return false;
        };

        for npc in self.npcs.values().filter(|npc| npc.mirrors_crouch()) {
            if let Some(packets) = npc.mirror_crouch(client, crouching) {
                self.transport.send(id, packets);
            }
        }
        true
    }

    /// Forwards a use interaction to the actor with `entity_id`.
    ///
    /// Returns true when a use listener was invoked.
    pub fn client_used_entity(&mut self, id: ClientId, entity_id: i32, action: UseAction) -> bool {
        let Some(client) = self.clients.get(&id) else {
            return false;
        };
        let Some(npc) = self
            .npcs
            .values_mut()
            .find(|npc| npc.entity_id() == entity_id)
        else {
            return false;
        };

        match npc.on_use(client, action) {
            Some(cooldown) => {
                self.scheduler.schedule_delayed(
                    Job::ExpireCooldown {
                        npc: npc.identifier().to_string(),
                        client: id,
                    },
                    cooldown,
                );
                true
            }
            None => false,
        }
    }

    /// Marks a client as alive.
    pub fn touch(&mut self, id: ClientId) {
        self.clients.touch(&id);
    }

    /// Disconnects every client that has been silent for longer than `timeout`.
    pub fn disconnect_timed_out(&mut self, timeout: Duration) -> Vec<ClientId> {
        let timed_out = self.clients.timed_out(timeout);
        for id in &timed_out {
            warn!("Client {} timed out", id);
            self.client_disconnected(*id);
        }
        timed_out
    }

    /// Returns and clears the failures of cycles run from ticks and events.
    pub fn take_errors(&mut self) -> Vec<DisplayError> {
        std::mem::take(&mut self.errors)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn sidebar(&self) -> Option<&Sidebar> {
        self.sidebar.as_ref()
    }

    pub fn tablist(&self) -> Option<&Tablist> {
        self.tablist.as_ref()
    }

    pub fn hologram(&self, identifier: &str) -> Option<&Hologram> {
        self.holograms.get(identifier)
    }

    pub fn npc(&self, identifier: &str) -> Option<&Npc> {
        self.npcs.get(identifier)
    }

    /// Group names that are live right now.
    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    pub fn current_tick(&self) -> u64 {
        self.scheduler.current_tick()
    }

    fn record(&mut self, result: Result<(), DisplayError>) {
        if let Err(e) = result {
            warn!("Update cycle skipped: {}", e);
            self.errors.push(e);
        }
    }

    fn defer_refresh(&mut self, id: ClientId, location: Location) -> bool {
        if !self.relocate(id, location) {
            return false;
        }
        self.scheduler
            .schedule_delayed(Job::RefreshActors { client: id }, 1);
        true
    }

    /// Stores a new location and moves holograms along when the world changed.
    fn relocate(&mut self, id: ClientId, location: Location) -> bool {
        let Some(previous) = self.clients.set_location(&id, location) else {
            return false;
        };
        self.clients.touch(&id);

        let Some(client) = self.clients.get(&id) else {
            return false;
        };
        if previous.same_world(&client.location) {
            return true;
        }

        debug!(
            "Client {} moved from world '{}' to '{}'",
            id, previous.world, client.location.world
        );
        let mut needs_cycle = Vec::new();
        for (identifier, hologram) in self.holograms.iter_mut() {
            if hologram.client_changed_world(client, &mut self.transport) {
                needs_cycle.push(identifier.clone());
            }
        }
        for identifier in needs_cycle {
            let result = self.update_element(&ElementKey::Hologram(identifier));
            self.record(result);
        }
        true
    }

    /// Re-evaluates every actor for one client, then turns the actors that
    /// did not just appear or vanish towards it.
    fn refresh_actors(&mut self, id: ClientId) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        let delay = self.config.actor_profile_removal_delay;

        let mut changed = HashSet::new();
        for (identifier, npc) in self.npcs.iter_mut() {
            let change = npc.update_visibility(client, &self.flag_teams);
            if deliver_visibility(
                &mut self.transport,
                &mut self.scheduler,
                delay,
                identifier,
                id,
                change,
            ) {
                changed.insert(identifier.clone());
            }
        }

        for (identifier, npc) in &self.npcs {
            if !npc.looks_at_client() || changed.contains(identifier) {
                continue;
            }
            if let Some(packets) = npc.look_at(client) {
                self.transport.send(id, packets);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_diff::LineOptions;
    use crate::tablist::TablistGroup;
    use crate::transport::Outbox;
    use shared::{DisplayPacket, ProtocolVersion, ScoreboardAction, TeamOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context() -> DisplayContext<Outbox> {
        let config = DisplayConfig {
            rng_seed: Some(9),
            ..DisplayConfig::default()
        };
        DisplayContext::new(config, 8, Outbox::new(ProtocolVersion::Modern))
    }

    fn spawn() -> Location {
        Location::new("world", 0.0, 64.0, 5.0).with_rotation(180.0, 0.0)
    }

    fn kinds(packets: &[&DisplayPacket]) -> Vec<&'static str> {
        packets.iter().map(|packet| packet.kind()).collect()
    }

    #[test]
    fn test_connect_sends_flag_teams_first() {
        let mut context = context();
        context
            .set_element(SidebarConfig::new("Title", ["a", "b"]))
            .unwrap();

        let id = context.client_connected("Alex", spawn()).unwrap();
        let packets = context.transport().packets_for(id);

        assert_eq!(kinds(&packets[..4]), vec!["team"; 4]);
        assert_eq!(packets[4].kind(), "objective");
        assert!(context.sidebar().unwrap().is_initialized(id));
    }

    #[test]
    fn test_server_full() {
        let mut context = DisplayContext::new(
            DisplayConfig::default(),
            1,
            Outbox::new(ProtocolVersion::Modern),
        );
        context.client_connected("a", spawn()).unwrap();

        assert_eq!(
            context.client_connected("b", spawn()).unwrap_err(),
            ConfigError::ServerFull { max_clients: 1 }
        );
    }

    #[test]
    fn test_rejected_config_applies_nothing() {
        let mut context = context();

        let config = SidebarConfig::new("Title", ["a"]).with_update_interval(0);
        assert!(context.set_element(config).is_err());
        assert!(context.list_active_keys().is_empty());

        let hologram = HologramConfig::new("spawn", spawn(), ["a"]);
        context.set_element(hologram).unwrap();
        let duplicate = HologramConfig::new("spawn", spawn(), ["b"]);
        assert_eq!(
            context.set_element(duplicate).unwrap_err(),
            ConfigError::DuplicateKey {
                key: "hologram:spawn".to_string()
            }
        );
        assert_eq!(
            context.list_active_keys(),
            vec![ElementKey::Hologram("spawn".to_string())]
        );
    }

    #[test]
    fn test_replacing_sidebar_destroys_old_one() {
        let mut context = context();
        let id = context.client_connected("Alex", spawn()).unwrap();
        context.set_element(SidebarConfig::new("Old", ["a"])).unwrap();
        context.transport_mut().drain();

        context.set_element(SidebarConfig::new("New", ["b"])).unwrap();
        let packets = context.transport().packets_for(id);

        assert_eq!(
            packets[0],
            &DisplayPacket::ObjectiveAction {
                objective: "sidebar".to_string(),
                title: String::new(),
                action: ScoreboardAction::Remove,
            }
        );
        assert_eq!(context.sidebar().unwrap().title(), "New");
    }

    #[test]
    fn test_interval_drives_updates() {
        let mut context = context();
        context.client_connected("Alex", spawn()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = SidebarConfig::new("Title", ["a"])
            .with_general_modifier(move |lines: &[String]| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(lines.to_vec())
            })
            .with_update_interval(2);
        context.set_element(config).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        context.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        context.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(context.remove_element(&ElementKey::Sidebar));
        context.tick();
        context.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_provider_failure_is_queued() {
        let mut context = context();
        context.client_connected("Alex", spawn()).unwrap();

        let config = SidebarConfig::new("Title", ["a"])
            .with_general_modifier(|_: &[String]| Err("offline".into()));
        context.set_element(config).unwrap();

        let errors = context.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], DisplayError::Provider { .. }));
        assert!(context.take_errors().is_empty());
    }

    #[test]
    fn test_update_now_unknown_element() {
        let mut context = context();
        assert_eq!(
            context.update_now(&ElementKey::Npc("ghost".to_string())),
            Err(DisplayError::Invariant(InvariantViolation::UnknownElement {
                key: "npc:ghost".to_string()
            }))
        );
    }

    #[test]
    fn test_tablist_join_and_leave() {
        let mut context = context();
        context
            .set_element(TablistConfig::new(|names: &[String]| {
                Ok(vec![TablistGroup::new(
                    "everyone",
                    TeamOptions::default(),
                    names.to_vec(),
                )])
            }))
            .unwrap();

        let first = context.client_connected("Alex", spawn()).unwrap();
        context.transport_mut().drain();
        let second = context.client_connected("Sam", spawn()).unwrap();

        let to_first = context.transport().packets_for(first);
        assert_eq!(kinds(&to_first), vec!["team_members"]);

        let to_second = context.transport().packets_for(second);
        let members = to_second
            .iter()
            .filter(|packet| packet.kind() == "team_members")
            .count();
        assert_eq!(members, 1);
        context.transport_mut().drain();

        assert!(context.client_disconnected(second));
        let to_first = context.transport().packets_for(first);
        assert!(matches!(
            to_first[0],
            DisplayPacket::TeamMembers { add: false, members, .. } if members == &vec!["Sam".to_string()]
        ));
    }

    #[test]
    fn test_tablist_catches_up_client_that_missed_creation() {
        let mut context = context();
        let failing = Arc::new(std::sync::Mutex::new(false));
        let members = Arc::new(std::sync::Mutex::new(vec!["a".to_string()]));
        let (flag, listed) = (Arc::clone(&failing), Arc::clone(&members));
        context
            .set_element(TablistConfig::new(move |_: &[String]| {
                if *flag.lock().unwrap() {
                    return Err("offline".into());
                }
                Ok(vec![TablistGroup::new(
                    "G1",
                    TeamOptions::default(),
                    listed.lock().unwrap().clone(),
                )])
            }))
            .unwrap();
        let first = context.client_connected("a", spawn()).unwrap();

        *failing.lock().unwrap() = true;
        let second = context.client_connected("b", spawn()).unwrap();
        assert_eq!(context.take_errors().len(), 1);
        assert!(!context.tablist().unwrap().is_initialized(second));
        context.transport_mut().drain();

        *failing.lock().unwrap() = false;
        members.lock().unwrap().push("x".to_string());
        context.update_now(&ElementKey::Tablist).unwrap();

        let g1 = context
            .tablist()
            .unwrap()
            .reconciler()
            .team_of("G1-pos0")
            .unwrap()
            .name
            .clone();
        let to_second = context.transport().packets_for(second);
        assert!(matches!(
            to_second[0],
            DisplayPacket::TeamAction { team, action: ScoreboardAction::Create } if team.name == g1
        ));
        assert!(matches!(
            to_second[1],
            DisplayPacket::TeamMembers { team, members, add: true }
                if *team == g1 && *members == vec!["a".to_string(), "x".to_string()]
        ));
        assert!(context.tablist().unwrap().is_initialized(second));

        let to_first = context.transport().packets_for(first);
        assert!(to_first.iter().all(|packet| !matches!(
            packet,
            DisplayPacket::TeamAction { action: ScoreboardAction::Create, team } if team.name == g1
        )));
    }

    #[test]
    fn test_removing_tablist_releases_names() {
        let mut context = context();
        context.client_connected("Alex", spawn()).unwrap();
        let baseline = context.names().len();

        context
            .set_element(TablistConfig::new(|names: &[String]| {
                Ok(vec![TablistGroup::new("all", TeamOptions::default(), names.to_vec())])
            }))
            .unwrap();
        assert_eq!(context.names().len(), baseline + 1);

        assert!(context.remove_element(&ElementKey::Tablist));
        assert_eq!(context.names().len(), baseline);
    }

    #[test]
    fn test_npc_waits_for_join_handshake() {
        let mut context = context();
        context
            .set_element(NpcConfig::new("guide", "Guide", Location::new("world", 0.0, 64.0, 0.0)))
            .unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();
        assert!(!context.npc("guide").unwrap().is_visible(id));

        context.transport_mut().drain();
        assert!(context.client_join_finished(id));
        assert!(!context.client_join_finished(id));
        assert!(context.npc("guide").unwrap().is_visible(id));

        let spawned = context.transport().packets_for(id);
        assert_eq!(spawned[0].kind(), "player_info");
        context.transport_mut().drain();

        for _ in 0..19 {
            context.tick();
        }
        assert!(context.transport().is_empty());

        context.tick();
        assert_eq!(
            context.transport().packets_for(id),
            vec![&DisplayPacket::PlayerInfo {
                profile: context.npc("guide").unwrap().profile().clone(),
                add: false,
            }]
        );
    }

    #[test]
    fn test_teleport_is_deferred_one_tick() {
        let mut context = context();
        context
            .set_element(NpcConfig::new("guide", "Guide", Location::new("world", 0.0, 64.0, 0.0)))
            .unwrap();
        let id = context
            .client_connected("Alex", Location::new("world", 500.0, 64.0, 500.0))
            .unwrap();
        context.client_join_finished(id);
        context.transport_mut().drain();

        assert!(context.client_teleported(id, spawn()));
        assert!(context.transport().is_empty());

        context.tick();
        assert!(context.npc("guide").unwrap().is_visible(id));
        assert_eq!(context.transport().packets_for(id)[1].kind(), "spawn_actor");
    }

    #[test]
    fn test_move_turns_looking_npc() {
        let mut context = context();
        context
            .set_element(
                NpcConfig::new("guide", "Guide", Location::new("world", 0.0, 64.0, 0.0))
                    .with_look_at_client(true),
            )
            .unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();
        context.client_join_finished(id);
        context.transport_mut().drain();

        context.client_moved(id, Location::new("world", 3.0, 64.0, 4.0).with_rotation(180.0, 0.0));
        assert_eq!(
            kinds(&context.transport().packets_for(id)),
            vec!["look", "head_rotation"]
        );
    }

    #[test]
    fn test_crouch_mirror_and_use_cooldown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut context = context();
        context
            .set_element(
                NpcConfig::new("guide", "Guide", Location::new("world", 0.0, 64.0, 0.0))
                    .with_mirror_crouch(true)
                    .with_use_listener(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .with_listener_cooldown(3),
            )
            .unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();
        context.client_join_finished(id);
        context.transport_mut().drain();

        assert!(context.client_toggled_crouch(id, true));
        assert_eq!(kinds(&context.transport().packets_for(id)), vec!["metadata"]);

        let entity_id = context.npc("guide").unwrap().entity_id();
        assert!(context.client_used_entity(id, entity_id, UseAction::Interact));
        assert!(!context.client_used_entity(id, entity_id, UseAction::Interact));
        assert!(!context.client_used_entity(id, entity_id + 1, UseAction::Interact));

        for _ in 0..3 {
            context.tick();
        }
        assert!(context.client_used_entity(id, entity_id, UseAction::Interact));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_npc_destroys_for_viewers() {
        let mut context = context();
        context
            .set_element(NpcConfig::new("guide", "Guide", Location::new("world", 0.0, 64.0, 0.0)))
            .unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();
        context.client_join_finished(id);
        let entity_id = context.npc("guide").unwrap().entity_id();
        context.transport_mut().drain();

        assert!(context.remove_element(&ElementKey::Npc("guide".to_string())));
        assert!(!context.remove_element(&ElementKey::Npc("guide".to_string())));
        assert_eq!(
            context.transport().packets_for(id),
            vec![&DisplayPacket::DestroyEntities {
                entity_ids: vec![entity_id]
            }]
        );

        // The pending profile removal went with the actor
        context.transport_mut().drain();
        for _ in 0..25 {
            context.tick();
        }
        assert!(context.transport().is_empty());
    }

    #[test]
    fn test_hologram_follows_world_changes() {
        let mut context = context();
        context
            .set_element(HologramConfig::new("spawn", Location::new("world", 0.0, 70.0, 0.0), ["hi"]))
            .unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();
        assert!(context.hologram("spawn").unwrap().is_initialized(id));

        context.client_moved(id, Location::new("nether", 0.0, 64.0, 0.0));
        assert!(!context.hologram("spawn").unwrap().is_initialized(id));

        context.transport_mut().drain();
        context.client_moved(id, spawn());
        assert!(context.hologram("spawn").unwrap().is_initialized(id));
        assert_eq!(
            kinds(&context.transport().packets_for(id)),
            vec!["spawn_marker", "metadata"]
        );
    }

    #[test]
    fn test_disconnect_forgets_client() {
        let mut context = context();
        context.set_element(SidebarConfig::new("Title", ["a"])).unwrap();
        let id = context.client_connected("Alex", spawn()).unwrap();

        assert!(context.client_disconnected(id));
        assert!(!context.client_disconnected(id));
        assert!(!context.sidebar().unwrap().is_initialized(id));
        assert!(context.clients().is_empty());
    }

    #[test]
    fn test_timeout_disconnects_silent_clients() {
        let mut context = context();
        let id = context.client_connected("Alex", spawn()).unwrap();

        assert!(context.disconnect_timed_out(Duration::from_secs(60)).is_empty());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(context.disconnect_timed_out(Duration::from_millis(1)), vec![id]);
        assert!(context.client(id).is_none());
    }
}
