//! Tablist groups reconciled against the previously emitted teams
//!
//! Clients order tablist entries by team name, so every target group gets a
//! zero padded positional prefix from its rank. A group keeps its team while
//! the team's name still starts with the group's prefix; otherwise the team
//! is replaced by a new one with a fresh name. For kept teams only the
//! membership difference is sent.
//!
//! Previous state lives in two tables: identifier to slot index, and slots
//! holding the live team together with the group it last showed.

use crate::error::{ConfigError, DisplayError, InvariantViolation, ProviderResult};
use crate::identity::NameRegistry;
use log::{debug, info};
use rand::Rng;
use shared::{ClientId, DisplayPacket, ScoreboardAction, Team, TeamOptions};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identifier of the group that collects unclaimed clients. Generated
/// identifiers always end in `-pos<n>`, so they cannot collide with it.
pub const REMAINING_GROUP: &str = "remaining";

/// Key used for the tablist in logs and errors.
pub const TABLIST_KEY: &str = "tablist";

/// One group as returned by the content provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablistGroup {
    pub identifier: String,
    pub options: TeamOptions,
    pub members: Vec<String>,
    /// Show members in the given order by giving each one its own team
    pub custom_order: bool,
}

impl TablistGroup {
    pub fn new<I, S>(identifier: impl Into<String>, options: TeamOptions, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            options,
            members: members.into_iter().map(Into::into).collect(),
            custom_order: false,
        }
    }

    pub fn with_custom_order(mut self, custom_order: bool) -> Self {
        self.custom_order = custom_order;
        self
    }
}

/// Computes the groups from the names of all connected clients.
pub type GroupProvider = Box<dyn FnMut(&[String]) -> ProviderResult<Vec<TablistGroup>> + Send>;

pub struct TablistConfig {
    pub provider: GroupProvider,
    /// Automatic update interval in ticks
    pub update_interval: Option<u32>,
}

impl TablistConfig {
    pub fn new<F>(provider: F) -> Self
    where
        F: FnMut(&[String]) -> ProviderResult<Vec<TablistGroup>> + Send + 'static,
    {
        Self {
            provider: Box::new(provider),
            update_interval: None,
        }
    }

    pub fn with_update_interval(mut self, ticks: u32) -> Self {
        self.update_interval = Some(ticks);
        self
    }
}

impl fmt::Debug for TablistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablistConfig")
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}

/// A group after expansion, ready to be matched against live teams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub identifier: String,
    pub options: TeamOptions,
    pub members: Vec<String>,
}

/// Expands provider output into the ordered target list.
///
/// Custom ordered groups become one single-member group per member, other
/// groups keep all members in one group. Online names no group claims end
/// up in a trailing [`REMAINING_GROUP`] with default options.
pub fn resolve_groups(
    content: Vec<TablistGroup>,
    online: &[String],
) -> Result<Vec<ResolvedGroup>, InvariantViolation> {
    let mut seen = HashSet::new();
    for group in &content {
        if !seen.insert(group.identifier.as_str()) {
            return Err(InvariantViolation::DuplicateGroupIdentifier {
                identifier: group.identifier.clone(),
            });
        }
    }

    let mut claimed: HashSet<String> = HashSet::new();
    let mut resolved = Vec::new();
    for group in content {
        claimed.extend(group.members.iter().cloned());

        if group.custom_order {
            for (position, member) in group.members.into_iter().enumerate() {
                resolved.push(ResolvedGroup {
                    identifier: format!("{}-pos{}", group.identifier, position),
                    options: group.options.clone(),
                    members: vec![member],
                });
            }
        } else {
            resolved.push(ResolvedGroup {
                identifier: format!("{}-pos0", group.identifier),
                options: group.options,
                members: group.members,
            });
        }
    }

    let remaining: Vec<String> = online
        .iter()
        .filter(|name| !claimed.contains(*name))
        .cloned()
        .collect();
    if !remaining.is_empty() {
        resolved.push(ResolvedGroup {
            identifier: REMAINING_GROUP.to_string(),
            options: TeamOptions::default(),
            members: remaining,
        });
    }

    Ok(resolved)
}

/// Zero padded rank, as wide as the number of groups needs.
pub fn position_prefix(rank: usize, group_count: usize) -> String {
    let width = group_count.to_string().len();
    format!("{:0width$}", rank, width = width)
}

/// Entries of `from` that are not in `without`, in the order of `from`.
fn difference(from: &[String], without: &[String]) -> Vec<String> {
    let without: HashSet<&String> = without.iter().collect();
    from.iter()
        .filter(|member| !without.contains(member))
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
struct GroupSlot {
    team: Team,
    group: ResolvedGroup,
}

/// Messages produced by one reconciliation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciliation {
    /// Delta for clients that already show the previous state
    pub broadcast: Vec<DisplayPacket>,
    /// Full state for a client that just joined
    pub joined: Vec<DisplayPacket>,
}

#[derive(Debug, Default)]
pub struct GroupReconciler {
    index: HashMap<String, usize>,
    slots: Vec<Option<GroupSlot>>,
    free: Vec<usize>,
}

impl GroupReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the live teams in line with `target`.
    ///
    /// Team names are claimed from and returned to `names`, so a name is
    /// never live twice. With `with_joined` the full state is also built for
    /// a client that has none of the teams yet.
    pub fn reconcile<R: Rng + ?Sized>(
        &mut self,
        target: Vec<ResolvedGroup>,
        names: &mut NameRegistry,
        rng: &mut R,
        with_joined: bool,
    ) -> Reconciliation {
        let mut result = Reconciliation::default();

        let wanted: HashSet<&str> = target.iter().map(|group| group.identifier.as_str()).collect();
        let mut stale: Vec<String> = self
            .index
            .keys()
            .filter(|identifier| !wanted.contains(identifier.as_str()))
            .cloned()
            .collect();
        stale.sort();
        for identifier in stale {
            if let Some(slot) = self.take(&identifier) {
                debug!("Tablist group '{}' removed", identifier);
                result.broadcast.push(Self::remove_team(&slot.team, names));
            }
        }

        let group_count = target.len();
        for (rank, group) in target.into_iter().enumerate() {
            let prefix = position_prefix(rank, group_count);
            let existing = self.index.get(&group.identifier).copied();

            let reusable = existing.and_then(|slot_index| {
                self.slots[slot_index]
                    .as_ref()
                    .filter(|slot| slot.team.name.starts_with(&prefix))
                    .map(|_| slot_index)
            });

            let team = match reusable {
                Some(slot_index) => {
                    let Some(slot) = self.slots[slot_index].as_mut() else {
                        continue;
                    };

                    if slot.team.options != group.options {
                        slot.team.options = group.options.clone();
                        result.broadcast.push(DisplayPacket::TeamAction {
                            team: slot.team.clone(),
                            action: ScoreboardAction::Update,
                        });
                    }

                    let to_add = difference(&group.members, &slot.group.members);
                    let to_remove = difference(&slot.group.members, &group.members);
                    if !to_add.is_empty() {
                        result.broadcast.push(DisplayPacket::TeamMembers {
                            team: slot.team.name.clone(),
                            members: to_add,
                            add: true,
                        });
                    }
                    if !to_remove.is_empty() {
                        result.broadcast.push(DisplayPacket::TeamMembers {
                            team: slot.team.name.clone(),
                            members: to_remove,
                            add: false,
                        });
                    }

                    slot.group = group.clone();
                    slot.team.clone()
                }
                None => {
                    if existing.is_some() {
                        if let Some(slot) = self.take(&group.identifier) {
                            debug!(
                                "Tablist group '{}' moved to rank {}, replacing team {}",
                                group.identifier, rank, slot.team.name
                            );
                            result.broadcast.push(Self::remove_team(&slot.team, names));
                        }
                    }

                    let team = Team::with_options(names.acquire(&prefix, rng), group.options.clone());
                    result.broadcast.extend(Self::create_team(&team, &group.members));
                    self.insert(GroupSlot {
                        team: team.clone(),
                        group: group.clone(),
                    });
                    team
                }
            };

            if with_joined {
                result.joined.extend(Self::create_team(&team, &group.members));
            }
        }

        result
    }

    /// Removes every live team and frees its name.
    pub fn destroy_all(&mut self, names: &mut NameRegistry) -> Vec<DisplayPacket> {
        let mut batch = Vec::new();
        for slot in self.slots.drain(..).flatten() {
            batch.push(Self::remove_team(&slot.team, names));
        }
        self.index.clear();
        self.free.clear();
        batch
    }

    /// Names of all live teams.
    pub fn team_names(&self) -> Vec<&str> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.team.name.as_str())
            .collect()
    }

    /// The live team of a resolved group identifier.
    pub fn team_of(&self, identifier: &str) -> Option<&Team> {
        let slot_index = self.index.get(identifier)?;
        self.slots[*slot_index].as_ref().map(|slot| &slot.team)
    }

    /// Members a group had when it was last reconciled.
    pub fn members_of(&self, identifier: &str) -> Option<&[String]> {
        let slot_index = self.index.get(identifier)?;
        self.slots[*slot_index]
            .as_ref()
            .map(|slot| slot.group.members.as_slice())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn insert(&mut self, slot: GroupSlot) {
        let identifier = slot.group.identifier.clone();
        let slot_index = match self.free.pop() {
            Some(slot_index) => {
                self.slots[slot_index] = Some(slot);
                slot_index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(identifier, slot_index);
    }

    fn take(&mut self, identifier: &str) -> Option<GroupSlot> {
        let slot_index = self.index.remove(identifier)?;
        let slot = self.slots[slot_index].take();
        self.free.push(slot_index);
        slot
    }

    fn create_team(team: &Team, members: &[String]) -> Vec<DisplayPacket> {
        let mut batch = vec![DisplayPacket::TeamAction {
            team: team.clone(),
            action: ScoreboardAction::Create,
        }];
        if !members.is_empty() {
            batch.push(DisplayPacket::TeamMembers {
                team: team.name.clone(),
                members: members.to_vec(),
                add: true,
            });
        }
        batch
    }

    fn remove_team(team: &Team, names: &mut NameRegistry) -> DisplayPacket {
        names.release(&team.name);
        DisplayPacket::TeamAction {
            team: Team::new(team.name.clone()),
            action: ScoreboardAction::Remove,
        }
    }
}

/// The active tablist provider and its live teams.
///
/// Clients that have not received the full team state yet get it on the
/// next successful cycle; only clients that show the teams get deltas.
pub struct Tablist {
    config: TablistConfig,
    reconciler: GroupReconciler,
    initialized: HashSet<ClientId>,
}

impl Tablist {
    pub fn new(config: TablistConfig) -> Result<Self, ConfigError> {
        if let Some(0) = config.update_interval {
            return Err(ConfigError::InvalidInterval {
                key: TABLIST_KEY.to_string(),
                interval: 0,
            });
        }

        info!("Tablist provider set");
        Ok(Self {
            config,
            reconciler: GroupReconciler::new(),
            initialized: HashSet::new(),
        })
    }

    /// Asks the provider for the target groups and reconciles them.
    ///
    /// The provider and the identifier check run before any team changes,
    /// so a failure leaves the live teams as they were.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        online: &[String],
        names: &mut NameRegistry,
        rng: &mut R,
        with_joined: bool,
    ) -> Result<Reconciliation, DisplayError> {
        let content = (self.config.provider)(online)
            .map_err(|e| DisplayError::provider(TABLIST_KEY, &*e))?;
        let target = resolve_groups(content, online)?;
        Ok(self.reconciler.reconcile(target, names, rng, with_joined))
    }

    /// Reconciles once and addresses the result to `clients`.
    ///
    /// Initialized clients get the delta, the others the full state, after
    /// which they count as initialized. A failure changes nothing, so a
    /// client that missed its full state gets it on the next cycle.
    pub fn sync<R: Rng + ?Sized>(
        &mut self,
        online: &[String],
        clients: &[ClientId],
        names: &mut NameRegistry,
        rng: &mut R,
    ) -> Result<Vec<(ClientId, Vec<DisplayPacket>)>, DisplayError> {
        let with_joined = clients
            .iter()
            .any(|client| !self.initialized.contains(client));
        let reconciliation = self.update(online, names, rng, with_joined)?;

        let mut batches = Vec::new();
        for client in clients {
            let batch = if self.initialized.insert(*client) {
                debug!("Sending full tablist state to client {}", client);
                reconciliation.joined.clone()
            } else {
                reconciliation.broadcast.clone()
            };
            if !batch.is_empty() {
                batches.push((*client, batch));
            }
        }
        Ok(batches)
    }

    /// Removes every live team. Returns the destroy batch and the clients
    /// that showed the teams.
    pub fn destroy(&mut self, names: &mut NameRegistry) -> (Vec<ClientId>, Vec<DisplayPacket>) {
        let mut clients: Vec<ClientId> = self.initialized.drain().collect();
        clients.sort_unstable();
        (clients, self.reconciler.destroy_all(names))
    }

    /// Drops a client without sending anything.
    pub fn forget(&mut self, client: ClientId) -> bool {
        self.initialized.remove(&client)
    }

    pub fn is_initialized(&self, client: ClientId) -> bool {
        self.initialized.contains(&client)
    }

    pub fn reconciler(&self) -> &GroupReconciler {
        &self.reconciler
    }

    pub fn update_interval(&self) -> Option<u32> {
        self.config.update_interval
    }
}

impl fmt::Debug for Tablist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tablist")
            .field("config", &self.config)
            .field("reconciler", &self.reconciler)
            .field("initialized", &self.initialized)
            .finish()
    }
}
