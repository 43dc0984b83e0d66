//! Incremental synchronization of line based elements
//!
//! A line based element shows a fixed number of text lines. Each cycle the
//! content is recomputed, compared against what every client last received
//! and only the changed lines are sent. Content is either shared by all
//! clients (one retained snapshot) or transformed per client (one retained
//! snapshot per client); an element uses one of the two for its whole life.
//!
//! What a "line" is on the wire differs per element, so the messages come
//! from a [`LineSurface`] while [`LineSync`] owns the bookkeeping.

use crate::client_manager::Client;
use crate::error::{ConfigError, DisplayError, InvariantViolation, ProviderResult};
use crate::transport::Transport;
use log::debug;
use shared::style::{
    char_len, char_slice, last_styles, starts_with_fresh_style, starts_with_style_code,
    truncate_styled, STYLE_CHAR,
};
use shared::{ClientId, DisplayPacket};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Transforms the configured lines once per cycle.
pub type GeneralModifier = Box<dyn FnMut(&[String]) -> ProviderResult<Vec<String>> + Send>;

/// Transforms the cycle's lines for one client.
pub type ClientModifier =
    Box<dyn FnMut(&Client, &[String]) -> ProviderResult<Vec<String>> + Send>;

/// Supplies the clients allowed to see an element.
pub type ViewerSupplier = Box<dyn FnMut() -> ProviderResult<Vec<ClientId>> + Send>;

/// Which clients may see an element.
pub enum Viewers {
    All,
    Fixed(HashSet<ClientId>),
    /// Asked again every cycle
    Supplier(ViewerSupplier),
}

impl Viewers {
    /// The allowed set for this cycle, `None` when everybody is allowed.
    fn resolve(&mut self) -> ProviderResult<Option<HashSet<ClientId>>> {
        match self {
            Viewers::All => Ok(None),
            Viewers::Fixed(ids) => Ok(Some(ids.clone())),
            Viewers::Supplier(supplier) => Ok(Some(supplier()?.into_iter().collect())),
        }
    }

    /// Decides without calling a supplier; `None` when only a cycle can tell.
    pub fn admits(&self, client: ClientId) -> Option<bool> {
        match self {
            Viewers::All => Some(true),
            Viewers::Fixed(ids) => Some(ids.contains(&client)),
            Viewers::Supplier(_) => None,
        }
    }
}

impl fmt::Debug for Viewers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Viewers::All => write!(f, "All"),
            Viewers::Fixed(ids) => f.debug_tuple("Fixed").field(ids).finish(),
            Viewers::Supplier(_) => write!(f, "Supplier"),
        }
    }
}

/// Content settings shared by every line based element.
pub struct LineContent {
    pub lines: Vec<String>,
    pub general_modifier: Option<GeneralModifier>,
    /// Selects per-client mode when present
    pub client_modifier: Option<ClientModifier>,
    pub viewers: Viewers,
    /// Automatic update interval in ticks
    pub update_interval: Option<u32>,
}

impl LineContent {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            general_modifier: None,
            client_modifier: None,
            viewers: Viewers::All,
            update_interval: None,
        }
    }

    pub fn is_per_client(&self) -> bool {
        self.client_modifier.is_some()
    }

    /// Rejects empty content and a zero interval.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.lines.is_empty() {
            return Err(ConfigError::EmptyLines {
                key: key.to_string(),
            });
        }
        if let Some(0) = self.update_interval {
            return Err(ConfigError::InvalidInterval {
                key: key.to_string(),
                interval: 0,
            });
        }
        Ok(())
    }

    fn general_lines(&mut self, key: &str) -> Result<Vec<String>, DisplayError> {
        let lines = match self.general_modifier.as_mut() {
            Some(modifier) => modifier(&self.lines).map_err(|e| DisplayError::provider(key, &*e))?,
            None => self.lines.clone(),
        };
        check_line_count(key, self.lines.len(), &lines)?;
        Ok(lines)
    }

    fn client_lines(
        &mut self,
        key: &str,
        lines: &[String],
        clients: &[&Client],
    ) -> Result<Vec<Vec<String>>, DisplayError> {
        let Some(modifier) = self.client_modifier.as_mut() else {
            return Ok(Vec::new());
        };

        clients
            .iter()
            .map(|&client| -> Result<Vec<String>, DisplayError> {
                let client_lines =
                    modifier(client, lines).map_err(|e| DisplayError::provider(key, &*e))?;
                check_line_count(key, lines.len(), &client_lines)?;
                Ok(client_lines)
            })
            .collect()
    }
}

impl fmt::Debug for LineContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineContent")
            .field("lines", &self.lines)
            .field("general_modifier", &self.general_modifier.is_some())
            .field("client_modifier", &self.client_modifier.is_some())
            .field("viewers", &self.viewers)
            .field("update_interval", &self.update_interval)
            .finish()
    }
}

impl LineOptions for LineContent {
    fn content_mut(&mut self) -> &mut LineContent {
        self
    }
}

/// Builder methods for configs that carry a [`LineContent`].
pub trait LineOptions: Sized {
    fn content_mut(&mut self) -> &mut LineContent;

    fn with_general_modifier<F>(mut self, modifier: F) -> Self
    where
        F: FnMut(&[String]) -> ProviderResult<Vec<String>> + Send + 'static,
    {
        self.content_mut().general_modifier = Some(Box::new(modifier));
        self
    }

    fn with_client_modifier<F>(mut self, modifier: F) -> Self
    where
        F: FnMut(&Client, &[String]) -> ProviderResult<Vec<String>> + Send + 'static,
    {
        self.content_mut().client_modifier = Some(Box::new(modifier));
        self
    }

    fn with_viewers(mut self, viewers: impl IntoIterator<Item = ClientId>) -> Self {
        self.content_mut().viewers = Viewers::Fixed(viewers.into_iter().collect());
        self
    }

    fn with_viewer_supplier<F>(mut self, supplier: F) -> Self
    where
        F: FnMut() -> ProviderResult<Vec<ClientId>> + Send + 'static,
    {
        self.content_mut().viewers = Viewers::Supplier(Box::new(supplier));
        self
    }

    fn with_update_interval(mut self, ticks: u32) -> Self {
        self.content_mut().update_interval = Some(ticks);
        self
    }
}

fn check_line_count(key: &str, expected: usize, lines: &[String]) -> Result<(), InvariantViolation> {
    if lines.len() != expected {
        return Err(InvariantViolation::LineCountMismatch {
            key: key.to_string(),
            expected,
            actual: lines.len(),
        });
    }
    Ok(())
}

/// Result of comparing new lines with the retained ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineDiff {
    /// Nothing was retained: every line is new
    Create(Vec<String>),
    /// Only the lines that differ, by index
    Update(Vec<(usize, String)>),
}

impl LineDiff {
    /// Changed lines in index order.
    pub fn changes(&self) -> Vec<(usize, &str)> {
        match self {
            LineDiff::Create(lines) => lines
                .iter()
                .enumerate()
                .map(|(index, line)| (index, line.as_str()))
                .collect(),
            LineDiff::Update(changes) => changes
                .iter()
                .map(|(index, line)| (*index, line.as_str()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LineDiff::Create(lines) => lines.len(),
            LineDiff::Update(changes) => changes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compares `new` with `previous` index by index using exact equality.
pub fn diff_lines(new: &[String], previous: Option<&[String]>) -> LineDiff {
    let Some(previous) = previous else {
        return LineDiff::Create(new.to_vec());
    };

    let changes = new
        .iter()
        .enumerate()
        .filter(|(index, line)| previous.get(*index) != Some(*line))
        .map(|(index, line)| (index, line.clone()))
        .collect();
    LineDiff::Update(changes)
}

/// Splits a line into a primary segment and an overflow segment of at most
/// `max` characters each, keeping style escapes intact.
///
/// Without a limit the whole line is the primary segment. A `§r` reset is
/// put in front of the overflow only when the primary ends with active
/// styles and the overflow does not open with a color of its own; unstyled
/// primaries pass the overflow through unchanged.
pub fn split_line(line: &str, max: Option<usize>) -> (String, String) {
    let Some(max) = max else {
        return (line.to_string(), String::new());
    };

    let length = char_len(line);
    if length <= max {
        return (line.to_string(), String::new());
    }

    let mut primary = char_slice(line, 0, max);
    let mut overflow = char_slice(line, max, length);

    if primary.ends_with(STYLE_CHAR) && starts_with_style_code(&overflow) {
        primary.pop();
        overflow.insert(0, STYLE_CHAR);
    }

    if !starts_with_fresh_style(&overflow) && !last_styles(&primary).is_empty() {
        overflow.insert_str(0, "§r");
    }

    let overflow = truncate_styled(&overflow, max);
    (primary, overflow)
}

/// The messages that make up one line based element on a client.
pub trait LineSurface {
    /// Creates the element. With `None` the lines are blank and the text
    /// follows as line updates.
    fn create_batch(&self, lines: Option<&[String]>) -> Vec<DisplayPacket>;

    fn line_update(&self, index: usize, line: &str) -> DisplayPacket;

    fn destroy_batch(&self) -> Vec<DisplayPacket>;
}

/// Counts of what one cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Clients that received a create batch
    pub created: usize,
    /// Clients that received line updates
    pub updated: usize,
    /// Clients that received a destroy batch
    pub destroyed: usize,
}

/// Per-client initialization state and retained snapshots of one element.
///
/// A client is initialized exactly when it holds the element's resources;
/// in per-client mode an initialized client also has a retained snapshot.
#[derive(Debug)]
pub struct LineSync {
    per_client: bool,
    initialized: BTreeSet<ClientId>,
    general: Option<Vec<String>>,
    client_lines: HashMap<ClientId, Vec<String>>,
}

impl LineSync {
    pub fn new(per_client: bool) -> Self {
        Self {
            per_client,
            initialized: BTreeSet::new(),
            general: None,
            client_lines: HashMap::new(),
        }
    }

    /// Runs one update cycle against `candidates`.
    ///
    /// Every provider is called before any state changes, so a failing
    /// provider skips the whole cycle and leaves the retained snapshots as
    /// they were.
    pub fn run_cycle<S, T>(
        &mut self,
        key: &str,
        surface: &S,
        content: &mut LineContent,
        candidates: &[&Client],
        transport: &mut T,
    ) -> Result<CycleReport, DisplayError>
    where
        S: LineSurface + ?Sized,
        T: Transport + ?Sized,
    {
        let allowed = content
            .viewers
            .resolve()
            .map_err(|e| DisplayError::provider(key, &*e))?;

        let eligible: Vec<&Client> = candidates
            .iter()
            .copied()
            .filter(|client| allowed.as_ref().map_or(true, |ids| ids.contains(&client.id)))
            .collect();

        let dropped: Vec<ClientId> = match &allowed {
            Some(ids) => self
                .initialized
                .iter()
                .filter(|id| !ids.contains(id))
                .copied()
                .collect(),
            None => Vec::new(),
        };

        let resolved = if eligible.is_empty() {
            None
        } else {
            let lines = content.general_lines(key)?;
            let client_lines = content.client_lines(key, &lines, &eligible)?;
            Some((lines, client_lines))
        };

        let mut report = CycleReport::default();

        if !dropped.is_empty() {
            let batch = surface.destroy_batch();
            for client in dropped {
                debug!("Element '{}' no longer shown to client {}", key, client);
                self.forget(client);
                transport.send(client, batch.clone());
                report.destroyed += 1;
            }
        }

        let Some((lines, client_lines)) = resolved else {
            return Ok(report);
        };

        if self.per_client {
            for (client, lines) in eligible.iter().zip(client_lines) {
                let mut batch = Vec::new();
                if self.initialized.insert(client.id) {
                    batch.extend(surface.create_batch(None));
                    report.created += 1;
                }

                let diff = diff_lines(&lines, self.client_lines.get(&client.id).map(Vec::as_slice));
                if batch.is_empty() && !diff.is_empty() {
                    report.updated += 1;
                }
                batch.extend(
                    diff.changes()
                        .into_iter()
                        .map(|(index, line)| surface.line_update(index, line)),
                );
                self.client_lines.insert(client.id, lines);

                if !batch.is_empty() {
                    transport.send(client.id, batch);
                }
            }
        } else {
            let diff = diff_lines(&lines, self.general.as_deref());
            let updates: Vec<DisplayPacket> = diff
                .changes()
                .into_iter()
                .map(|(index, line)| surface.line_update(index, line))
                .collect();

            for client in &eligible {
                if self.initialized.insert(client.id) {
                    // Freshly created clients already carry the current lines
                    transport.send(client.id, surface.create_batch(Some(&lines)));
                    report.created += 1;
                } else if !updates.is_empty() {
                    transport.send(client.id, updates.clone());
                    report.updated += 1;
                }
            }

            self.general = Some(lines);
        }

        Ok(report)
    }

    /// Recreates the element on `client` from the retained snapshot.
    ///
    /// Returns `None` when there is nothing retained to respawn from; the
    /// caller then runs a regular cycle.
    pub fn respawn<S: LineSurface + ?Sized>(
        &mut self,
        surface: &S,
        client: ClientId,
    ) -> Option<Vec<DisplayPacket>> {
        let lines = if self.per_client {
            self.client_lines.get(&client)?
        } else {
            self.general.as_ref()?
        };

        let batch = surface.create_batch(Some(lines));
        self.initialized.insert(client);
        Some(batch)
    }

    /// Sends the destroy batch to every initialized client and resets all state.
    pub fn destroy_all<S, T>(&mut self, surface: &S, transport: &mut T) -> usize
    where
        S: LineSurface + ?Sized,
        T: Transport + ?Sized,
    {
        let batch = surface.destroy_batch();
        let clients = std::mem::take(&mut self.initialized);
        for client in &clients {
            transport.send(*client, batch.clone());
        }
        self.general = None;
        self.client_lines.clear();
        clients.len()
    }

    /// Marks `client` uninitialized without sending anything.
    pub fn forget(&mut self, client: ClientId) -> bool {
        self.client_lines.remove(&client);
        self.initialized.remove(&client)
    }

    pub fn is_initialized(&self, client: ClientId) -> bool {
        self.initialized.contains(&client)
    }

    pub fn initialized(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.initialized.iter().copied()
    }

    pub fn is_per_client(&self) -> bool {
        self.per_client
    }

    /// The shared snapshot, in general mode.
    pub fn retained_general(&self) -> Option<&[String]> {
        self.general.as_deref()
    }

    /// The snapshot of one client, in per-client mode.
    pub fn retained_for(&self, client: ClientId) -> Option<&[String]> {
        self.client_lines.get(&client).map(Vec::as_slice)
    }
}
