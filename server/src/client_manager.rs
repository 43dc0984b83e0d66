//! Roster of connected clients as the display engine sees them
//!
//! This module tracks everything the engine derives its decisions from:
//! - Client identity (server assigned id and the name used as group member)
//! - Current position and crouch state, driven by client events
//! - Join handshake progress, which gates actor visibility
//! - Connection health for timeout cleanup
//!
//! The roster never holds a connection; delivery is the transport's job.

use log::info;
use shared::{ClientId, Location, PLAYER_EYE_HEIGHT};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A connected client and the state the engine keeps about them
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Display name, used as the member string of tablist groups
    pub name: String,
    /// Last reported position and view direction
    pub location: Location,
    /// Whether the client is currently crouching
    pub crouching: bool,
    /// Set once the join handshake has completed
    pub join_finished: bool,
    /// Last time we heard from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a freshly connected client that has not finished joining
    pub fn new(id: ClientId, name: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            crouching: false,
            join_finished: false,
            last_seen: Instant::now(),
        }
    }

    /// Location of the client's eyes, carrying the view direction
    pub fn eye_location(&self) -> Location {
        self.location.eye(PLAYER_EYE_HEIGHT)
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Client ids start from 1 and are never reused while the manager lives, so
/// bookkeeping keyed by id in other modules cannot be confused by a client
/// that reconnects.
#[derive(Debug)]
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Next available client ID for new connections
    next_client_id: ClientId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client
    ///
    /// Returns `Some(client_id)` if successful, `None` if the roster is at
    /// capacity.
    pub fn add_client(&mut self, name: impl Into<String>, location: Location) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, name, location);
        info!(
            "Client {} ({}) connected in world '{}'",
            client_id, client.name, client.location.world
        );
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client, returning their last known state
    pub fn remove_client(&mut self, client_id: &ClientId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} ({}) disconnected", client.id, client.name);
        Some(client)
    }

    pub fn get(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Records a new location and returns the previous one
    pub fn set_location(&mut self, client_id: &ClientId, location: Location) -> Option<Location> {
        let client = self.clients.get_mut(client_id)?;
        client.last_seen = Instant::now();
        Some(std::mem::replace(&mut client.location, location))
    }

    /// Records the crouch state. Returns false if the client is unknown.
    pub fn set_crouching(&mut self, client_id: &ClientId, crouching: bool) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.crouching = crouching;
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Marks the join handshake as complete
    ///
    /// Returns true only on the first call for a connected client.
    pub fn mark_join_finished(&mut self, client_id: &ClientId) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) if !client.join_finished => {
                client.join_finished = true;
                client.last_seen = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Refreshes the activity timestamp of a client
    pub fn touch(&mut self, client_id: &ClientId) {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Lists clients that have been silent for longer than `timeout`
    ///
    /// The clients stay in the roster; callers disconnect them through the
    /// engine so every element can clean up.
    pub fn timed_out(&self, timeout: Duration) -> Vec<ClientId> {
        let mut timed_out: Vec<ClientId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();
        timed_out.sort_unstable();
        timed_out
    }

    /// All connected client ids in ascending order
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All connected clients ordered by id
    pub fn clients(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by_key(|client| client.id);
        clients
    }

    /// Names of all connected clients ordered by id
    pub fn names(&self) -> Vec<String> {
        self.clients()
            .into_iter()
            .map(|client| client.name.clone())
            .collect()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> Location {
        Location::new("world", 0.0, 64.0, 0.0)
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, "Alex", spawn());

        assert_eq!(client.id, 1);
        assert_eq!(client.name, "Alex");
        assert!(!client.crouching);
        assert!(!client.join_finished);
    }

    #[test]
    fn test_client_eye_location() {
        let client = Client::new(1, "Alex", spawn());
        let eye = client.eye_location();
        assert_eq!(eye.y, 64.0 + PLAYER_EYE_HEIGHT);
        assert_eq!(eye.world, "world");
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, "Alex", spawn());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let first = manager.add_client("Alex", spawn()).unwrap();
        let second = manager.add_client("Sam", spawn()).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.names(), vec!["Alex", "Sam"]);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client("Alex", spawn()).is_some());
        assert!(manager.add_client("Sam", spawn()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(2);

        let first = manager.add_client("Alex", spawn()).unwrap();
        assert!(manager.remove_client(&first).is_some());
        let second = manager.add_client("Alex", spawn()).unwrap();

        assert_ne!(first, second);
        assert!(manager.remove_client(&first).is_none());
    }

    #[test]
    fn test_set_location_returns_previous() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client("Alex", spawn()).unwrap();

        let previous = manager
            .set_location(&id, Location::new("nether", 1.0, 2.0, 3.0))
            .unwrap();

        assert_eq!(previous.world, "world");
        assert_eq!(manager.get(&id).unwrap().location.world, "nether");
        assert!(manager.set_location(&99, spawn()).is_none());
    }

    #[test]
    fn test_join_finished_only_once() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client("Alex", spawn()).unwrap();

        assert!(manager.mark_join_finished(&id));
        assert!(!manager.mark_join_finished(&id));
        assert!(manager.get(&id).unwrap().join_finished);
    }

    #[test]
    fn test_timed_out_keeps_clients() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client("Alex", spawn()).unwrap();
        manager.clients.get_mut(&id).unwrap().last_seen = Instant::now() - Duration::from_secs(10);

        assert_eq!(manager.timed_out(Duration::from_secs(5)), vec![id]);
        assert!(manager.contains(&id));

        manager.touch(&id);
        assert!(manager.timed_out(Duration::from_secs(5)).is_empty());
    }
}
