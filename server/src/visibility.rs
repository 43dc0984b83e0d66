//! Per client visibility of spatial actors
//!
//! A client sees an actor once the actor is close enough *and* inside the
//! client's view cone. After that only distance (or a world change) hides it
//! again; looking away does not. The asymmetry keeps actors from flickering
//! at the edge of the view cone.

use crate::client_manager::Client;
use crate::error::ConfigError;
use log::debug;
use shared::{ClientId, Location};
use std::collections::HashSet;

/// Below this squared distance a client counts as looking at the actor.
const SAME_SPOT_DISTANCE_SQUARED: f64 = 0.01;

/// Distance and view cone thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityRules {
    pub max_distance_squared: f64,
    /// Cosine of the widest angle between view direction and actor
    pub max_view_angle_cos: f64,
}

impl Default for VisibilityRules {
    fn default() -> Self {
        Self {
            max_distance_squared: 10_000.0,
            max_view_angle_cos: 0.5,
        }
    }
}

impl VisibilityRules {
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let reason = if !self.max_distance_squared.is_finite() || self.max_distance_squared <= 0.0 {
            Some("maximum distance must be positive and finite")
        } else if !self.max_view_angle_cos.is_finite()
            || !(-1.0..=1.0).contains(&self.max_view_angle_cos)
        {
            Some("view angle cosine must lie within -1..=1")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ConfigError::InvalidThreshold {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Explicit allow and deny lists. Both empty means everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    /// When set, only these clients may see the actor
    pub include: Option<HashSet<ClientId>>,
    pub exclude: HashSet<ClientId>,
}

impl Eligibility {
    pub fn everyone() -> Self {
        Self::default()
    }

    pub fn allows(&self, client: ClientId) -> bool {
        if let Some(include) = &self.include {
            if !include.contains(&client) {
                return false;
            }
        }
        !self.exclude.contains(&client)
    }
}

/// Result of re-evaluating one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NoChange,
    BecameVisible,
    BecameInvisible,
}

/// Whether `client` is in the actor's world and within the distance.
pub fn in_range(actor: &Location, client: &Client, rules: &VisibilityRules) -> bool {
    client.location.same_world(actor)
        && client.location.distance_squared(actor) <= rules.max_distance_squared
}

/// Whether the actor is inside the client's view cone.
pub fn in_view(actor: &Location, client: &Client, rules: &VisibilityRules) -> bool {
    if !client.location.same_world(actor) {
        return false;
    }
    if client.location.distance_squared(actor) < SAME_SPOT_DISTANCE_SQUARED {
        return true;
    }

    let eye = client.eye_location();
    match actor.position().sub(&eye.position()).normalize() {
        Some(towards) => towards.dot(&eye.direction()) >= rules.max_view_angle_cos,
        None => true,
    }
}

/// The set of clients an actor is currently shown to.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    rules: VisibilityRules,
    visible: HashSet<ClientId>,
}

impl VisibilityTracker {
    pub fn new(rules: VisibilityRules) -> Self {
        Self {
            rules,
            visible: HashSet::new(),
        }
    }

    /// Re-evaluates `client` against an actor at `actor`.
    ///
    /// Clients still completing the join handshake never change state.
    pub fn evaluate(
        &mut self,
        actor: &Location,
        eligibility: &Eligibility,
        client: &Client,
    ) -> Transition {
        if !client.join_finished {
            return Transition::NoChange;
        }

        let id = client.id;
        if !eligibility.allows(id) {
            if self.visible.remove(&id) {
                debug!("Client {} is no longer eligible", id);
                return Transition::BecameInvisible;
            }
            return Transition::NoChange;
        }

        if self.visible.contains(&id) {
            if !in_range(actor, client, &self.rules) {
                self.visible.remove(&id);
                return Transition::BecameInvisible;
            }
        } else if in_range(actor, client, &self.rules) && in_view(actor, client, &self.rules) {
            self.visible.insert(id);
            return Transition::BecameVisible;
        }

        Transition::NoChange
    }

    pub fn is_visible(&self, client: ClientId) -> bool {
        self.visible.contains(&client)
    }

    /// Drops a client without producing a transition.
    pub fn forget(&mut self, client: ClientId) -> bool {
        self.visible.remove(&client)
    }

    /// Clients the actor is shown to, in id order.
    pub fn viewers(&self) -> Vec<ClientId> {
        let mut viewers: Vec<ClientId> = self.visible.iter().copied().collect();
        viewers.sort_unstable();
        viewers
    }

    pub fn rules(&self) -> &VisibilityRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Location {
        Location::new("world", 0.0, 64.0, 0.0)
    }

    fn ready_client(location: Location) -> Client {
        let mut client = Client::new(1, "viewer".to_string(), location);
        client.join_finished = true;
        client
    }

    /// Rotates `client` so that the angle between its view and the actor has
    /// the given cosine.
    fn face_with_cos(client: &mut Client, cos: f64) {
        let eye = client.eye_location();
        let towards = actor().position().sub(&eye.position());
        let (yaw, pitch) = eye.rotation_towards(&towards);
        let offset = cos.acos().to_degrees() as f32;
        client.location = client.location.clone().with_rotation(yaw + offset, pitch);
    }

    fn face_actor(client: &mut Client) {
        let eye = client.eye_location();
        let (yaw, pitch) = eye.rotation_towards(&actor().position().sub(&eye.position()));
        client.location = client.location.clone().with_rotation(yaw, pitch);
    }

    #[test]
    fn test_view_angle_then_distance_hysteresis() {
        let mut tracker = VisibilityTracker::new(VisibilityRules {
            max_distance_squared: 100.0,
            max_view_angle_cos: 0.5,
        });
        let everyone = Eligibility::everyone();
        let mut client = ready_client(Location::new("world", 5.0, 64.0, 5.0));
        assert!((client.location.distance_squared(&actor()) - 50.0).abs() < 1e-9);

        face_with_cos(&mut client, 0.2);
        assert_eq!(tracker.evaluate(&actor(), &everyone, &client), Transition::NoChange);

        face_actor(&mut client);
        assert_eq!(
            tracker.evaluate(&actor(), &everyone, &client),
            Transition::BecameVisible
        );

        let yaw = client.location.yaw;
        client.location = client.location.clone().with_rotation(yaw + 180.0, 0.0);
        assert_eq!(tracker.evaluate(&actor(), &everyone, &client), Transition::NoChange);
        assert!(tracker.is_visible(1));

        client.location.x = 75f64.sqrt();
        client.location.z = 75f64.sqrt();
        assert_eq!(
            tracker.evaluate(&actor(), &everyone, &client),
            Transition::BecameInvisible
        );
        assert!(!tracker.is_visible(1));
    }

    #[test]
    fn test_view_cone_boundary() {
        let rules = VisibilityRules::default();
        let mut client = ready_client(Location::new("world", 0.0, 64.0, 10.0));

        face_with_cos(&mut client, 0.6);
        assert!(in_view(&actor(), &client, &rules));

        face_with_cos(&mut client, 0.4);
        assert!(!in_view(&actor(), &client, &rules));
    }

    #[test]
    fn test_same_spot_counts_as_in_view() {
        let client = ready_client(actor().with_rotation(180.0, -90.0));
        assert!(in_view(&actor(), &client, &VisibilityRules::default()));
    }

    #[test]
    fn test_other_world_never_in_range() {
        let client = ready_client(Location::new("nether", 0.0, 64.0, 0.0));
        let rules = VisibilityRules::default();

        assert!(!in_range(&actor(), &client, &rules));
        assert!(!in_view(&actor(), &client, &rules));
    }

    #[test]
    fn test_world_change_hides() {
        let mut tracker = VisibilityTracker::new(VisibilityRules::default());
        let mut client = ready_client(Location::new("world", 0.0, 64.0, 5.0));
        face_actor(&mut client);

        assert_eq!(
            tracker.evaluate(&actor(), &Eligibility::everyone(), &client),
            Transition::BecameVisible
        );

        client.location.world = "nether".to_string();
        assert_eq!(
            tracker.evaluate(&actor(), &Eligibility::everyone(), &client),
            Transition::BecameInvisible
        );
    }

    #[test]
    fn test_joining_client_is_ignored() {
        let mut tracker = VisibilityTracker::new(VisibilityRules::default());
        let mut client = ready_client(Location::new("world", 0.0, 64.0, 5.0));
        face_actor(&mut client);
        client.join_finished = false;

        assert_eq!(
            tracker.evaluate(&actor(), &Eligibility::everyone(), &client),
            Transition::NoChange
        );
        assert!(tracker.viewers().is_empty());
    }

    #[test]
    fn test_eligibility_vetoes_geometry() {
        let mut tracker = VisibilityTracker::new(VisibilityRules::default());
        let mut client = ready_client(Location::new("world", 0.0, 64.0, 5.0));
        face_actor(&mut client);

        let excluded = Eligibility {
            include: None,
            exclude: [1].into_iter().collect(),
        };
        assert_eq!(tracker.evaluate(&actor(), &excluded, &client), Transition::NoChange);

        let others_only = Eligibility {
            include: Some([2, 3].into_iter().collect()),
            exclude: HashSet::new(),
        };
        assert_eq!(tracker.evaluate(&actor(), &others_only, &client), Transition::NoChange);

        let included = Eligibility {
            include: Some([1].into_iter().collect()),
            exclude: HashSet::new(),
        };
        assert_eq!(
            tracker.evaluate(&actor(), &included, &client),
            Transition::BecameVisible
        );
    }

    #[test]
    fn test_looking_away_never_hides() {
        let mut tracker = VisibilityTracker::new(VisibilityRules::default());
        let mut client = ready_client(Location::new("world", 3.0, 64.0, 4.0));
        face_actor(&mut client);
        tracker.evaluate(&actor(), &Eligibility::everyone(), &client);

        for step in 0..36 {
            let yaw = step as f32 * 10.0;
            client.location = client.location.clone().with_rotation(yaw, (step % 7) as f32 * 10.0);
            assert_eq!(
                tracker.evaluate(&actor(), &Eligibility::everyone(), &client),
                Transition::NoChange
            );
        }
        assert_eq!(tracker.viewers(), vec![1]);
    }

    #[test]
    fn test_rule_validation() {
        assert!(VisibilityRules::default().validate("npc").is_ok());

        let negative = VisibilityRules {
            max_distance_squared: -1.0,
            ..VisibilityRules::default()
        };
        assert!(matches!(
            negative.validate("npc"),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let nan = VisibilityRules {
            max_view_angle_cos: f64::NAN,
            ..VisibilityRules::default()
        };
        assert!(nan.validate("npc").is_err());
    }
}
