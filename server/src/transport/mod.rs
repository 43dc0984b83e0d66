//! Delivery of display batches to clients.
//!
//! The engine hands every batch it produces to a [`Transport`]. Delivery is
//! fire-and-forget: a transport never blocks the caller and never reports
//! failures back, so a batch for a client that just disconnected is simply
//! lost. The concrete wire shape of a message depends on the protocol
//! version; each version has one [`ProtocolEncoder`].

mod legacy;
mod modern;

pub use legacy::LegacyEncoder;
pub use modern::ModernEncoder;

use log::debug;
use shared::{ClientId, DisplayPacket, ProtocolVersion, WireMessage};
use std::collections::HashMap;

/// Length limits imposed by a protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolProfile {
    pub version: ProtocolVersion,
    /// Longest team prefix or suffix; `None` means unlimited
    pub max_team_affix_length: Option<usize>,
    /// Longest objective title; `None` means unlimited
    pub max_objective_title_length: Option<usize>,
}

impl ProtocolProfile {
    pub fn for_version(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Legacy => Self {
                version,
                max_team_affix_length: Some(16),
                max_objective_title_length: Some(32),
            },
            ProtocolVersion::Modern => Self {
                version,
                max_team_affix_length: None,
                max_objective_title_length: None,
            },
        }
    }
}

/// Turns version independent messages into one version's wire shapes.
pub trait ProtocolEncoder: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    fn encode(&self, packet: &DisplayPacket) -> Vec<WireMessage>;

    fn encode_batch(&self, packets: &[DisplayPacket]) -> Vec<WireMessage> {
        packets.iter().flat_map(|packet| self.encode(packet)).collect()
    }
}

/// Returns the encoder for the configured protocol version.
pub fn encoder_for(version: ProtocolVersion) -> Box<dyn ProtocolEncoder> {
    match version {
        ProtocolVersion::Legacy => Box::new(LegacyEncoder),
        ProtocolVersion::Modern => Box::new(ModernEncoder),
    }
}

/// Ordered, best-effort delivery of message batches.
pub trait Transport {
    fn profile(&self) -> ProtocolProfile;

    /// Queues `packets` for `client` in order. Must not block.
    fn send(&mut self, client: ClientId, packets: Vec<DisplayPacket>);
}

/// In-memory transport that records every batch it is given.
#[derive(Debug)]
pub struct Outbox {
    profile: ProtocolProfile,
    batches: Vec<(ClientId, Vec<DisplayPacket>)>,
}

impl Outbox {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            profile: ProtocolProfile::for_version(version),
            batches: Vec::new(),
        }
    }

    /// All batches sent so far, in order.
    pub fn batches(&self) -> &[(ClientId, Vec<DisplayPacket>)] {
        &self.batches
    }

    /// Every message sent to `client`, flattened in order.
    pub fn packets_for(&self, client: ClientId) -> Vec<&DisplayPacket> {
        self.batches
            .iter()
            .filter(|(id, _)| *id == client)
            .flat_map(|(_, packets)| packets.iter())
            .collect()
    }

    /// Removes and returns everything sent so far.
    pub fn drain(&mut self) -> Vec<(ClientId, Vec<DisplayPacket>)> {
        std::mem::take(&mut self.batches)
    }

    /// Removes everything sent so far and groups it per client.
    pub fn drain_by_client(&mut self) -> HashMap<ClientId, Vec<DisplayPacket>> {
        let mut grouped: HashMap<ClientId, Vec<DisplayPacket>> = HashMap::new();
        for (client, packets) in self.drain() {
            grouped.entry(client).or_default().extend(packets);
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl Transport for Outbox {
    fn profile(&self) -> ProtocolProfile {
        self.profile
    }

    fn send(&mut self, client: ClientId, packets: Vec<DisplayPacket>) {
        debug!("Recording {} messages for client {}", packets.len(), client);
        self.batches.push((client, packets));
    }
}
