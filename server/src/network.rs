//! Server network layer handling UDP communications and the engine loop

use crate::config::ServerConfig;
use crate::context::DisplayContext;
use crate::transport::{encoder_for, ProtocolEncoder, ProtocolProfile, Transport};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, DisplayPacket, Packet, ProtocolVersion, CLIENT_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Largest datagram the receiver accepts
const RECEIVE_BUFFER_SIZE: usize = 2048;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Time to drop clients that went silent
    TimeoutCheck,
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the engine loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Transport that encodes display batches and queues them as datagrams.
///
/// Batches for a client whose address is not known yet are held back and
/// flushed once the address is registered, so the batches produced while a
/// client is being admitted are not lost.
pub struct UdpTransport {
    profile: ProtocolProfile,
    encoder: Box<dyn ProtocolEncoder>,
    addrs: HashMap<ClientId, SocketAddr>,
    unrouted: HashMap<ClientId, Vec<Vec<DisplayPacket>>>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl UdpTransport {
    pub fn new(version: ProtocolVersion, game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self {
            profile: ProtocolProfile::for_version(version),
            encoder: encoder_for(version),
            addrs: HashMap::new(),
            unrouted: HashMap::new(),
            game_tx,
        }
    }

    /// Routes `client` to `addr` and sends everything held back for it.
    pub fn register(&mut self, client: ClientId, addr: SocketAddr) {
        self.addrs.insert(client, addr);
        if let Some(batches) = self.unrouted.remove(&client) {
            for packets in batches {
                self.dispatch(packets, addr);
            }
        }
    }

    pub fn unregister(&mut self, client: ClientId) -> Option<SocketAddr> {
        self.unrouted.remove(&client);
        self.addrs.remove(&client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.addrs
            .iter()
            .find(|(_, client_addr)| **client_addr == addr)
            .map(|(client, _)| *client)
    }

    /// Queues a raw packet to an address, bypassing the display encoder.
    pub fn send_raw(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn dispatch(&self, packets: Vec<DisplayPacket>, addr: SocketAddr) {
        let messages = self.encoder.encode_batch(&packets);
        self.send_raw(Packet::Display { messages }, addr);
    }
}

impl Transport for UdpTransport {
    fn profile(&self) -> ProtocolProfile {
        self.profile
    }

    fn send(&mut self, client: ClientId, packets: Vec<DisplayPacket>) {
        if packets.is_empty() {
            return;
        }
        match self.addrs.get(&client) {
            Some(addr) => {
                debug!("Sending {} display messages to client {}", packets.len(), client);
                self.dispatch(packets, *addr);
            }
            None => self.unrouted.entry(client).or_default().push(packets),
        }
    }
}

/// Main server coordinating networking and the display engine
pub struct Server {
    socket: Arc<UdpSocket>,
    context: DisplayContext<UdpTransport>,
    tick_duration: Duration,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_address).await?);
        info!("Server listening on {}", config.bind_address);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let transport = UdpTransport::new(config.display.protocol, game_tx);
        let tick_duration = config.tick_duration();

        Ok(Server {
            socket,
            context: DisplayContext::new(config.display, config.max_clients, transport),
            tick_duration,
            client_timeout: config.client_timeout,
            server_tx,
            server_rx,
            game_rx: Some(game_rx),
        })
    }

    /// The engine, for installing display elements
    pub fn context_mut(&mut self) -> &mut DisplayContext<UdpTransport> {
        &mut self.context
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that periodically asks the main loop to drop silent clients
    fn spawn_timeout_checker(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                if let Err(e) = server_tx.send(ServerMessage::TimeoutCheck) {
                    error!("Failed to send timeout message: {}", e);
                    break;
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn client_at(&mut self, addr: SocketAddr) -> Option<ClientId> {
        let client_id = self.context.transport().find_client_by_addr(addr);
        match client_id {
            Some(id) => self.context.touch(id),
            None => warn!("Packet from unknown address {}", addr),
        }
        client_id
    }

    /// Processes incoming packets and forwards them to the engine
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                name,
                location,
            } => {
                info!(
                    "Client '{}' connecting from {} (version: {})",
                    name, addr, client_version
                );

                if client_version != CLIENT_VERSION {
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.context.transport().send_raw(response, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.context.transport().find_client_by_addr(addr) {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.context.client_disconnected(existing_id);
                    self.context.transport_mut().unregister(existing_id);
                }

                match self.context.client_connected(name, location) {
                    Ok(client_id) => {
                        let response = Packet::Connected {
                            client_id,
                            protocol: self.context.transport().profile().version,
                        };
                        self.context.transport().send_raw(response, addr);
                        self.context.transport_mut().register(client_id, addr);
                    }
                    Err(e) => {
                        warn!("Rejected client from {}: {}", addr, e);
                        let response = Packet::Disconnected {
                            reason: "Server full".to_string(),
                        };
                        self.context.transport().send_raw(response, addr);
                    }
                }
            }

            Packet::Ready => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context.client_join_finished(client_id);
                }
            }

            Packet::Move { location } => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context.client_moved(client_id, location);
                }
            }

            Packet::Teleport { location } => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context.client_teleported(client_id, location);
                }
            }

            Packet::Respawn { location } => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context.client_respawned(client_id, location);
                }
            }

            Packet::Crouch { crouching } => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context.client_toggled_crouch(client_id, crouching);
                }
            }

            Packet::UseEntity { entity_id, action } => {
                if let Some(client_id) = self.client_at(addr) {
                    self.context
                        .client_used_entity(client_id, entity_id, action);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.context.transport().find_client_by_addr(addr) {
                    self.context.client_disconnected(client_id);
                    self.context.transport_mut().unregister(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    fn drop_timed_out_clients(&mut self) {
        for client_id in self.context.disconnect_timed_out(self.client_timeout) {
            self.context.transport_mut().unregister(client_id);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        },
                        Some(ServerMessage::TimeoutCheck) => {
                            self.drop_timed_out_clients();
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let jobs = self.context.tick();
                    let failures = self.context.take_errors();

                    // Periodic performance monitoring
                    let tick = self.context.current_tick();
                    if tick % 100 == 0 && !self.context.clients().is_empty() {
                        debug!("Tick {}: {} clients, {} jobs, {} failed cycles",
                               tick, self.context.clients().len(), jobs, failures.len());
                    }
                },
            }
        }

        Ok(())
    }
}
