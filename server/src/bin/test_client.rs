use bincode::{deserialize, serialize};
use shared::{Location, Packet, UseAction, WireMessage, CLIENT_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const WALK_STEPS: u32 = 40;

async fn send(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    packet: &Packet,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, server_addr).await?;
    Ok(())
}

/// Prints every packet waiting on the socket and returns actors that spawned.
async fn drain_incoming(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    let mut spawned = Vec::new();

    while let Ok(result) = timeout(Duration::from_millis(50), socket.recv_from(buf)).await {
        let (len, _) = result?;
        match deserialize::<Packet>(&buf[..len]) {
            Ok(Packet::Display { messages }) => {
                println!("Display batch with {} messages", messages.len());
                for message in messages {
                    if let WireMessage::SpawnPlayer { entity_id, .. } = &message {
                        spawned.push(*entity_id);
                    }
                    println!("  {:?}", message);
                }
            }
            Ok(Packet::Disconnected { reason }) => {
                println!("Disconnected by server: {}", reason);
            }
            Ok(other) => println!("Unexpected packet: {:?}", other),
            Err(e) => println!("Failed to deserialize packet: {}", e),
        }
    }

    Ok(spawned)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;
    let spawn = Location::new("world", 0.0, 64.0, -4.0);

    let connect = Packet::Connect {
        client_version: CLIENT_VERSION,
        name: "test_client".to_string(),
        location: spawn.clone(),
    };
    println!("Sending connection request to {}", server_addr);
    send(&socket, server_addr, &connect).await?;

    let mut buf = vec![0u8; 65_536];

    println!("Waiting for server response...");
    let (len, _) = socket.recv_from(&mut buf).await?;
    let client_id = match deserialize::<Packet>(&buf[..len])? {
        Packet::Connected {
            client_id,
            protocol,
        } => {
            println!("Connected as client {} speaking {:?}", client_id, protocol);
            client_id
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };

    drain_incoming(&socket, &mut buf).await?;
    send(&socket, server_addr, &Packet::Ready).await?;

    let mut actors = Vec::new();
    let mut crouching = false;

    // Walk a circle around the spawn area while facing its center
    for step in 0..WALK_STEPS {
        let angle = step as f64 / WALK_STEPS as f64 * std::f64::consts::TAU;
        let location = Location::new("world", angle.cos() * 6.0, 64.0, angle.sin() * 6.0);
        let towards = spawn.position().sub(&location.position());
        let (yaw, pitch) = location.rotation_towards(&towards);

        send(
            &socket,
            server_addr,
            &Packet::Move {
                location: location.with_rotation(yaw, pitch),
            },
        )
        .await?;

        if step % 10 == 5 {
            crouching = !crouching;
            send(&socket, server_addr, &Packet::Crouch { crouching }).await?;
        }

        if step % 10 == 9 {
            if let Some(entity_id) = actors.first().copied() {
                println!("Using actor {}", entity_id);
                let use_entity = Packet::UseEntity {
                    entity_id,
                    action: UseAction::Interact,
                };
                send(&socket, server_addr, &use_entity).await?;
            }
        }

        actors.extend(drain_incoming(&socket, &mut buf).await?);
        sleep(Duration::from_millis(250)).await;
    }

    println!("Client {} sending disconnect", client_id);
    send(&socket, server_addr, &Packet::Disconnect).await?;

    println!("Test client finished");
    Ok(())
}
