use clap::{Parser, ValueEnum};
use log::{error, info};
use server::config::{DisplayConfig, ServerConfig};
use server::context::DisplayContext;
use server::hologram::{HologramConfig, VerticalAlignment};
use server::line_diff::LineOptions;
use server::network::{Server, UdpTransport};
use server::npc::NpcConfig;
use server::sidebar::SidebarConfig;
use server::tablist::{TablistConfig, TablistGroup};
use shared::{Location, ProtocolVersion, TeamColor, TeamOptions};
use std::time::Duration;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Protocol {
    Legacy,
    Modern,
}

impl From<Protocol> for ProtocolVersion {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Legacy => ProtocolVersion::Legacy,
            Protocol::Modern => ProtocolVersion::Modern,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Protocol generation spoken by all clients
    #[arg(long, value_enum, default_value = "modern")]
    protocol: Protocol,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Seed for generated group names and actor ids
    #[arg(long)]
    seed: Option<u64>,
}

/// Installs a sidebar, a tablist, a hologram and a guide NPC at spawn.
fn install_demo_content(
    context: &mut DisplayContext<UdpTransport>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spawn = Location::new("world", 0.0, 64.0, 0.0);

    let sidebar = SidebarConfig::new(
        "§6§lDisplay Demo",
        ["§7Hello §f{name}", "", "§7World: §a{world}", "§eplay.example.net"],
    )
    .with_client_modifier(|client, lines| {
        Ok(lines
            .iter()
            .map(|line| {
                line.replace("{name}", &client.name)
                    .replace("{world}", &client.location.world)
            })
            .collect())
    })
    .with_update_interval(20);
    context.set_element(sidebar)?;

    let tablist = TablistConfig::new(|online: &[String]| {
        let staff: Vec<String> = online
            .iter()
            .filter(|name| name.starts_with("admin"))
            .cloned()
            .collect();
        Ok(vec![TablistGroup::new(
            "staff",
            TeamOptions::default()
                .with_prefix("§c[Staff] ")
                .with_color(TeamColor::Red),
            staff,
        )
        .with_custom_order(true)])
    })
    .with_update_interval(100);
    context.set_element(tablist)?;

    let hologram = HologramConfig::new(
        "welcome",
        spawn.offset(0.0, 3.0, 4.0),
        ["§bWelcome to the demo", "§7Talk to the guide"],
    )
    .with_alignment(VerticalAlignment::Bottom);
    context.set_element(hologram)?;

    let guide_location = spawn.offset(2.0, 0.0, 6.0).with_rotation(180.0, 0.0);
    let guide = NpcConfig::new("guide", "Guide", guide_location)
        .with_look_at_client(true)
        .with_mirror_crouch(true)
        .with_use_listener(|client| info!("{} talked to the guide", client.name));
    context.set_element(guide)?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_address: format!("{}:{}", args.host, args.port),
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout),
        display: DisplayConfig {
            protocol: args.protocol.into(),
            rng_seed: args.seed,
            ..DisplayConfig::default()
        },
    };

    info!("Starting display server...");
    info!(
        "Tick rate: {} Hz, protocol: {:?}",
        config.tick_rate, config.display.protocol
    );

    let mut server = Server::new(config).await?;
    install_demo_content(server.context_mut())?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
