//! # Display Server Library
//!
//! This library keeps a set of server-defined display elements synchronized
//! on every connected client. It decides which messages each client needs
//! and when it needs them, so that the client always shows the current
//! content without being flooded by redundant updates.
//!
//! ## Core Responsibilities
//!
//! ### Display Elements
//! Four kinds of element are supported:
//! - **Sidebar**: a titled, fixed-height text panel with one team per line
//! - **Holograms**: stacked floating text lines anchored at a location
//! - **Tablist groups**: player-list teams with prefixes, colors and ordering
//! - **NPCs**: player-shaped actors that can look at and mirror each viewer
//!
//! ### Minimal Updates
//! Line content is diffed against what each client last received. Only lines
//! that changed are resent, and a cycle that changes nothing sends nothing.
//! Tablist groups are reconciled against the existing teams so that groups
//! keep their team names and only membership deltas go out.
//!
//! ### Visibility
//! Spatial actors become visible once a client is close enough and looking
//! roughly at them, and disappear only when the client walks away or leaves
//! the world. The hysteresis keeps actors from flickering at the edge of the
//! view cone.
//!
//! ## Architecture Design
//!
//! ### Single Update Thread
//! All element state lives in one [`context::DisplayContext`] that is mutated
//! only from the server loop. Periodic updates are scheduled in ticks and run
//! from `tick()`, client events are applied as they arrive, and nothing needs
//! locking.
//!
//! ### Transport Seam
//! Message batches are handed to a [`transport::Transport`], which encodes
//! them for the protocol generation clients speak. The UDP server in
//! [`network`] is one transport; [`transport::Outbox`] collects batches in
//! memory for tests and tooling.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Roster of connected clients: location, crouch state, join handshake and
//! timeout tracking.
//!
//! ### Line Diff Module (`line_diff`)
//! The shared update cycle for line-based elements: modifiers, viewer
//! filtering, per-client retention and changed-line detection.
//!
//! ### Element Modules (`sidebar`, `hologram`, `tablist`, `npc`)
//! Message construction and lifecycle for each element kind.
//!
//! ### Identity Module (`identity`)
//! Unique team names and entity identifiers shared by all elements.
//!
//! ### Scheduler Module (`scheduler`)
//! Repeating and one-shot jobs measured in ticks.
//!
//! ### Network Module (`network`)
//! UDP socket handling, connection handshake and the server loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::line_diff::LineOptions;
//! use server::network::Server;
//! use server::sidebar::SidebarConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!
//!     // Refresh the sidebar once a second at the default 20Hz tick rate
//!     let sidebar = SidebarConfig::new("Lobby", ["Welcome", "", "Have fun"])
//!         .with_update_interval(20);
//!     server.context_mut().set_element(sidebar)?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod context;
pub mod error;
pub mod hologram;
pub mod identity;
pub mod line_diff;
pub mod network;
pub mod npc;
pub mod scheduler;
pub mod sidebar;
pub mod tablist;
pub mod transport;
pub mod visibility;

pub use context::{DisplayContext, ElementConfig, ElementKey};
pub use error::{ConfigError, DisplayError, InvariantViolation};
pub use transport::{Outbox, Transport};
