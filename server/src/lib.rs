//! # Multiplayer Overlay Server
//!
//! This library hosts the server side of a multiplayer overlay for a
//! single-player tile game. Players keep running the game locally; the
//! overlay relays their avatar state to everyone else on the same map and
//! turns in-game switch, variable and position events into persistent
//! unlocks.
//!
//! ## Core Responsibilities
//!
//! ### Room Relay
//! Each configured map owns one room. A room validates every avatar
//! mutation, echoes it to the occupants allowed to see the sender and
//! hands a fresh snapshot of every visible avatar to newcomers.
//!
//! ### Progression
//! Switch and variable reports are evaluated against the map's conditions.
//! Matches unlock tags, record time trials and minigame scores, or ask the
//! client to report a value it has not sent yet.
//!
//! ### Identity Sessions
//! A second connection per player carries everything that is not tied to
//! a room: profile and display name, global and party chat, friends,
//! parties, timed events, badges and moderation.
//!
//! ## Architecture Design
//!
//! ### Actor per Room and per Session
//! Room and session state is owned by one Tokio task each and driven
//! through a bounded mailbox. Nothing outside the task touches a room's
//! occupants, so command processing never takes a lock.
//!
//! ### Non-Blocking Fan-Out
//! Every connection has a bounded outbox drained by its own writer task.
//! Actors push without waiting; a peer whose outbox fills up is cancelled
//! instead of slowing down the room.
//!
//! ### Authenticated Frames
//! Client frames carry a truncated SHA-256 signature over a shared signing
//! key, a per-connection client key and a strictly increasing counter, so
//! replayed or forged frames are dropped.
//!
//! ## Module Organization
//!
//! - `gateway`: WebSocket upgrade, identity resolution, frame pumping
//! - `connection`: outboxes, the writer task and frame authentication
//! - `hub`: registries shared by all actors
//! - `room`, `room_client`, `room_handlers`, `rewards`: the room actor
//! - `session`: the identity-scoped session actor
//! - `store`, `chat`, `config`, `error`: collaborators and support types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{GameConfig, ServerSettings};
//! use server::gateway::Server;
//! use server::hub::Hub;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Hub::in_memory(ServerSettings::default(), GameConfig::default())?;
//!     let server = Server::bind("127.0.0.1:8080", hub).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod rewards;
pub mod room;
pub mod room_client;
pub mod room_handlers;
pub mod session;
pub mod store;
