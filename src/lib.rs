//! Bedrock proxy that moves connected players between backend servers
//! without the game client reconnecting.
//!
//! The proxy terminates the client's session and opens its own session to
//! a backend, logging in on the player's behalf with a re-signed identity.
//!
//! # Switching process
//! A switch opens a second backend link while the current one stays active.
//! The new backend's negotiation (encryption handshake, resource packs,
//! login status) is answered by the proxy and never reaches the client.
//! When the backend sends its start-game, the client is made to forget the
//! old world: visible players, entities, scoreboards and boss bars are
//! removed, game mode, weather, effects, rules and difficulty are reset,
//! and the client is sent through two dimension changes, first to a
//! transient dimension and then to the new one. Once the client confirms
//! the second change, the new link becomes active and the old one is closed.
//!
//! Every backend assigns its own IDs, so the IDs the client saw from its
//! first backend are kept, and packets from later backends are rewritten
//! into that space.

pub mod config;
pub mod connection;
pub mod crypto;
mod downstream;
pub mod entity_id;
pub mod error;
pub mod event;
pub mod handler;
pub mod injection;
pub mod login;
pub mod position;
pub mod protocol;
pub mod proxy;
pub mod rewrite;
pub mod server_info;
pub mod session;
#[cfg(test)]
mod testing;
pub mod transfer;
pub mod translation;
mod upstream;
