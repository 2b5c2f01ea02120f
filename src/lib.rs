//! Bridge from the Spotify dealer to VRCOSC avatar parameters.
//!
//! The dealer is Spotify's websocket push service. While a client holds a
//! dealer connection, Spotify pushes connect-state updates for the user's
//! active device. This crate:
//! * Keeps one dealer connection alive ([`dealer`])
//! * Decodes the volume and content settings payloads ([`protocol`])
//! * Folds them into a [`state::SessionState`]
//! * Reports changes as [`events::Event`]s for the host to relay
//!
//! The OSC transport itself is up to the host.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod api;
pub mod config;
pub mod dealer;
pub mod error;
pub mod events;
pub mod http;
pub mod protocol;
pub mod router;
pub mod signal;
pub mod state;
pub mod token;
