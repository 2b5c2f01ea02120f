//! Events emitted by the dealer client.
//!
//! The host bridge relays these onward, typically as OSC parameter updates
//! and triggers on the avatar.
//!
//! # Example
//!
//! ```rust
//! use vrcosc_spotify::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::VolumeChanged(volume) => println!("volume {volume}"),
//!         Event::ShuffleModeChanged(mode) => println!("shuffle {mode}"),
//!         Event::Connected | Event::Disconnected => {}
//!     }
//! }
//! ```

use std::fmt;

use crate::{protocol::dealer::volume::Volume, state::ShuffleMode};

/// Events that can be emitted by the dealer client.
///
/// Events fall into two categories:
///
/// Connection Events:
/// * [`Connected`](Self::Connected) - Dealer websocket is up
/// * [`Disconnected`](Self::Disconnected) - Dealer websocket went down
///
/// State Events:
/// * [`VolumeChanged`](Self::VolumeChanged) - Device volume changed
/// * [`ShuffleModeChanged`](Self::ShuffleModeChanged) - Derived shuffle
///   mode changed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The dealer connection was established.
    Connected,

    /// The dealer connection ended, for whatever reason.
    ///
    /// The client does not reconnect by itself.
    Disconnected,

    /// The volume changed to a new percentage.
    VolumeChanged(Volume),

    /// The shuffle mode changed.
    ShuffleModeChanged(ShuffleMode),
}

impl Event {
    /// Name of the trigger that the host module fires for this event.
    #[must_use]
    pub fn trigger_name(&self) -> &'static str {
        match self {
            Self::Connected => "ConnectedEvent",
            Self::Disconnected => "DisconnectedEvent",
            Self::VolumeChanged(_) => "VolumeEvent",
            Self::ShuffleModeChanged(_) => "ShuffleModeEvent",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::VolumeChanged(volume) => write!(f, "volume changed to {volume}"),
            Self::ShuffleModeChanged(mode) => write!(f, "shuffle mode changed to {mode}"),
        }
    }
}
