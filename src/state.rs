//! Playback state observed through the dealer.
//!
//! [`SessionState`] is written only by the receive loop of a dealer
//! connection. Other tasks observe it through snapshots published on a
//! `tokio::sync::watch` channel, see
//! [`Client::state`](crate::dealer::Client::state).

use std::fmt;

use crate::{
    events::Event,
    protocol::dealer::{content_settings::ContentSettings, volume::Volume},
};

/// Combined shuffle mode, as reported to the avatar.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum ShuffleMode {
    #[default]
    Off = 0,
    Shuffle = 1,
    SmartShuffle = 2,
}

impl ShuffleMode {
    /// Derives the mode from both flags.
    ///
    /// Shuffle being off wins over smart shuffle being on.
    #[must_use]
    pub fn derive(shuffle: bool, smart_shuffle: bool) -> Self {
        match (shuffle, smart_shuffle) {
            (false, _) => Self::Off,
            (true, true) => Self::SmartShuffle,
            (true, false) => Self::Shuffle,
        }
    }

    /// Numeric value for the OSC integer parameter.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ShuffleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Shuffle => write!(f, "shuffle"),
            Self::SmartShuffle => write!(f, "smart shuffle"),
        }
    }
}

/// Volume and shuffle state of the active Spotify device.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SessionState {
    volume: Option<Volume>,
    shuffle: bool,
    smart_shuffle: bool,
    shuffle_mode: ShuffleMode,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last volume seen, or `None` before the first volume update.
    #[must_use]
    pub fn volume(&self) -> Option<Volume> {
        self.volume
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[must_use]
    pub fn smart_shuffle(&self) -> bool {
        self.smart_shuffle
    }

    #[must_use]
    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    /// Records a volume. Returns an event when it changed.
    pub fn apply_volume(&mut self, volume: Volume) -> Option<Event> {
        if self.volume == Some(volume) {
            return None;
        }

        self.volume = Some(volume);
        Some(Event::VolumeChanged(volume))
    }

    /// Records the modes of a content settings update.
    ///
    /// Flags that the update does not mention keep their value. Returns an
    /// event when the shuffle mode changed; a flag may change without
    /// changing the mode, which updates the state silently.
    pub fn apply_content_settings(&mut self, settings: &ContentSettings) -> Option<Event> {
        if !settings.has_modes() {
            return None;
        }

        if let Some(shuffle) = settings.shuffle {
            self.shuffle = shuffle;
        }
        if let Some(smart_shuffle) = settings.smart_shuffle {
            self.smart_shuffle = smart_shuffle;
        }

        let shuffle_mode = ShuffleMode::derive(self.shuffle, self.smart_shuffle);
        if shuffle_mode == self.shuffle_mode {
            return None;
        }

        self.shuffle_mode = shuffle_mode;
        Some(Event::ShuffleModeChanged(shuffle_mode))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.volume {
            Some(volume) => write!(f, "volume {volume}")?,
            None => write!(f, "volume unknown")?,
        }
        write!(f, ", shuffle {}", self.shuffle_mode)
    }
}
