//! Routing of dealer envelopes to payload decoders.
//!
//! Each `message` envelope names its topic in the `uri` field. The router
//! maps topics to decoders by URI prefix, applies the decoded payloads to
//! the [`SessionState`], and reports what the connection has to do next:
//! the event to emit, and whether push notifications must be enabled for
//! a newly seen connection id.

use std::{collections::HashSet, fmt};

use crate::{
    events::Event,
    protocol::dealer::{content_settings, decode_payload, volume, Envelope, Kind},
    state::SessionState,
};

/// Topics with a known payload decoder.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Topic {
    /// `SetVolumeCommand` payloads.
    Volume,

    /// `ContentSettingsUpdate` payloads.
    ContentSettings,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::ContentSettings => write!(f, "content settings"),
        }
    }
}

/// Outcome of routing one envelope.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Dispatch {
    /// Connection id for which push notifications must be enabled.
    pub enable_notifications: Option<String>,

    /// State change caused by the envelope.
    pub event: Option<Event>,
}

/// Routes envelopes by topic URI.
#[derive(Clone, Debug)]
pub struct Router {
    routes: Vec<(String, Topic)>,
    connection_ids: HashSet<String>,
}

impl Router {
    /// Topic of device volume updates.
    pub const VOLUME_URI: &'static str = "hm://connect-state/v1/connect/volume";

    /// Topic prefix of context playback mode updates.
    pub const CONTENT_SETTINGS_URI: &'static str = "hm://connect-state/v1/content-settings";

    /// Creates a router with the default routes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: vec![
                (Self::VOLUME_URI.to_owned(), Topic::Volume),
                (Self::CONTENT_SETTINGS_URI.to_owned(), Topic::ContentSettings),
            ],
            connection_ids: HashSet::new(),
        }
    }

    /// Registers another URI prefix for a topic.
    ///
    /// Routes are matched in registration order, so the default routes
    /// take precedence.
    #[must_use]
    pub fn route(mut self, uri_prefix: impl Into<String>, topic: Topic) -> Self {
        self.routes.push((uri_prefix.into(), topic));
        self
    }

    /// Returns the topic registered for `uri`.
    #[must_use]
    pub fn topic(&self, uri: &str) -> Option<Topic> {
        self.routes
            .iter()
            .find(|(prefix, _)| uri.starts_with(prefix.as_str()))
            .map(|(_, topic)| *topic)
    }

    /// Forgets the connection ids seen so far.
    ///
    /// Called when a new connection starts, as the dealer hands out a new
    /// id for every connection.
    pub fn reset(&mut self) {
        self.connection_ids.clear();
    }

    /// Routes an envelope and applies its payloads to `state`.
    ///
    /// Envelopes that are not of kind `message` and envelopes for unknown
    /// topics leave `state` untouched. One envelope produces at most one
    /// event, reflecting the state after all its payloads were applied.
    pub fn dispatch(&mut self, envelope: &Envelope, state: &mut SessionState) -> Dispatch {
        let mut dispatch = Dispatch::default();
        if envelope.kind != Kind::Message {
            trace!("ignoring {} envelope", envelope.kind);
            return dispatch;
        }

        if let Some(id) = envelope.connection_id() {
            if self.connection_ids.insert(id.to_owned()) {
                debug!("new connection id");
                dispatch.enable_notifications = Some(id.to_owned());
            }
        }

        let Some(uri) = envelope.uri.as_deref() else {
            return dispatch;
        };

        let Some(topic) = self.topic(uri) else {
            debug!("no route for {uri}");
            return dispatch;
        };

        let before = *state;
        for (index, payload) in envelope.payloads().enumerate() {
            let buf = match decode_payload(payload) {
                Ok(buf) => buf,
                Err(e) => {
                    warn!("{topic} payload {index}: {e}");
                    continue;
                }
            };

            match topic {
                Topic::Volume => match volume::decode(&buf) {
                    Ok(Some(volume)) => {
                        state.apply_volume(volume);
                    }
                    Ok(None) => debug!("{topic} payload {index} has no volume"),
                    Err(e) => warn!("{topic} payload {index}: {e}"),
                },
                Topic::ContentSettings => match content_settings::decode(&buf) {
                    Ok(settings) if settings.has_modes() => {
                        state.apply_content_settings(&settings);
                    }
                    Ok(_) => debug!("{topic} payload {index} has no known modes"),
                    Err(e) => warn!("{topic} payload {index}: {e}"),
                },
            }
        }

        dispatch.event = match topic {
            Topic::Volume => state
                .volume()
                .filter(|volume| before.volume() != Some(*volume))
                .map(Event::VolumeChanged),
            Topic::ContentSettings => (before.shuffle_mode() != state.shuffle_mode())
                .then_some(Event::ShuffleModeChanged(state.shuffle_mode())),
        };

        dispatch
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
