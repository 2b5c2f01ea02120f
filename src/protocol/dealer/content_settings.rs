//! `ContentSettingsUpdate` payloads.
//!
//! These carry the playback modes of the current context. The layout was
//! inferred from captured traffic:
//!
//! ```text
//! ContentSettingsUpdate {
//!     2: string       context uri (informational)
//!     3: ModeSetting  repeated
//! }
//! ModeSetting {
//!     1: varint       mode id (4 = shuffle, 5 = smart shuffle)
//!     2: ModeValue
//! }
//! ModeValue {
//!     2 or 3: varint  non-zero when enabled
//! }
//! ```
//!
//! A `ModeValue` without either field is read as disabled, since proto3
//! leaves out fields that hold their default. Mode ids other than 4 and 5
//! are decoded but carry no known meaning.

use std::fmt;

use crate::{
    error::Result,
    protocol::wire::{WireReader, WireType, WireValue},
};

/// Identifier of a playback mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ModeId {
    Shuffle,
    SmartShuffle,
    Other(u64),
}

impl ModeId {
    const SHUFFLE: u64 = 4;
    const SMART_SHUFFLE: u64 = 5;
}

impl From<u64> for ModeId {
    fn from(id: u64) -> Self {
        match id {
            Self::SHUFFLE => Self::Shuffle,
            Self::SMART_SHUFFLE => Self::SmartShuffle,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shuffle => write!(f, "shuffle"),
            Self::SmartShuffle => write!(f, "smart shuffle"),
            Self::Other(id) => write!(f, "mode {id}"),
        }
    }
}

/// One decoded `ModeSetting`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModeSetting {
    pub mode_id: ModeId,
    pub enabled: bool,
}

impl ModeSetting {
    /// Decodes a `ModeSetting` submessage.
    ///
    /// Returns `None` when the mode id is missing or zero, or when there is
    /// no `ModeValue`.
    ///
    /// # Errors
    ///
    /// Returns an error when the submessage is malformed.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        let mut mode_id = 0;
        let mut enabled = None;

        let mut reader = WireReader::new(buf);
        while reader.has_remaining() {
            let tag = reader.read_tag()?;
            match (tag.field, tag.wire_type) {
                (1, WireType::Varint) => mode_id = reader.read_varint()?,
                (2, WireType::LengthDelimited) => {
                    enabled = Some(decode_mode_value(&reader.read_bytes()?)?);
                }
                _ => {
                    trace!("skipping mode setting field {tag}");
                    reader.skip()?;
                }
            }
        }

        if mode_id == 0 {
            return Ok(None);
        }

        Ok(enabled.map(|enabled| Self {
            mode_id: mode_id.into(),
            enabled,
        }))
    }
}

fn decode_mode_value(buf: &[u8]) -> Result<bool> {
    let mut enabled = false;
    for field in WireReader::new(buf).fields() {
        let field = field?;
        if let (2 | 3, Some(value)) = (field.field, field.as_varint()) {
            enabled |= value != 0;
        }
    }

    Ok(enabled)
}

/// Modes reported by one `ContentSettingsUpdate`.
///
/// Flags are `None` when the update did not mention them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ContentSettings {
    pub context_uri: Option<String>,
    pub shuffle: Option<bool>,
    pub smart_shuffle: Option<bool>,
}

impl ContentSettings {
    /// Whether any known mode was reported.
    #[must_use]
    pub fn has_modes(&self) -> bool {
        self.shuffle.is_some() || self.smart_shuffle.is_some()
    }

    fn record(&mut self, setting: ModeSetting) {
        match setting.mode_id {
            ModeId::Shuffle => self.shuffle = Some(setting.enabled),
            ModeId::SmartShuffle => self.smart_shuffle = Some(setting.enabled),
            ModeId::Other(id) => debug!("ignoring mode setting {id} ({})", setting.enabled),
        }
    }
}

/// Decodes a `ContentSettingsUpdate` buffer.
///
/// Later settings for the same mode override earlier ones. A mode setting
/// that cannot be decoded is skipped, keeping the rest of the update.
///
/// # Errors
///
/// Returns an error when the top-level message is malformed.
pub fn decode(buf: &[u8]) -> Result<ContentSettings> {
    const CONTEXT_URI_FIELD: u32 = 2;
    const MODE_SETTING_FIELD: u32 = 3;

    let mut settings = ContentSettings::default();
    for field in WireReader::new(buf).fields() {
        let field = field?;
        match (field.field, field.value) {
            (CONTEXT_URI_FIELD, WireValue::Bytes(bytes)) => {
                settings.context_uri = String::from_utf8(bytes).ok();
            }
            (MODE_SETTING_FIELD, WireValue::Bytes(bytes)) => match ModeSetting::decode(&bytes) {
                Ok(Some(setting)) => settings.record(setting),
                Ok(None) => debug!("mode setting without id or value"),
                Err(e) => debug!("skipping malformed mode setting: {e}"),
            },
            _ => trace!("skipping content settings field {}", field.field),
        }
    }

    Ok(settings)
}
