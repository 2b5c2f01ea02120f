//! `SetVolumeCommand` payloads.
//!
//! Field 1 holds the volume as a varint. Depending on the sending client
//! the value is either a percentage (0-100) or a 16-bit reading
//! (0-65535). Values up to 100 are taken as a percentage, because a
//! 16-bit reading that low would be below 0.2%.

use std::fmt;

use crate::{
    error::Result,
    protocol::wire::{WireReader, WireType},
};

/// Volume as a whole percentage, always in `0..=100`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Volume(u8);

impl Volume {
    /// Highest percentage.
    pub const MAX: Self = Self(100);

    /// Full scale of a 16-bit volume reading.
    pub const RAW_MAX: u64 = 65_535;

    /// Creates a volume from a wire reading.
    ///
    /// Readings up to 100 are a percentage already. Larger readings are
    /// scaled from the 16-bit range with rounding, and clamped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vrcosc_spotify::protocol::dealer::volume::Volume;
    ///
    /// assert_eq!(Volume::from_raw(42).percent(), 42);
    /// assert_eq!(Volume::from_raw(32_768).percent(), 50);
    /// assert_eq!(Volume::from_raw(65_535).percent(), 100);
    /// ```
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        let percent = if raw <= u64::from(Self::MAX.0) {
            raw
        } else {
            // Integer rounding of `raw * 100 / 65535`.
            let raw = raw.min(Self::RAW_MAX);
            (raw * 100 + Self::RAW_MAX / 2) / Self::RAW_MAX
        };

        u8::try_from(percent).map_or(Self::MAX, Self::from_percent)
    }

    /// Creates a volume from a percentage, clamping to 100.
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        Self(percent.min(Self::MAX.0))
    }

    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    /// The volume as a ratio in `0.0..=1.0`, as OSC float parameters expect.
    #[must_use]
    pub fn as_ratio(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Decodes a `SetVolumeCommand` buffer.
///
/// Returns the first field 1 varint, or `None` when the buffer does not
/// contain one. Other fields, and field 1 with another wire type, are
/// skipped.
///
/// # Errors
///
/// Returns an error when the buffer is malformed before a volume was
/// found.
pub fn decode(buf: &[u8]) -> Result<Option<Volume>> {
    const VOLUME_FIELD: u32 = 1;

    let mut reader = WireReader::new(buf);
    while reader.has_remaining() {
        let tag = reader.read_tag()?;
        if tag.field == VOLUME_FIELD && tag.wire_type == WireType::Varint {
            return reader.read_varint().map(|raw| Some(Volume::from_raw(raw)));
        }
        reader.skip()?;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use protobuf::{CodedOutputStream, Message, MessageField};

    use super::*;
    use crate::protocol::dealer::protos::connect_state::{CommandOptions, SetVolumeCommand};

    fn command(volume: u32) -> Vec<u8> {
        SetVolumeCommand {
            volume,
            command_options: MessageField::some(CommandOptions {
                message_id: 7,
                ..Default::default()
            }),
            ..Default::default()
        }
        .write_to_bytes()
        .unwrap()
    }

    #[test]
    fn small_values_are_percentages() {
        for raw in [1, 50, 99, 100] {
            assert_eq!(
                decode(&command(raw)).unwrap(),
                Some(Volume::from_percent(u8::try_from(raw).unwrap()))
            );
        }
    }

    #[test]
    fn large_values_are_scaled() {
        assert_eq!(decode(&command(32_768)).unwrap().map(Volume::percent), Some(50));
        assert_eq!(decode(&command(65_535)).unwrap().map(Volume::percent), Some(100));
        assert_eq!(decode(&command(101)).unwrap().map(Volume::percent), Some(0));
        assert_eq!(decode(&command(655)).unwrap().map(Volume::percent), Some(1));
        // 19660 * 100 / 65535 = 29.9992
        assert_eq!(decode(&command(19_660)).unwrap().map(Volume::percent), Some(30));
    }

    #[test]
    fn scaling_matches_rounded_ratio() {
        for raw in (101..=65_535).step_by(97) {
            #[expect(clippy::cast_precision_loss)]
            let expected = (raw as f64 * 100.0 / 65_535.0).round();
            assert_eq!(f64::from(Volume::from_raw(raw).percent()), expected, "raw {raw}");
        }
    }

    #[test]
    fn out_of_range_clamps() {
        assert_eq!(Volume::from_raw(1_000_000), Volume::MAX);
        assert_eq!(Volume::from_raw(u64::MAX), Volume::MAX);
        assert_eq!(Volume::from_percent(250), Volume::MAX);
    }

    #[test]
    fn zero_volume_is_absent_on_the_wire() {
        // proto3 omits default values, so a zero volume has no field 1.
        assert_eq!(decode(&command(0)).unwrap(), None);
        assert_eq!(decode(&[0x08, 0x00]).unwrap(), Some(Volume::default()));
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut buf = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut buf);
            os.write_string(9, "unknown").unwrap();
            os.write_bytes(1, b"not a varint").unwrap();
            os.write_fixed32(4, 3).unwrap();
            os.write_uint64(1, 80).unwrap();
            os.write_uint64(1, 20).unwrap();
            os.flush().unwrap();
        }
        assert_eq!(decode(&buf).unwrap(), Some(Volume::from_percent(80)));
    }

    #[test]
    fn groups_before_the_volume_are_skipped() {
        // Group 6 holding a field 1 varint, then the real field 1.
        let buf = [(6 << 3) | 3, 0x08, 0x0a, (6 << 3) | 4, 0x08, 0x2a];
        assert_eq!(decode(&buf).unwrap(), Some(Volume::from_percent(42)));
    }

    #[test]
    fn malformed_buffer_fails() {
        // Length-delimited field 2 claims ten bytes.
        assert!(decode(&[0x12, 0x0a, 0x01]).is_err());
        // Found before the damage: still decoded.
        assert_eq!(
            decode(&[0x08, 0x32, 0x12, 0x0a]).unwrap(),
            Some(Volume::from_percent(50))
        );
    }
}
