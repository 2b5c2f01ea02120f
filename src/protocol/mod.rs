//! Protocol types for Spotify's real-time services.
//!
//! # Submodules
//!
//! * [`wire`] - schema-less protobuf wire format reader
//! * [`dealer`] - JSON envelopes of the dealer push service, and the
//!   protobuf payloads they carry
//!
//! # Shared Functionality
//!
//! [`json`] parses JSON with consistent logging, so that protocol
//! analysis can be done by raising the log level to `trace`.

pub mod dealer;
pub mod wire;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs JSON text received from a Spotify service.
///
/// # Arguments
///
/// * `body` - JSON text to parse
/// * `origin` - Description of the service for logging
///
/// # Errors
///
/// Returns error if the text is not valid JSON or does not match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error at DEBUG level and raw text at TRACE level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                debug!("{origin}: failed parsing json ({e})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
