//! Spotify access tokens.
//!
//! The bridge does not acquire tokens itself. The host supplies a bearer
//! token obtained through its own OAuth or cookie flow, either directly or
//! through a secrets file:
//!
//! ```toml
//! access_token = "BQD..."
//! ```
//!
//! Tokens are redacted from `Debug` output so that they never end up in
//! logs.

use std::{fmt, fs, str::FromStr};

use veil::Redact;

use crate::error::{Error, Result};

/// Bearer token for the dealer and the Web API.
#[derive(Clone, PartialEq, Eq, Hash, Redact)]
#[redact(all)]
pub struct AccessToken(String);

impl AccessToken {
    /// Tokens are opaque, but have been observed to stay well below this.
    const MAX_LEN: usize = 4096;

    /// Secrets files are tiny; refuse anything larger than this.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Key of the token in the secrets file.
    const SECRETS_KEY: &'static str = "access_token";

    /// Loads the token from a TOML secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, is too large, is not
    /// valid TOML, or does not hold a valid `access_token`.
    pub fn from_file(secrets_file: &str) -> Result<Self> {
        let attributes = fs::metadata(secrets_file)?;
        if attributes.len() > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{secrets_file} is too large"
            )));
        }

        let contents = fs::read_to_string(secrets_file)?;
        let table = contents.parse::<toml::Table>()?;
        match table.get(Self::SECRETS_KEY).and_then(toml::Value::as_str) {
            Some(token) => token.parse(),
            None => Err(Error::not_found(format!(
                "{secrets_file} does not contain an {}",
                Self::SECRETS_KEY
            ))),
        }
    }

    /// The token text, for use in request URLs and headers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccessToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument("access token is empty"));
        }

        if token.len() > Self::MAX_LEN {
            return Err(Error::invalid_argument(format!(
                "access token is {} bytes long",
                token.len()
            )));
        }

        // Tokens go verbatim into a query string and a header.
        if token
            .chars()
            .any(|chr| chr.is_whitespace() || chr.is_control() || !chr.is_ascii())
        {
            return Err(Error::invalid_argument(
                "access token contains invalid characters",
            ));
        }

        Ok(Self(token.to_owned()))
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::error::ErrorKind;

    fn secrets_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vrcosc-spotify-secrets-{}-{}.toml",
            std::process::id(),
            fastrand::u64(..)
        ));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_and_trims() {
        let token: AccessToken = "  BQDx-abc_123  ".parse().unwrap();
        assert_eq!(token.as_str(), "BQDx-abc_123");
    }

    #[test]
    fn rejects_invalid_tokens() {
        assert!("".parse::<AccessToken>().is_err());
        assert!("has space".parse::<AccessToken>().is_err());
        assert!("x".repeat(5000).parse::<AccessToken>().is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let token: AccessToken = "BQDsecret".parse().unwrap();
        assert!(!format!("{token:?}").contains("BQDsecret"));
    }

    #[test]
    fn loads_from_file() {
        let path = secrets_file("access_token = \"BQDfromfile\"\n");
        let token = AccessToken::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(token.as_str(), "BQDfromfile");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_key_is_not_found() {
        let path = secrets_file("arl = \"something\"\n");
        let err = AccessToken::from_file(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        fs::remove_file(path).unwrap();
    }
}
