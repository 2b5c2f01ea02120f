use std::time::Duration;

use url::Url;

use crate::{error::Result, token::AccessToken};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// Dealer endpoint. The access token is appended as a query parameter.
    pub dealer_url: Url,

    /// Base URL of the Web API.
    pub api_url: Url,

    /// How long the websocket handshake may take.
    pub connect_timeout: Duration,

    /// Interval between keep-alive pings.
    pub keepalive_interval: Duration,

    /// How long `stop` waits for the connection tasks before closing.
    pub stop_grace: Duration,

    /// Text frames larger than this are dropped without parsing.
    pub max_frame_size: usize,

    pub access_token: AccessToken,
}

impl Config {
    pub const DEFAULT_DEALER_URL: &'static str = "wss://dealer.spotify.com/";
    pub const DEFAULT_API_URL: &'static str = "https://api.spotify.com";

    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

    /// Creates the default configuration for `access_token`.
    ///
    /// # Errors
    ///
    /// Fails when the default endpoints cannot be parsed, which would be a
    /// programming error.
    pub fn with_token(access_token: AccessToken) -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        // Characters that would break the product token syntax are dropped.
        let illegal_chars = |chr: char| chr == '/' || chr == ';' || chr.is_control();
        let os_version: String = os_version.chars().filter(|&chr| !illegal_chars(chr)).collect();

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,

            user_agent,

            dealer_url: Url::parse(Self::DEFAULT_DEALER_URL)?,
            api_url: Url::parse(Self::DEFAULT_API_URL)?,

            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: Self::DEFAULT_KEEPALIVE_INTERVAL,
            stop_grace: Self::DEFAULT_STOP_GRACE,
            max_frame_size: Self::DEFAULT_MAX_FRAME_SIZE,

            access_token,
        })
    }

    /// Dealer URL with the access token attached.
    #[must_use]
    pub fn dealer_request_url(&self) -> Url {
        let mut url = self.dealer_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("access_token", self.access_token.as_str());
        url
    }
}
