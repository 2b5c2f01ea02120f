//! Calls to the Spotify Web API.
//!
//! The dealer only pushes player updates for a connection after the client
//! registered that connection with the player API. Registering is the only
//! Web API call this crate makes.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use url::Url;

use crate::{error::Result, http, token::AccessToken};

/// Client for the player endpoints of the Web API.
#[derive(Clone)]
pub struct PlayerApi {
    http_client: Arc<http::Client>,
    api_url: Url,
    access_token: AccessToken,
}

impl PlayerApi {
    const NOTIFICATIONS_PATH: &'static str = "v1/me/notifications/player";

    #[must_use]
    pub fn new(http_client: Arc<http::Client>, api_url: Url, access_token: AccessToken) -> Self {
        Self {
            http_client,
            api_url,
            access_token,
        }
    }

    /// URL that enables player notifications for `connection_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the API URL cannot be a base.
    pub fn notifications_url(&self, connection_id: &str) -> Result<Url> {
        let mut url = self.api_url.join(Self::NOTIFICATIONS_PATH)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("connection_id", connection_id);
        Ok(url)
    }

    /// Subscribes the dealer connection `connection_id` to player updates.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers with a
    /// non-success status.
    pub async fn enable_notifications(&self, connection_id: &str) -> Result<()> {
        let url = self.notifications_url(connection_id)?;

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", self.access_token.as_str()))?;
        authorization.set_sensitive(true);

        let mut request = self.http_client.put(url, Vec::<u8>::new());
        request.headers_mut().insert(AUTHORIZATION, authorization);

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        response.error_for_status()?;

        debug!("enabled player notifications: {status}");
        Ok(())
    }
}
