//! Spotify authorization-code flow

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use super::client::{http_client, PlaybackError, SpotifyClient, TOKEN_URL};
use super::types::{OAuthToken, TokenResponse};
use super::{Authorizer, PlaybackControl};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Permissions requested from each user
pub const SCOPES: &str = "user-modify-playback-state user-read-playback-state";

/// Registered application identity
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Where the service sends the user back (`.../spotify-callback`)
    pub redirect_uri: String,
}

pub struct SpotifyAuthorizer {
    http: Client,
    credentials: Arc<AppCredentials>,
}

impl SpotifyAuthorizer {
    pub fn new(credentials: AppCredentials) -> Result<Self, PlaybackError> {
        Ok(Self {
            http: http_client()?,
            credentials: Arc::new(credentials),
        })
    }
}

#[async_trait]
impl Authorizer for SpotifyAuthorizer {
    fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state),
        ];
        match Url::parse_with_params(AUTHORIZE_URL, &params) {
            Ok(url) => url.to_string(),
            // AUTHORIZE_URL is a valid absolute URL
            Err(_) => AUTHORIZE_URL.to_string(),
        }
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<OAuthToken, PlaybackError> {
        debug!("Exchanging authorization code");
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlaybackError::Api(format!(
                "Token exchange failed (HTTP {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(OAuthToken::from_response(token, None))
    }

    async fn client(&self, token: OAuthToken) -> Result<Arc<dyn PlaybackControl>, PlaybackError> {
        Ok(Arc::new(SpotifyClient::new(
            self.http.clone(),
            self.credentials.clone(),
            token,
        )))
    }
}
