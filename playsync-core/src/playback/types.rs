//! Types for playback state and Spotify Web API bodies

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a user's player as seen by the sync loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub has_device: bool,
    pub is_playing: bool,
    /// Track currently loaded, if any
    pub track: Option<Track>,
    /// Milliseconds since the start of the track
    pub progress_ms: u64,
}

impl PlaybackState {
    /// State reported when the user has no active device
    pub fn no_device() -> Self {
        Self::default()
    }

    pub fn track_id(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
}

/// `GET /v1/me/player`
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<Item>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    /// Missing for local files
    #[serde(default)]
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
}

impl From<PlayerResponse> for PlaybackState {
    fn from(resp: PlayerResponse) -> Self {
        let has_device = resp.device.map(|d| d.is_active).unwrap_or(false);
        let track = resp.item.map(|item| Track {
            id: item.id.unwrap_or_else(|| item.uri.clone()),
            uri: item.uri,
            name: item.name,
        });

        Self {
            has_device,
            is_playing: resp.is_playing,
            track,
            progress_ms: resp.progress_ms.unwrap_or(0),
        }
    }
}

/// `PUT /v1/me/player/play`
#[derive(Debug, Clone, Serialize)]
pub struct PlayRequest {
    pub uris: Vec<String>,
    pub position_ms: u64,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth token, persisted alongside a user's credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Expired tokens are refreshed a little early
    const EXPIRY_MARGIN_SECS: i64 = 10;

    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(Self::EXPIRY_MARGIN_SECS) >= expiry,
            None => false,
        }
    }

    /// Build from a token response. A refresh response without a new
    /// refresh token keeps `previous_refresh`.
    pub fn from_response(resp: TokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: resp.access_token,
            token_type: resp.token_type,
            refresh_token: resp.refresh_token.or(previous_refresh),
            expiry: resp
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}
