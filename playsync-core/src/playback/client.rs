//! Spotify Web API HTTP Client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::auth::AppCredentials;
use super::types::*;
use super::PlaybackControl;

/// Web API root
pub const API_BASE: &str = "https://api.spotify.com/v1";

/// Accounts service token endpoint
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the playback service
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token rejected or expired")]
    Unauthorized,

    #[error("No active device")]
    NoActiveDevice,

    /// Command not allowed in the player's current state
    #[error("Command refused by player: {0}")]
    Forbidden(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Build the shared HTTP client
pub(crate) fn http_client() -> Result<Client, PlaybackError> {
    Ok(Client::builder()
        .connect_timeout(CONNECTION_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()?)
}

/// Map a non-success status to an error
fn status_error(status: StatusCode, body: &str) -> PlaybackError {
    match status.as_u16() {
        401 => PlaybackError::Unauthorized,
        403 => PlaybackError::Forbidden(body.to_string()),
        404 if body.contains("NO_ACTIVE_DEVICE") => PlaybackError::NoActiveDevice,
        code => PlaybackError::Api(format!("Unexpected response (HTTP {}): {}", code, body)),
    }
}

/// One user's Spotify player
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    token_url: String,
    credentials: Arc<AppCredentials>,
    token: Mutex<OAuthToken>,
}

impl SpotifyClient {
    pub fn new(http: Client, credentials: Arc<AppCredentials>, token: OAuthToken) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            credentials,
            token: Mutex::new(token),
        }
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Point token refreshes at another endpoint
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Current access token, refreshed first when expired
    async fn access_token(&self) -> Result<String, PlaybackError> {
        let current = self.token.lock().clone();
        if !current.is_expired() {
            return Ok(current.access_token);
        }

        let Some(refresh) = current.refresh_token.clone() else {
            return Err(PlaybackError::Unauthorized);
        };

        debug!("Refreshing access token");
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Token refresh failed: HTTP {}", status);
            return Err(status_error(status, &body));
        }

        let fresh = OAuthToken::from_response(resp.json().await?, Some(refresh));
        let access = fresh.access_token.clone();
        *self.token.lock() = fresh;
        Ok(access)
    }

    /// Build an authenticated request
    async fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, PlaybackError> {
        let url = format!("{}/me/player{}", self.base_url, path);
        let token = self.access_token().await?;
        Ok(self.http.request(method, &url).bearer_auth(token))
    }

    /// Send a command and check the status
    async fn command(&self, req: reqwest::RequestBuilder) -> Result<(), PlaybackError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

#[async_trait]
impl PlaybackControl for SpotifyClient {
    #[instrument(skip(self))]
    async fn state(&self) -> Result<PlaybackState, PlaybackError> {
        let resp = self.request(Method::GET, "").await?.send().await?;

        // Nothing to report: no active device
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(PlaybackState::no_device());
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let player: PlayerResponse = resp.json().await?;
        Ok(player.into())
    }

    #[instrument(skip(self))]
    async fn pause(&self) -> Result<(), PlaybackError> {
        let req = self.request(Method::PUT, "/pause").await?;
        match self.command(req).await {
            // Pausing an already paused player is reported as 403
            Err(PlaybackError::Forbidden(_)) => Ok(()),
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn seek(&self, position_ms: u64) -> Result<(), PlaybackError> {
        let req = self
            .request(Method::PUT, "/seek")
            .await?
            .query(&[("position_ms", position_ms)]);
        self.command(req).await
    }

    #[instrument(skip(self))]
    async fn play(&self, uri: &str, position_ms: u64) -> Result<(), PlaybackError> {
        let body = PlayRequest {
            uris: vec![uri.to_string()],
            position_ms,
        };
        let req = self.request(Method::PUT, "/play").await?.json(&body);
        self.command(req).await
    }

    fn token(&self) -> Option<OAuthToken> {
        Some(self.token.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn credentials() -> Arc<AppCredentials> {
        Arc::new(AppCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost/spotify-callback".into(),
        })
    }

    fn live_token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.into(),
            token_type: "Bearer".into(),
            refresh_token: Some("refresh-1".into()),
            expiry: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        }
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Read one request: headers plus a `Content-Length` body
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve `responses` in order, one connection each, returning the raw
    /// requests received
    async fn fake_service(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for reply in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });

        (base, handle)
    }

    fn client_for(base: &str, token: OAuthToken) -> SpotifyClient {
        SpotifyClient::new(http_client().unwrap(), credentials(), token)
            .with_base_url(format!("{}/v1", base))
            .with_token_url(format!("{}/api/token", base))
    }

    #[tokio::test]
    async fn test_no_content_means_no_device() {
        let (base, server) = fake_service(vec![response("204 No Content", "")]).await;
        let client = client_for(&base, live_token("live"));

        let state = client.state().await.unwrap();

        assert_eq!(state, PlaybackState::no_device());
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /v1/me/player HTTP/1.1"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer live"));
    }

    #[tokio::test]
    async fn test_player_state_is_parsed() {
        let body = r#"{"device":{"id":"d1","is_active":true,"name":"Desk"},"is_playing":true,"progress_ms":42000,"item":{"id":"t1","uri":"spotify:track:t1","name":"Song"}}"#;
        let (base, server) = fake_service(vec![response("200 OK", body)]).await;
        let client = client_for(&base, live_token("live"));

        let state = client.state().await.unwrap();

        assert!(state.has_device);
        assert!(state.is_playing);
        assert_eq!(state.progress_ms, 42_000);
        assert_eq!(state.track_id(), Some("t1"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_on_paused_player_succeeds() {
        let refused = r#"{"error":{"status":403,"message":"Player command failed: Restriction violated"}}"#;
        let (base, server) = fake_service(vec![
            response("403 Forbidden", refused),
            response("403 Forbidden", refused),
        ])
        .await;
        let client = client_for(&base, live_token("live"));

        client.pause().await.unwrap();
        let err = client.seek(1000).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Forbidden(_)));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PUT /v1/me/player/pause HTTP/1.1"));
        assert!(requests[1].starts_with("PUT /v1/me/player/seek?position_ms=1000 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_play_sends_uri_and_position() {
        let (base, server) = fake_service(vec![response("204 No Content", "")]).await;
        let client = client_for(&base, live_token("live"));

        client.play("spotify:track:t1", 1500).await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PUT /v1/me/player/play HTTP/1.1"));
        assert!(requests[0].ends_with(r#"{"uris":["spotify:track:t1"],"position_ms":1500}"#));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let (base, server) = fake_service(vec![
            response("200 OK", r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#),
            response("204 No Content", ""),
            response("204 No Content", ""),
        ])
        .await;
        let expired = OAuthToken {
            expiry: Some(chrono::Utc::now() - chrono::Duration::seconds(60)),
            ..live_token("stale")
        };
        let client = client_for(&base, expired);

        client.state().await.unwrap();
        client.state().await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /api/token HTTP/1.1"));
        assert!(requests[0].contains("grant_type=refresh_token&refresh_token=refresh-1"));
        assert!(requests[1].to_lowercase().contains("authorization: bearer fresh"));
        assert!(requests[2].to_lowercase().contains("authorization: bearer fresh"));

        let token = client.token().unwrap();
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
        assert!(!token.is_expired());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            PlaybackError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, r#"{"error":{"reason":"NO_ACTIVE_DEVICE"}}"#),
            PlaybackError::NoActiveDevice
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "restricted"),
            PlaybackError::Forbidden(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "oops"),
            PlaybackError::Api(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_is_unauthorized() {
        let creds = credentials();
        let token = OAuthToken {
            access_token: "a".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: Some(chrono::Utc::now() - chrono::Duration::seconds(60)),
        };
        let client = SpotifyClient::new(http_client().unwrap(), creds, token.clone());

        assert!(matches!(client.access_token().await, Err(PlaybackError::Unauthorized)));
        assert_eq!(client.token(), Some(token));
    }
}
