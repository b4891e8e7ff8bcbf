//! HTTP routes

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use playsync_core::handoff::{AuthState, HandoffError};
use playsync_core::hub::AuthorizationError;
use playsync_core::Hub;
use serde::Deserialize;
use tracing::debug;

use crate::accounts::{self, AccessKeys};
use crate::socket;

pub struct AppState {
    pub hub: Arc<Hub>,
    pub keys: AccessKeys,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/spotify-callback", get(spotify_callback))
        .route("/api/create-user", post(accounts::create_user_route))
        .route("/api/delete-user", post(accounts::delete_user_route))
        .route("/api/update-user", post(accounts::update_user_route))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        let (outbox, inbound) = socket::split(socket);
        hub.accept(outbox, inbound).await;
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Where the playback service sends the user after they grant access
pub async fn spotify_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let auth_state = AuthState::from(params.state.as_deref().unwrap_or_default());
    if !state.hub.handoffs().contains(&auth_state) {
        debug!(state = %auth_state, "State mismatch");
        return (StatusCode::UNAUTHORIZED, "State mismatch").into_response();
    }

    let code = match (params.code, params.error) {
        (Some(code), None) => code,
        (_, error) => {
            debug!(state = %auth_state, ?error, "Authorization denied");
            return (StatusCode::UNAUTHORIZED, "Couldn't get token").into_response();
        }
    };

    match state.hub.complete_authorization(&auth_state, &code).await {
        Ok(()) => "Return to the client".into_response(),
        Err(AuthorizationError::Handoff(HandoffError::UnknownState)) => {
            (StatusCode::UNAUTHORIZED, "State mismatch").into_response()
        }
        Err(e) => {
            debug!(state = %auth_state, "Couldn't complete authorization: {}", e);
            (StatusCode::UNAUTHORIZED, "Couldn't get token").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use playsync_core::credentials::MemoryStore;
    use playsync_core::playback::{Authorizer, OAuthToken, PlaybackControl, PlaybackError};
    use playsync_core::SyncConfig;

    struct DenyingAuthorizer;

    #[async_trait]
    impl Authorizer for DenyingAuthorizer {
        fn authorize_url(&self, state: &str) -> String {
            format!("https://auth.test/?state={}", state)
        }

        async fn exchange_code(&self, _code: &str) -> Result<OAuthToken, PlaybackError> {
            Err(PlaybackError::Unauthorized)
        }

        async fn client(&self, _token: OAuthToken) -> Result<Arc<dyn PlaybackControl>, PlaybackError> {
            Err(PlaybackError::Unauthorized)
        }
    }

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState {
            hub: Hub::new(
                Arc::new(MemoryStore::new()),
                Arc::new(DenyingAuthorizer),
                SyncConfig::default(),
            ),
            keys: AccessKeys::default(),
        })
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state() {
        let params = CallbackParams {
            code: Some("code".into()),
            state: Some("NOPE".into()),
            error: None,
        };
        let response = spotify_callback(State(app_state()), Query(params)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_callback_with_failed_exchange() {
        let state = app_state();
        let handoff = state.hub.handoffs().open("alice");
        let params = CallbackParams {
            code: Some("code".into()),
            state: Some(handoff.state().to_string()),
            error: None,
        };

        let response = spotify_callback(State(state.clone()), Query(params)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.hub.handoffs().contains(handoff.state()));
    }

    #[tokio::test]
    async fn test_callback_when_user_denies_access() {
        let state = app_state();
        let handoff = state.hub.handoffs().open("alice");
        let params = CallbackParams {
            code: None,
            state: Some(handoff.state().to_string()),
            error: Some("access_denied".into()),
        };

        let response = spotify_callback(State(state.clone()), Query(params)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.hub.handoffs().contains(handoff.state()));
    }
}
