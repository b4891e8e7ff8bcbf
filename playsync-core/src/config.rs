//! Engine timing configuration

use std::time::Duration;

/// Default interval between sync ticks
pub const DEFAULT_SYNC_REFRESH: Duration = Duration::from_secs(10);

/// Shortest accepted interval between sync ticks
pub const MIN_SYNC_REFRESH: Duration = Duration::from_secs(1);

/// Timings used by sessions and the admission handshake
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the synchronization loop
    pub sync_refresh: Duration,
    /// How long a new connection has to answer `LOGIN`
    pub login_timeout: Duration,
    /// How long to wait for the OAuth callback to deliver a token
    pub token_timeout: Duration,
    /// How long to wait for the player client once the token has arrived
    pub client_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_refresh: DEFAULT_SYNC_REFRESH,
            login_timeout: Duration::from_secs(60),
            token_timeout: Duration::from_secs(300),
            client_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    /// Set the tick period, raised to at least [`MIN_SYNC_REFRESH`]
    pub fn with_sync_refresh(mut self, sync_refresh: Duration) -> Self {
        self.sync_refresh = sync_refresh.max(MIN_SYNC_REFRESH);
        self
    }

    /// Tick period actually used by the sync loop
    pub fn tick_period(&self) -> Duration {
        self.sync_refresh.max(MIN_SYNC_REFRESH)
    }
}
