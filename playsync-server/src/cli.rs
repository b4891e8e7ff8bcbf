//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "playsync-server", about = "Host synchronized Spotify listening sessions", version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8096)]
    pub port: u16,

    /// Public domain the server is reached on, used for the OAuth redirect
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// Whether the public domain is served over https
    #[arg(long = "ssl", env = "USE_SSL", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_ssl: bool,

    /// Seconds between playback sync ticks
    #[arg(long = "refresh-interval", env = "SYNC_REFRESH", default_value_t = 10)]
    pub refresh_interval: u64,

    #[arg(long, env = "SERVER_LOG_LEVEL", value_enum, default_value_t = LogLevel::Debug)]
    pub log_level: LogLevel,

    /// Directory holding the account file
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "SPOTIFY_ID", hide_env_values = true)]
    pub spotify_id: Option<String>,

    #[arg(long, env = "SPOTIFY_SECRET", hide_env_values = true)]
    pub spotify_secret: Option<String>,

    /// Key allowing account creation
    #[arg(long, env = "SERVER_KEY", hide_env_values = true)]
    pub server_key: Option<String>,

    /// Key allowing every account operation
    #[arg(long, env = "ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the server (default)
    Serve,
    /// List stored accounts and exit
    View,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Cli {
    pub fn sync_refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    /// `{http|https}://{domain}/spotify-callback`
    pub fn redirect_uri(&self) -> Option<String> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        self.domain
            .as_deref()
            .map(|domain| format!("{}://{}/spotify-callback", scheme, domain))
    }
}
