//! PlaySync - Terminal Client
//!
//! Usage:
//!   playsync-client --address sync.example.com --username alice --password pw
//!   playsync-client create-user bob hunter2
//!   playsync-client update-user bob --new-name robert

mod accounts;
mod config;
mod session;

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};

use crate::accounts::AccountClient;
use crate::config::{ClientConfig, Overrides, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "playsync-client", about = "Join synchronized Spotify listening sessions", version)]
struct Cli {
    /// Settings file; values given on the command line are saved to it
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Server address, host[:port]
    #[arg(long, global = true)]
    address: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[arg(long, global = true, hide_env_values = true, env = "PLAYSYNC_SERVER_KEY")]
    server_key: Option<String>,

    #[arg(long, global = true, hide_env_values = true, env = "PLAYSYNC_ADMIN_KEY")]
    admin_key: Option<String>,

    /// Whether the server is reached over TLS
    #[arg(long = "ssl", global = true, default_value_t = true, action = ArgAction::Set)]
    use_ssl: bool,

    /// Log filter, e.g. "debug" or "playsync_client=trace"
    #[arg(long, env = "CLIENT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Connect to the server (default)
    Connect,
    /// Create an account (server or admin key)
    CreateUser { name: String, password: String },
    /// Delete an account (admin key)
    DeleteUser { name: String },
    /// Rename an account and/or change its password (admin key)
    UpdateUser {
        name: String,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            username: self.username.clone(),
            password: self.password.clone(),
            address: self.address.clone(),
            server_key: self.server_key.clone(),
            admin_key: self.admin_key.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)?
                .add_directive("tungstenite=warn".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load(&cli.config)?;
    if config.apply(cli.overrides()) {
        config.save(&cli.config)?;
        debug!(path = %cli.config.display(), "Saved settings");
    }

    match cli.command.clone().unwrap_or(Command::Connect) {
        Command::Connect => session::run(&config, cli.use_ssl).await?,
        Command::CreateUser { name, password } => {
            accounts_client(&config, cli.use_ssl)?
                .create_user(&name, &password, &config.server_key, &config.admin_key)
                .await?;
            println!("Request succeeded");
        }
        Command::DeleteUser { name } => {
            accounts_client(&config, cli.use_ssl)?
                .delete_user(&name, &config.admin_key)
                .await?;
            println!("Request succeeded");
        }
        Command::UpdateUser {
            name,
            new_name,
            new_password,
        } => {
            accounts_client(&config, cli.use_ssl)?
                .update_user(
                    &name,
                    new_name.as_deref(),
                    new_password.as_deref(),
                    &config.admin_key,
                )
                .await?;
            println!("Request succeeded");
        }
    }

    info!("Done");
    Ok(())
}

fn accounts_client(config: &ClientConfig, use_ssl: bool) -> Result<AccountClient, session::ClientError> {
    if config.address.is_empty() {
        return Err(session::ClientError::NoAddress);
    }
    Ok(AccountClient::new(&config.address, use_ssl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_default() {
        let cli = Cli::try_parse_from(["playsync-client", "--address", "localhost:8096"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(cli.use_ssl);
        assert_eq!(cli.overrides().address.as_deref(), Some("localhost:8096"));
        assert_eq!(cli.overrides().username, None);
    }

    #[test]
    fn test_update_user_args() {
        let cli = Cli::try_parse_from([
            "playsync-client",
            "update-user",
            "bob",
            "--new-password",
            "pw2",
            "--ssl",
            "false",
        ])
        .unwrap();
        assert!(!cli.use_ssl);
        assert_eq!(
            cli.command,
            Some(Command::UpdateUser {
                name: "bob".into(),
                new_name: None,
                new_password: Some("pw2".into()),
            })
        );
    }
}
