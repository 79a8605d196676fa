//! deskfleet CLI
//!
//! Single binary for the desktop fleet:
//! - `serve` runs the control daemon
//! - everything else sends one request to it and prints the answer

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deskfleet::commands;
use deskfleet::ipc::FleetClient;
use df_core::config::{self, FleetConfig};
use df_core::{Credential, HostId};

#[derive(Parser)]
#[command(name = "deskfleet")]
#[command(author, version, about = "Desktop fleet control over SSH")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Login used on the managed hosts
#[derive(Args)]
struct CredentialArgs {
    /// Account name (defaults to the configured admin account)
    #[arg(short, long)]
    user: Option<String>,

    /// Account password
    #[arg(long, env = "DESKFLEET_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl CredentialArgs {
    fn resolve(self, config: &FleetConfig) -> Result<Credential> {
        let password = self
            .password
            .context("A password is required: pass --password or set DESKFLEET_PASSWORD")?;
        let user = self
            .user
            .unwrap_or_else(|| config.fleet.admin_user.clone());
        Ok(Credential::new(user, password))
    }
}

/// Action name plus its payload
#[derive(Args)]
struct ActionArgs {
    /// Target host address
    host: String,

    /// Action name (see `deskfleet actions`)
    action: String,

    /// Payload as a JSON object
    #[arg(long)]
    payload: Option<String>,

    /// Payload entry as key=value (repeatable)
    #[arg(short = 'a', long = "arg")]
    args: Vec<String>,

    #[command(flatten)]
    credential: CredentialArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator daemon
    #[command(alias = "start")]
    Serve {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
        /// Control port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stop the orchestrator daemon
    Stop,

    /// Find hosts on the configured network range
    Discover {
        /// Print the host list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether hosts are reachable
    Status {
        /// Host addresses
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Also try to log in with the credential
        #[arg(long)]
        login: bool,
        #[command(flatten)]
        credential: CredentialArgs,
    },

    /// Run an action on a host and wait for the result
    Exec(ActionArgs),

    /// Run a command action and print its output as it arrives
    Stream(ActionArgs),

    /// List the actions this configuration provides
    Actions,

    /// List disabled launchers on a host
    Backups {
        /// Host address
        host: String,
        /// Account whose backups to list (defaults to the login account)
        #[arg(long)]
        account: Option<String>,
        #[command(flatten)]
        credential: CredentialArgs,
    },

    /// Manage screen-sharing tunnels
    Tunnel {
        #[command(subcommand)]
        action: TunnelAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TunnelAction {
    /// Start tunnels to one or more hosts
    Start {
        #[arg(required = true)]
        hosts: Vec<String>,
        #[command(flatten)]
        credential: CredentialArgs,
    },
    /// Stop the tunnel to a host
    Stop { host: String },
    /// List tunnels
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Show config file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = commands::config_path(cli.config.as_ref());

    // Config commands work on the file itself, even a broken one
    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config_show(&config_path),
            ConfigAction::Get { key } => commands::config_get(&config_path, key),
            ConfigAction::Path => {
                println!("{}", config_path.display());
                Ok(())
            }
            ConfigAction::Init { force } => commands::config_init(&config_path, *force),
        };
    }

    let mut config: FleetConfig = config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let mut client = FleetClient::with_address(config.fleet.control_address());

    match cli.command {
        Commands::Serve { foreground, port } => {
            if let Some(port) = port {
                config.fleet.control_port = port;
            }
            commands::serve_command(config, foreground, cli.config.as_ref()).await?;
        }

        Commands::Stop => commands::stop_command(&mut client).await?,

        Commands::Discover { json } => commands::discover_command(&mut client, json).await?,

        Commands::Status {
            hosts,
            login,
            credential,
        } => {
            let credential = if login {
                Some(credential.resolve(&config)?)
            } else {
                None
            };
            let hosts = hosts.into_iter().map(HostId::from).collect();
            commands::status_command(&mut client, hosts, credential).await?;
        }

        Commands::Exec(args) => {
            let payload = commands::parse_payload(args.payload.as_deref(), &args.args)?;
            let credential = args.credential.resolve(&config)?;
            commands::exec_command(
                &mut client,
                HostId::from(args.host),
                credential,
                args.action,
                payload,
            )
            .await?;
        }

        Commands::Stream(args) => {
            let payload = commands::parse_payload(args.payload.as_deref(), &args.args)?;
            let credential = args.credential.resolve(&config)?;
            commands::stream_command(
                &mut client,
                HostId::from(args.host),
                credential,
                args.action,
                payload,
            )
            .await?;
        }

        Commands::Actions => commands::actions_command(&config)?,

        Commands::Backups {
            host,
            account,
            credential,
        } => {
            let credential = credential.resolve(&config)?;
            commands::backups_command(&mut client, HostId::from(host), credential, account)
                .await?;
        }

        Commands::Tunnel { action } => match action {
            TunnelAction::Start { hosts, credential } => {
                let credential = credential.resolve(&config)?;
                let hosts = hosts.into_iter().map(HostId::from).collect();
                commands::tunnel_start(&mut client, hosts, credential).await?;
            }
            TunnelAction::Stop { host } => {
                commands::tunnel_stop(&mut client, HostId::from(host)).await?;
            }
            TunnelAction::List => commands::tunnel_list(&mut client).await?,
        },

        Commands::Config { .. } => {}
    }

    Ok(())
}
