//! # uploadq - Upload Coordination Daemon
//!
//! Receives upload requests as OSC-style UDP datagrams, uploads each file through a
//! storage backend and reports start/finish notifications to a manager process.
//!
//! ## Features
//!
//! - **Binary Protocol**: Compact address/typed-argument datagrams shared with peer daemons
//! - **Per-File Exclusivity**: A path is queued at most once until its upload finishes
//! - **Concurrent Uploads**: One task per in-flight file, optionally bounded
//! - **Status Notifications**: `started`/`stopped` datagrams to the manager for every request
//! - **Clean Shutdown**: A one-byte sentinel (or Ctrl-C) stops the daemon
//!
//! ## Usage
//!
//! ```bash
//! # Run the daemon
//! uploadq serve
//!
//! # Request uploads
//! uploadq request /mnt/usb/DCIM/IMG_0001.JPG
//! uploadq scan /mnt/usb --pattern '*.JPG'
//!
//! # Watch notifications and stop the daemon
//! uploadq monitor
//! uploadq stop
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uploadq::commands::{
    configured::ConfiguredCommand, credentials::CredentialsCommand, monitor::MonitorCommand,
    request::RequestCommand, scan::ScanCommand, serve::ServeCommand, stop::StopCommand,
};
use uploadq::config::Config;
use uploadq::protocol::{DEFAULT_DAEMON_ADDR, DEFAULT_MANAGER_ADDR};

/// uploadq - Upload coordination daemon for a personal storage appliance
#[derive(Parser)]
#[command(
    name = "uploadq",
    about = "Upload coordination daemon for a personal storage appliance",
    long_about = "Queues upload requests received over UDP, uploads each file through a storage backend and reports the outcome to a manager process.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the request daemon
    Serve {
        /// Address to receive requests on (overrides UPLOADQ_LISTEN_ADDR)
        #[arg(long, short = 'l')]
        listen: Option<SocketAddr>,
        /// Address notifications are sent to (overrides UPLOADQ_MANAGER_ADDR)
        #[arg(long, short = 'm')]
        manager: Option<SocketAddr>,
        /// Directory uploads are mirrored into (overrides UPLOADQ_MIRROR_DIR)
        #[arg(long)]
        mirror: Option<PathBuf>,
    },
    /// Ask the daemon to upload files
    Request {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Daemon address
        #[arg(long, short = 'd', env = "UPLOADQ_DAEMON_ADDR", default_value = DEFAULT_DAEMON_ADDR)]
        daemon: SocketAddr,
    },
    /// Request uploads for every file under a directory
    Scan {
        /// Directory to scan, typically a mounted volume
        path: PathBuf,
        /// Only request files whose name matches this glob
        #[arg(long, short = 'p')]
        pattern: Option<String>,
        /// Include dotfiles and dot-directories
        #[arg(long)]
        include_hidden: bool,
        /// Daemon address
        #[arg(long, short = 'd', env = "UPLOADQ_DAEMON_ADDR", default_value = DEFAULT_DAEMON_ADDR)]
        daemon: SocketAddr,
    },
    /// Stop a running daemon
    Stop {
        /// Daemon address
        #[arg(long, short = 'd', env = "UPLOADQ_DAEMON_ADDR", default_value = DEFAULT_DAEMON_ADDR)]
        daemon: SocketAddr,
    },
    /// Print notifications addressed to the manager
    Monitor {
        /// Address to listen on
        #[arg(long, short = 'l', default_value = DEFAULT_MANAGER_ADDR)]
        listen: SocketAddr,
        /// Exit after this many datagrams
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },
    /// Report a network configuration result to the manager
    Configured {
        /// Result code, 0 for success
        #[arg(allow_negative_numbers = true)]
        result: i32,
        /// Optional detail message
        #[arg(long)]
        message: Option<String>,
        /// Manager address
        #[arg(
            long,
            short = 'm',
            env = "UPLOADQ_MANAGER_ADDR",
            default_value = DEFAULT_MANAGER_ADDR
        )]
        manager: SocketAddr,
    },
    /// Write or update the storage credential file
    Credentials {
        /// Credential file (defaults to UPLOADQ_CREDENTIALS)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
        #[arg(long)]
        app_key: Option<String>,
        #[arg(long)]
        app_secret: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uploadq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            listen,
            manager,
            mirror,
        } => {
            let mut config = Config::from_env();
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(manager) = manager {
                config.manager_addr = manager;
            }
            if let Some(mirror) = mirror {
                config.mirror_dir = mirror;
            }
            info!(
                "Starting serve command on {}, manager: {}",
                config.listen_addr, config.manager_addr
            );
            ServeCommand::new(config).execute().await
        }
        Commands::Request { paths, daemon } => {
            RequestCommand::new(paths, daemon).execute().await
        }
        Commands::Scan {
            path,
            pattern,
            include_hidden,
            daemon,
        } => {
            info!("Starting scan command for path: {:?}", path);
            match ScanCommand::new(path, pattern.as_deref(), include_hidden, daemon) {
                Ok(cmd) => cmd.execute().await,
                Err(e) => Err(e),
            }
        }
        Commands::Stop { daemon } => StopCommand::new(daemon).execute().await,
        Commands::Monitor { listen, count } => MonitorCommand::new(listen, count).execute().await,
        Commands::Configured {
            result,
            message,
            manager,
        } => {
            ConfiguredCommand::new(result, message, manager)
                .execute()
                .await
        }
        Commands::Credentials {
            file,
            app_key,
            app_secret,
            access_token,
        } => {
            let file = file.unwrap_or_else(|| Config::from_env().credentials_path);
            CredentialsCommand::new(file, app_key, app_secret, access_token)
                .execute()
                .await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
