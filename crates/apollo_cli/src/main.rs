//! Apollo CLI
//!
//! Command-line client for the Apollo configuration service.
//!
//! # Commands
//!
//! - `get` - Fetch and print a namespace or a single key
//! - `watch` - Keep the configuration in sync and print change events
//! - `cache` - Print the snapshots held in the local disk cache

mod commands;

use apollo_sync::ClientConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Apollo configuration client.
#[derive(Parser)]
#[command(name = "apollo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where and what to fetch.
#[derive(Args)]
struct ConnectionArgs {
    /// Base URL of the config service
    #[arg(global = true, long, env = "APOLLO_CONFIG_URL", default_value = "http://localhost:8080")]
    config_url: String,

    /// Application id
    #[arg(global = true, short, long, env = "APOLLO_APP_ID")]
    app_id: Option<String>,

    /// Cluster name
    #[arg(global = true, short, long, default_value = apollo_sync::DEFAULT_CLUSTER)]
    cluster: String,

    /// Signing secret
    #[arg(global = true, long, env = "APOLLO_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Namespace to load (repeatable)
    #[arg(global = true, short, long = "namespace")]
    namespaces: Vec<String>,

    /// Disk cache directory
    #[arg(global = true, long)]
    cache_dir: Option<PathBuf>,

    /// Client IP reported to the server
    #[arg(global = true, long)]
    ip: Option<String>,
}

impl ConnectionArgs {
    fn namespaces(&self) -> Vec<String> {
        if self.namespaces.is_empty() {
            vec![apollo_sync::DEFAULT_NAMESPACE.to_string()]
        } else {
            self.namespaces.clone()
        }
    }

    fn app_id(&self) -> Result<&str, Box<dyn std::error::Error>> {
        self.app_id
            .as_deref()
            .ok_or_else(|| "application id required (--app-id or APOLLO_APP_ID)".into())
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(apollo_sync::DiskCache::default_dir)
    }

    fn client_config(&self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        let mut config = ClientConfig::new(&self.config_url, self.app_id()?)
            .with_cluster(&self.cluster)
            .with_namespaces(self.namespaces())
            .with_cache_dir(self.cache_dir())
            .with_scheduled_update(false);
        if let Some(secret) = &self.secret {
            config = config.with_secret(secret);
        }
        if let Some(ip) = &self.ip {
            config = config.with_ip(ip);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print configuration
    Get {
        /// Print only this key
        key: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Keep configuration in sync and print change events
    Watch {
        /// Disable the long-poll watcher
        #[arg(long)]
        no_long_poll: bool,

        /// Scheduled pull interval in seconds (0 disables it)
        #[arg(long, default_value = "600")]
        interval: u64,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print snapshots from the local disk cache
    Cache {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let connection = &cli.connection;
    match cli.command {
        Commands::Get { key, format } => {
            let config = connection.client_config()?;
            commands::get::run(config, key.as_deref(), &format)?;
        }
        Commands::Watch {
            no_long_poll,
            interval,
            duration,
            format,
        } => {
            let mut config = connection
                .client_config()?
                .with_long_poll_update(!no_long_poll);
            if interval > 0 {
                config = config
                    .with_scheduled_update(true)
                    .with_sync_interval(Duration::from_secs(interval));
            }
            commands::watch::run(config, duration.map(Duration::from_secs), &format)?;
        }
        Commands::Cache { format } => {
            commands::cache::run(
                &connection.cache_dir(),
                connection.app_id()?,
                &connection.namespaces(),
                &format,
            )?;
        }
        Commands::Version => {
            println!("Apollo CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn builds_client_config() {
        let cli = Cli::try_parse_from([
            "apollo",
            "--config-url",
            "http://apollo:8080",
            "--app-id",
            "demo",
            "-n",
            "application",
            "-n",
            "db.yml",
            "--ip",
            "10.1.1.1",
            "get",
            "timeout",
        ])
        .unwrap();

        let config = cli.connection.client_config().unwrap();
        assert_eq!(config.app_id, "demo");
        assert_eq!(config.cluster, "default");
        assert_eq!(config.notification_map.len(), 2);
        assert_eq!(config.ip.as_deref(), Some("10.1.1.1"));
        assert!(!config.use_scheduled_update);
        assert!(matches!(cli.command, Commands::Get { key: Some(ref k), .. } if k == "timeout"));
    }

    #[test]
    fn default_namespace() {
        let cli = Cli::try_parse_from(["apollo", "--app-id", "demo", "cache"]).unwrap();
        assert_eq!(cli.connection.namespaces(), vec!["application"]);
    }
}
