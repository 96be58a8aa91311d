use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Inspect and maintain the offline cache and pending-mutation queue")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Config file (default: $TETHER_CONFIG, then ~/.tether/tether.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the SQLite store location from the config
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarise cached items, saved ids and pending mutations
    Status {
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List pending mutations as JSON
    Pending,

    /// Delete the cached list snapshot and all TTL cache entries
    ClearCache,

    /// Delete the saved set and every pending mutation
    ClearQueue,

    /// Push pending mutations to the remote service now
    Sync,

    /// Fetch the list from the remote service and cache it
    Refresh {
        /// Server-side filter string
        #[arg(short, long)]
        query: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Probe reachability and sync on every reconnect until interrupted
    Watch,
}
