use clap::{Parser, Subcommand};


#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file with tuning options
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Database directory
    #[arg(long = "db", default_value = "tfidx.db")]
    pub database_dir: String,

    /// Chain endpoint URL (overrides the config file)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// First block to index when the database is empty.
    /// Defaults to the start of the current minting period.
    #[arg(long)]
    pub start_height: Option<u64>,

    /// Exit once caught up with the chain head instead of tailing it
    #[arg(long)]
    pub no_follow: bool,

    /// Seconds between polls once caught up with the chain head
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Number of fetch worker processes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Wipe the database and start over
    #[arg(long)]
    pub reindex: bool,

    /// Port to use for built-in prometheus metrics server
    #[arg(long)]
    pub prom_port: Option<u16>
}


#[derive(Subcommand, Debug)]
pub enum Command {
    /// Internal command, spawned by the main process for each pool slot
    #[command(hide = true)]
    FetchWorker {
        #[arg(long)]
        endpoint: String
    }
}
