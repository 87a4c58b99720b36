use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};


/// Tuning options read from an optional JSON config file. Values on
/// the command line take precedence over values found here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain endpoint URL.
    pub endpoint: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds between polls once caught up with the chain head.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Consecutive failed fetches of one height tolerated during
    /// backfill before giving up. Live-tail retries are unbounded.
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: usize,
    /// Storage failures tolerated for one commit before giving up.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: usize,
    /// Retry backoff schedule in milliseconds; the last entry repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>
}


fn default_workers() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    6
}

fn default_max_fetch_attempts() -> usize {
    10
}

fn default_max_commit_attempts() -> usize {
    3
}

fn default_backoff_ms() -> Vec<u64> {
    vec![0, 100, 200, 500, 1000, 2000, 5000, 10000]
}


impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            workers: default_workers(),
            poll_interval_secs: default_poll_interval_secs(),
            max_fetch_attempts: default_max_fetch_attempts(),
            max_commit_attempts: default_max_commit_attempts(),
            backoff_ms: default_backoff_ms()
        }
    }
}


impl Config {
    pub fn read(file: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_reader(
            std::io::BufReader::new(std::fs::File::open(file)?)
        )?;
        config.validate().context("invalid config")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.workers >= 1, "worker pool must have at least one worker");
        ensure!(self.poll_interval_secs >= 1, "poll interval must be at least 1 second");
        ensure!(!self.backoff_ms.is_empty(), "backoff schedule cannot be empty");
        ensure!(self.max_fetch_attempts >= 1, "max fetch attempts must be at least 1");
        ensure!(self.max_commit_attempts >= 1, "max commit attempts must be at least 1");
        Ok(())
    }
}
