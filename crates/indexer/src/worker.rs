use std::process::Stdio;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use tfidx_chain_client::{ChainClient, FetchError, RawBlock, RpcChainClient};
use tfidx_primitives::BlockNumber;

use crate::scanner::BlockFetcher;


/// One request line sent to a fetch worker over its stdin.
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchRequest {
    pub height: BlockNumber
}


/// One response line received from a fetch worker over its stdout.
#[derive(Debug, Serialize, Deserialize)]
pub enum FetchResponse {
    Block(RawBlock),
    Error(FetchError)
}


struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>
}


impl Worker {
    fn spawn(endpoint: &str) -> anyhow::Result<Self> {
        let exe = std::env::current_exe()
            .context("failed to determine the current executable path")?;

        let mut child = Command::new(exe)
            .arg("fetch-worker")
            .arg("--endpoint")
            .arg(endpoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn fetch worker process")?;

        let stdin = child.stdin.take()
            .ok_or_else(|| anyhow!("fetch worker has no stdin"))?;

        let stdout = child.stdout.take()
            .map(BufReader::new)
            .ok_or_else(|| anyhow!("fetch worker has no stdout"))?;

        Ok(Self {
            child,
            stdin,
            stdout
        })
    }

    async fn request(&mut self, height: BlockNumber) -> std::io::Result<FetchResponse> {
        let mut line = serde_json::to_string(&FetchRequest { height })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut reply = String::new();
        let n = self.stdout.read_line(&mut reply).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "fetch worker closed its stdout"
            ))
        }
        Ok(serde_json::from_str(&reply)?)
    }
}


/// A pool of fetch worker subprocesses.
///
/// Each worker is a child copy of this executable running the hidden
/// `fetch-worker` command, so a crash while talking to the chain takes
/// down only that child. Dead workers are respawned on the next use.
pub struct WorkerPool {
    endpoint: String,
    workers: Vec<Worker>
}


impl WorkerPool {
    pub fn spawn(endpoint: &str, size: usize) -> anyhow::Result<Self> {
        assert!(size > 0);
        let workers = (0..size)
            .map(|_| Worker::spawn(endpoint))
            .collect::<anyhow::Result<Vec<_>>>()?;
        info!(workers = size, "spawned fetch worker pool");
        Ok(Self {
            endpoint: endpoint.to_string(),
            workers
        })
    }

    /// Issues one request on the given worker, respawning it and
    /// retrying once if the pipe turns out to be broken.
    async fn fetch_one(
        endpoint: &str,
        worker: &mut Worker,
        height: BlockNumber
    ) -> Result<RawBlock, FetchError> {
        for attempt in 0.. {
            match worker.request(height).await {
                Ok(FetchResponse::Block(block)) => return Ok(block),
                Ok(FetchResponse::Error(err)) => return Err(err),
                Err(io_err) => {
                    let pid = worker.child.id();
                    warn!(
                        height,
                        pid,
                        error =% io_err,
                        "fetch worker pipe broke, respawning the worker"
                    );
                    match Worker::spawn(endpoint) {
                        Ok(fresh) => *worker = fresh,
                        Err(spawn_err) => {
                            return Err(FetchError::transient(format!(
                                "failed to respawn fetch worker: {:#}",
                                spawn_err
                            )))
                        }
                    }
                    if attempt > 0 {
                        return Err(FetchError::transient(format!(
                            "fetch worker keeps dying at block {}: {}",
                            height, io_err
                        )))
                    }
                }
            }
        }
        unreachable!()
    }
}


impl BlockFetcher for WorkerPool {
    fn capacity(&self) -> usize {
        self.workers.len()
    }

    async fn fetch_batch(
        &mut self,
        heights: &[BlockNumber]
    ) -> Vec<(BlockNumber, Result<RawBlock, FetchError>)> {
        assert!(heights.len() <= self.workers.len());
        let endpoint = self.endpoint.clone();
        let fetches = self.workers
            .iter_mut()
            .zip(heights.iter().copied())
            .map(|(worker, height)| {
                let endpoint = endpoint.clone();
                async move {
                    let result = Self::fetch_one(&endpoint, worker, height).await;
                    (height, result)
                }
            });
        futures::future::join_all(fetches).await
    }
}


/// Body of the hidden `fetch-worker` command.
///
/// Reads newline-delimited [`FetchRequest`] values from stdin, fetches
/// each block from the chain endpoint and writes one [`FetchResponse`]
/// line to stdout per request. Exits when stdin is closed.
pub async fn run_fetch_worker(endpoint: &str) -> anyhow::Result<()> {
    let client = RpcChainClient::from_url(endpoint)
        .context("invalid chain endpoint URL")?;

    let mut requests = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = requests.next_line().await? {
        if line.trim().is_empty() {
            continue
        }
        let request: FetchRequest = serde_json::from_str(&line)
            .context("malformed fetch request")?;

        let response = match client.get_block(request.height).await {
            Ok(block) => FetchResponse::Block(block),
            Err(err) => FetchResponse::Error(err)
        };

        let mut reply = serde_json::to_string(&response)?;
        reply.push('\n');
        stdout.write_all(reply.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
