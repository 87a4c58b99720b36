use std::fmt::{Debug, Formatter};
use std::time::Duration;

use reqwest::{Client, IntoUrl, StatusCode, Url};
use tfidx_primitives::{BlockNumber, ChainConstants};
use tracing::debug;

use crate::error::FetchError;
use crate::types::RawBlock;


/// Access to the chain endpoint.
///
/// Implementations are not required to be safe for concurrent use -
/// callers must serialize requests or isolate each client instance in
/// its own execution context.
pub trait ChainClient {
    fn get_block(
        &self,
        height: BlockNumber
    ) -> impl std::future::Future<Output = Result<RawBlock, FetchError>> + Send;

    fn head_height(
        &self
    ) -> impl std::future::Future<Output = Result<BlockNumber, FetchError>> + Send;

    fn chain_constants(
        &self
    ) -> impl std::future::Future<Output = Result<ChainConstants, FetchError>> + Send;
}


pub fn default_http_client() -> Client {
    Client::builder()
        .read_timeout(Duration::from_secs(20))
        .connect_timeout(Duration::from_secs(20))
        .build()
        .unwrap()
}


/// HTTP implementation of [`ChainClient`].
///
/// Performs exactly one attempt per call and classifies the outcome;
/// retry scheduling is the caller's concern.
#[derive(Clone)]
pub struct RpcChainClient {
    http: Client,
    url: Url
}


impl Debug for RpcChainClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("url", &self.url.as_str())
            .finish()
    }
}


#[derive(serde::Deserialize)]
struct HeadResponse {
    height: BlockNumber
}


impl RpcChainClient {
    pub fn from_url(url: impl IntoUrl) -> anyhow::Result<Self> {
        Ok(Self {
            http: default_http_client(),
            url: url.into_url()?
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str]
    ) -> Result<T, FetchError> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::fatal("endpoint url cannot be a base"))?
            .extend(segments);

        debug!(url = %url.as_str(), "send request");

        let response = self.http
            .get(url.clone())
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError {
                kind: crate::FetchErrorKind::NotFoundYet,
                message: format!("{} returned 404", url)
            });
        }
        if !status.is_success() {
            let message = format!(
                "{} returned HTTP {}: {}",
                url,
                status.as_u16(),
                response.text().await.unwrap_or_default()
            );
            return Err(if is_retryable_status(status) {
                FetchError::transient(message)
            } else {
                FetchError::fatal(message)
            });
        }

        response
            .json()
            .await
            .map_err(|err| FetchError::fatal(format!("malformed response from {}: {}", url, err)))
    }
}


impl ChainClient for RpcChainClient {
    async fn get_block(&self, height: BlockNumber) -> Result<RawBlock, FetchError> {
        let block: RawBlock = self.get_json(&["blocks", &height.to_string()]).await
            .map_err(|err| match err.kind {
                crate::FetchErrorKind::NotFoundYet => FetchError::not_found_yet(height),
                _ => err
            })?;

        if block.height != height {
            return Err(FetchError::fatal(format!(
                "requested block {}, endpoint returned block {}",
                height, block.height
            )));
        }

        Ok(block)
    }

    async fn head_height(&self) -> Result<BlockNumber, FetchError> {
        let head: HeadResponse = self.get_json(&["head"]).await?;
        Ok(head.height)
    }

    async fn chain_constants(&self) -> Result<ChainConstants, FetchError> {
        let constants: ChainConstants = self.get_json(&["constants"]).await?;
        check_constants(&constants)?;
        Ok(constants)
    }
}


/// The period and block-time constants are divisors downstream, so a
/// zero from a broken endpoint must never leave this crate.
fn check_constants(constants: &ChainConstants) -> Result<(), FetchError> {
    if constants.period_length == 0 || constants.block_time_secs == 0 {
        return Err(FetchError::fatal(format!(
            "endpoint returned unusable chain constants: \
             period_length = {}, block_time_secs = {}",
            constants.period_length, constants.block_time_secs
        )));
    }
    Ok(())
}


fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504 | 524)
}


fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        FetchError::transient(err.to_string())
    } else {
        FetchError::fatal(err.to_string())
    }
}
