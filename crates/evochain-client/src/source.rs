//! Where pages come from.

use evochain_api::{DatasetSummary, EvolutionApi, PageQuery};
use evochain_core::{Chain, ChainFilter, PageSize};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;

#[derive(Debug, Clone, thiserror::Error, Serialize, Eq, PartialEq)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed page payload: {0}")]
    Payload(String),
    #[error("page fetch timed out after {0} ms")]
    Timeout(u64),
    #[error("page fetch task failed: {0}")]
    Task(String),
}

/// Asynchronous page provider used by [`crate::Feed`].
///
/// Returned futures must not borrow `self`; the feed moves them onto spawned tasks.
pub trait PageSource: Send + Sync + 'static {
    fn fetch_page(
        &self,
        filter: &ChainFilter,
        page: u32,
    ) -> BoxFuture<'static, Result<Vec<Chain>, FetchError>>;
}

/// Answers page requests from an in-process dataset.
#[derive(Debug, Clone)]
pub struct DatasetPageSource {
    api: EvolutionApi,
}

impl DatasetPageSource {
    #[must_use]
    pub fn new(api: EvolutionApi) -> Self {
        Self { api }
    }
}

impl PageSource for DatasetPageSource {
    fn fetch_page(
        &self,
        filter: &ChainFilter,
        page: u32,
    ) -> BoxFuture<'static, Result<Vec<Chain>, FetchError>> {
        future::ready(Ok(self.api.get_page(filter, i64::from(page)))).boxed()
    }
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    data: DatasetSummary,
}

/// Fetches pages from a running evolution service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    endpoint: String,
    summary_endpoint: String,
}

impl HttpPageSource {
    /// The feed enforces `config.timeout` per page; the transport limit sits above it so a
    /// stalled page is reported as [`FetchError::Timeout`].
    ///
    /// # Errors
    /// Returns [`FetchError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout.saturating_mul(2))
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/evolutions", config.base_url),
            summary_endpoint: format!("{}/v1/dataset", config.base_url),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Page size the service slices with. A feed must judge full pages by this value.
    ///
    /// # Errors
    /// Returns a [`FetchError`] when the summary cannot be fetched or decoded.
    pub async fn server_summary(&self) -> Result<DatasetSummary, FetchError> {
        let response = self
            .client
            .get(&self.summary_endpoint)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let envelope = response
            .json::<SummaryEnvelope>()
            .await
            .map_err(|err| FetchError::Payload(err.to_string()))?;
        Ok(envelope.data)
    }

    /// Shorthand for the page size reported by [`Self::server_summary`].
    ///
    /// # Errors
    /// See [`Self::server_summary`].
    pub async fn server_page_size(&self) -> Result<PageSize, FetchError> {
        Ok(self.server_summary().await?.page_size)
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(
        &self,
        filter: &ChainFilter,
        page: u32,
    ) -> BoxFuture<'static, Result<Vec<Chain>, FetchError>> {
        let request = self.client.get(&self.endpoint).query(&PageQuery::new(filter, page));
        async move {
            let response =
                request.send().await.map_err(|err| FetchError::Transport(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            response.json::<Vec<Chain>>().await.map_err(|err| FetchError::Payload(err.to_string()))
        }
        .boxed()
    }
}
