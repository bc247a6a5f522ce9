//! Tokio driver for [`FeedState`].
//!
//! Each fetch runs on its own task and reports back through a channel; the feed applies
//! completions one at a time, so state is only ever touched through `&mut self`. Methods that
//! issue fetches must be called from within a tokio runtime.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use evochain_core::{Chain, ChainFilter, PageSize};
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::sensor::ViewportSensor;
use crate::source::{FetchError, HttpPageSource, PageSource};
use crate::state::{Completion, FeedItem, FeedPhase, FeedState, FetchRequest};

type FetchOutcome = (FetchRequest, Result<Vec<Chain>, FetchError>);

pub struct Feed<S> {
    source: Arc<S>,
    state: FeedState,
    sensor: ViewportSensor,
    timeout: Duration,
    completions_tx: mpsc::UnboundedSender<FetchOutcome>,
    completions_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    in_flight: usize,
}

impl<S: PageSource> Feed<S> {
    #[must_use]
    pub fn new(source: S, page_size: PageSize, timeout: Duration) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source: Arc::new(source),
            state: FeedState::new(page_size),
            sensor: ViewportSensor::default(),
            timeout,
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    #[must_use]
    pub fn with_sensor(mut self, sensor: ViewportSensor) -> Self {
        self.sensor = sensor;
        self
    }

    #[must_use]
    pub fn state(&self) -> &FeedState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> FeedPhase {
        self.state.phase()
    }

    #[must_use]
    pub fn render(&self) -> Vec<FeedItem<'_>> {
        self.state.render()
    }

    /// Fetches spawned and not yet delivered, including ones for superseded filters.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Switch filters and start loading page 0 of the new one. In-flight fetches of the old
    /// filter keep running; their results are dropped on arrival.
    pub fn set_filter(&mut self, filter: ChainFilter) {
        if self.state.set_filter(filter) {
            tracing::debug!(filter = %self.state.filter(), "filter changed, cursor reset");
            self.request_pages();
        }
    }

    /// Issue fetches for missing or failed pages up to the cursor. Returns how many started.
    pub fn request_pages(&mut self) -> usize {
        let requests = self.state.request_pages();
        let issued = requests.len();
        for request in requests {
            self.spawn_fetch(request);
        }
        issued
    }

    /// Load-more trigger. Advances the cursor and fetches the new page when the cursor page is
    /// full; otherwise does nothing.
    pub fn on_viewport_reached(&mut self) -> bool {
        if !self.state.on_viewport_reached() {
            return false;
        }
        tracing::debug!(cursor = self.state.cursor(), "cursor advanced");
        self.request_pages();
        true
    }

    /// Feed a sentinel visibility sample through the viewport sensor.
    pub fn observe_viewport(&mut self, visible: bool) -> bool {
        self.sensor.set_enabled(self.state.sensor_enabled());
        self.sensor.observe(visible) && self.on_viewport_reached()
    }

    fn spawn_fetch(&mut self, request: FetchRequest) {
        let fetch = self.source.fetch_page(&request.key.filter, request.key.index);
        let completions_tx = self.completions_tx.clone();
        let timeout = self.timeout;
        self.in_flight += 1;
        tracing::debug!(
            filter = %request.key.filter,
            page = request.key.index,
            ticket = ?request.ticket,
            "page fetch issued"
        );

        tokio::spawn(async move {
            let guarded = AssertUnwindSafe(fetch).catch_unwind();
            let result = match tokio::time::timeout(timeout, guarded).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(FetchError::Task("page source panicked".to_string())),
                Err(_) => Err(FetchError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };
            // The receiver only goes away with the feed itself.
            let _ = completions_tx.send((request, result));
        });
    }

    /// Wait for the next fetch to finish and apply it. Returns `None` when nothing is in
    /// flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if self.in_flight == 0 {
            return None;
        }
        let (request, result) = self.completions_rx.recv().await?;
        self.in_flight -= 1;

        if let Err(err) = &result {
            tracing::warn!(
                filter = %request.key.filter,
                page = request.key.index,
                %err,
                "page fetch failed"
            );
        }
        let completion = self.state.complete(&request, result);
        if let Completion::Discarded(reason) = completion {
            tracing::debug!(
                filter = %request.key.filter,
                page = request.key.index,
                ?reason,
                "page result discarded"
            );
        }
        Some(completion)
    }

    /// Apply completions until no page of the active filter is pending.
    pub async fn settle(&mut self) {
        while self.state.pending_count() > 0 {
            if self.next_completion().await.is_none() {
                break;
            }
        }
    }

    /// Keep scrolling to the end until the feed stops advancing or `max_pages` pages are
    /// loaded. Failed pages are not retried here.
    pub async fn load_until_exhausted(&mut self, max_pages: u32) -> FeedPhase {
        if self.state.phase() == FeedPhase::Idle {
            self.request_pages();
        }
        loop {
            self.settle().await;
            if self.state.cursor().saturating_add(1) >= max_pages || !self.on_viewport_reached() {
                return self.state.phase();
            }
        }
    }
}

impl Feed<HttpPageSource> {
    /// Feed over a running service, judging full pages by the service's own page size rather
    /// than `config.page_size`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] when the client cannot be built or the service summary cannot
    /// be read.
    pub async fn connect(config: &ClientConfig) -> Result<Self, FetchError> {
        let source = HttpPageSource::new(config)?;
        let page_size = source.server_page_size().await?;
        if page_size != config.page_size {
            tracing::debug!(
                configured = %config.page_size,
                served = %page_size,
                "using the service page size"
            );
        }
        Ok(Self::new(source, page_size, config.timeout))
    }
}
