//! Incremental loading of evolution chain pages.
//!
//! [`FeedState`] is the pure paging state machine: it owns the active filter, the page cursor
//! and the per-page cache, and decides which pages to fetch. [`Feed`] drives it on a tokio
//! runtime against any [`PageSource`], applying completions as they arrive.

mod config;
mod feed;
mod sensor;
mod source;
mod state;

pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
pub use feed::Feed;
pub use sensor::{ViewportSensor, DEFAULT_ROOT_MARGIN_PX};
pub use source::{DatasetPageSource, FetchError, HttpPageSource, PageSource};
pub use state::{
    Completion, DiscardReason, FeedItem, FeedPhase, FeedState, FetchRequest, FetchTicket,
    PageEntry, PageKey,
};
