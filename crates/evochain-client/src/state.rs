//! Paging state machine.
//!
//! Per filter the feed moves `Idle -> Loading -> Ready -> Loading -> ... -> Exhausted`.
//! Changing the filter drops every entry of the previous filter and starts again at page 0.

use std::collections::HashMap;

use evochain_core::{Chain, ChainFilter, PageSize};
use serde::Serialize;

use crate::source::FetchError;

/// Identity of one issued fetch. Only the most recent ticket of a page may fill it.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PageKey {
    pub filter: ChainFilter,
    pub index: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub key: PageKey,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PageEntry {
    Pending(FetchTicket),
    Loaded(Vec<Chain>),
    Errored(FetchError),
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    /// The cursor page has not been requested yet.
    Idle,
    Loading,
    /// The cursor page is full; another page may exist.
    Ready,
    /// The cursor page is short. Nothing more loads until the filter changes.
    Exhausted,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    SupersededFilter,
    UnknownTicket,
    AlreadyLoaded,
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Completion {
    Applied,
    Discarded(DiscardReason),
}

/// One row of the rendered feed, in page order.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedItem<'a> {
    Chain { page: u32, key: String, chain: &'a Chain },
    Loading { page: u32 },
    Failed { page: u32, error: &'a FetchError },
}

#[derive(Debug, Clone)]
pub struct FeedState {
    page_size: PageSize,
    filter: ChainFilter,
    cursor: u32,
    pages: HashMap<PageKey, PageEntry>,
    next_ticket: u64,
}

impl FeedState {
    #[must_use]
    pub fn new(page_size: PageSize) -> Self {
        Self::with_filter(page_size, ChainFilter::any())
    }

    #[must_use]
    pub fn with_filter(page_size: PageSize, filter: ChainFilter) -> Self {
        Self { page_size, filter, cursor: 0, pages: HashMap::new(), next_ticket: 0 }
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn filter(&self) -> &ChainFilter {
        &self.filter
    }

    #[must_use]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    fn key(&self, index: u32) -> PageKey {
        PageKey { filter: self.filter.clone(), index }
    }

    #[must_use]
    pub fn page(&self, index: u32) -> Option<&PageEntry> {
        self.pages.get(&self.key(index))
    }

    /// Switch to `filter`. Returns `false` when it equals the active filter, in which case
    /// nothing changes.
    pub fn set_filter(&mut self, filter: ChainFilter) -> bool {
        if filter == self.filter {
            return false;
        }
        self.filter = filter;
        self.cursor = 0;
        self.pages.clear();
        true
    }

    /// Issue fetches for every page `0..=cursor` that is neither loaded nor in flight.
    /// Errored pages are re-issued under a new ticket.
    pub fn request_pages(&mut self) -> Vec<FetchRequest> {
        let mut requests = Vec::new();
        for index in 0..=self.cursor {
            let key = self.key(index);
            if matches!(self.pages.get(&key), Some(PageEntry::Pending(_) | PageEntry::Loaded(_))) {
                continue;
            }
            let ticket = FetchTicket(self.next_ticket);
            self.next_ticket += 1;
            self.pages.insert(key.clone(), PageEntry::Pending(ticket));
            requests.push(FetchRequest { ticket, key });
        }
        requests
    }

    /// Apply the result of `request`. Results for other filters, for tickets that were
    /// replaced, and for pages that already hold data are dropped.
    pub fn complete(
        &mut self,
        request: &FetchRequest,
        result: Result<Vec<Chain>, FetchError>,
    ) -> Completion {
        if request.key.filter != self.filter {
            return Completion::Discarded(DiscardReason::SupersededFilter);
        }
        match self.pages.get_mut(&request.key) {
            Some(entry) if *entry == PageEntry::Pending(request.ticket) => {
                *entry = match result {
                    Ok(chains) => PageEntry::Loaded(chains),
                    Err(err) => PageEntry::Errored(err),
                };
                Completion::Applied
            }
            Some(PageEntry::Loaded(_)) => Completion::Discarded(DiscardReason::AlreadyLoaded),
            _ => Completion::Discarded(DiscardReason::UnknownTicket),
        }
    }

    /// Advance the cursor when the cursor page is loaded and full. Returns whether it moved.
    pub fn on_viewport_reached(&mut self) -> bool {
        if self.phase() != FeedPhase::Ready {
            return false;
        }
        self.cursor += 1;
        true
    }

    #[must_use]
    pub fn phase(&self) -> FeedPhase {
        match self.page(self.cursor) {
            None => FeedPhase::Idle,
            Some(PageEntry::Pending(_)) => FeedPhase::Loading,
            Some(PageEntry::Loaded(chains)) if self.page_size.is_full(chains.len()) => {
                FeedPhase::Ready
            }
            Some(PageEntry::Loaded(_)) => FeedPhase::Exhausted,
            Some(PageEntry::Errored(_)) => FeedPhase::Failed,
        }
    }

    /// The viewport sensor stays off while the cursor page is loading.
    #[must_use]
    pub fn sensor_enabled(&self) -> bool {
        self.phase() != FeedPhase::Loading
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pages.values().filter(|entry| matches!(entry, PageEntry::Pending(_))).count()
    }

    pub fn loaded_chains(&self) -> impl Iterator<Item = &Chain> + '_ {
        (0..=self.cursor).filter_map(|index| match self.page(index) {
            Some(PageEntry::Loaded(chains)) => Some(chains.iter()),
            _ => None,
        })
        .flatten()
    }

    #[must_use]
    pub fn render(&self) -> Vec<FeedItem<'_>> {
        let mut items = Vec::new();
        for page in 0..=self.cursor {
            match self.page(page) {
                Some(PageEntry::Loaded(chains)) => {
                    items.extend(chains.iter().map(|chain| FeedItem::Chain {
                        page,
                        key: chain.render_key(),
                        chain,
                    }));
                }
                Some(PageEntry::Errored(error)) => items.push(FeedItem::Failed { page, error }),
                Some(PageEntry::Pending(_)) | None => items.push(FeedItem::Loading { page }),
            }
        }
        items
    }
}
