//! Cursor-driven page walk for a single provider.
//!
//! Pages are fetched strictly one after another since each request needs the
//! cursor of the page before it. The walk ends on the first of:
//!
//! - a page without a cursor ([`Termination::NoCursor`]),
//! - an absent page ([`Termination::EmptyPage`]),
//! - a cursor already seen in this walk ([`Termination::StalledCursor`]),
//! - `max_pages` pages fetched ([`Termination::PageLimit`]),
//! - cancellation ([`Termination::Cancelled`], unless partial results are discarded),
//! - a transport or authentication error, which is returned as-is.

use crate::api::{Cursor, Normalizer, Proxy};
use crate::error::{IngestError, Result};
use crate::models::ReleaseInfo;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Page bound used when a provider does not configure its own.
pub const DEFAULT_MAX_PAGES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    NoCursor,
    EmptyPage,
    StalledCursor,
    PageLimit,
    Cancelled,
}

/// What to do with accumulated records when the walk is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    #[default]
    KeepPartial,
    Discard,
}

#[derive(Debug)]
pub struct WalkOutcome {
    /// Records in fetch order; see [`crate::assemble`] for the final ordering.
    pub records: Vec<ReleaseInfo>,
    pub pages: usize,
    pub dropped: usize,
    pub termination: Termination,
}

pub struct PageWalker<'a> {
    proxy: &'a dyn Proxy,
    normalizer: &'a dyn Normalizer,
    max_pages: usize,
    cancel: CancellationToken,
    on_cancel: CancelPolicy,
}

impl<'a> PageWalker<'a> {
    pub fn new(proxy: &'a dyn Proxy, normalizer: &'a dyn Normalizer) -> Self {
        Self {
            proxy,
            normalizer,
            max_pages: DEFAULT_MAX_PAGES,
            cancel: CancellationToken::new(),
            on_cancel: CancelPolicy::default(),
        }
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_cancel(mut self, policy: CancelPolicy) -> Self {
        self.on_cancel = policy;
        self
    }

    pub async fn walk(self) -> Result<WalkOutcome> {
        let name = self.proxy.name();
        let mut records = Vec::new();
        let mut pages = 0usize;
        let mut dropped = 0usize;
        let mut cursor: Option<Cursor> = None;
        let mut seen: HashSet<Cursor> = HashSet::new();

        let termination = loop {
            if pages >= self.max_pages {
                warn!(provider = name, pages, "page limit reached; stopping pagination");
                break Termination::PageLimit;
            }
            if self.cancel.is_cancelled() {
                break Termination::Cancelled;
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                page = self.proxy.fetch_page(cursor.as_ref()) => Some(page),
            };
            let Some(page) = fetched else {
                break Termination::Cancelled;
            };
            let Some(page) = page? else {
                debug!(provider = name, pages, "absent page; stopping pagination");
                break Termination::EmptyPage;
            };

            pages += 1;
            let normalized = self.normalizer.normalize(Some(&page));
            debug!(
                provider = name,
                page = pages,
                records = normalized.records.len(),
                dropped = normalized.dropped,
                "page normalized"
            );
            records.extend(normalized.records);
            dropped += normalized.dropped;

            match normalized.next {
                None => break Termination::NoCursor,
                Some(next) if !seen.insert(next.clone()) => {
                    warn!(
                        provider = name,
                        cursor = %next,
                        "provider repeated a cursor; stopping pagination"
                    );
                    break Termination::StalledCursor;
                }
                Some(next) => cursor = Some(next),
            }
        };

        if dropped > 0 {
            warn!(provider = name, dropped, "skipped malformed entries");
        }
        if termination == Termination::Cancelled && self.on_cancel == CancelPolicy::Discard {
            return Err(IngestError::Cancelled {
                provider: name.to_string(),
                pages,
            });
        }

        Ok(WalkOutcome {
            records,
            pages,
            dropped,
            termination,
        })
    }
}
