//! Versioned page iteration
//!
//! Listings of the volume-purchasing service are snapshots: every page carries
//! the `versionId` of the snapshot it was read from and, except for the last
//! one, the index of the next page. [`VersionedPager`] turns a page-fetching
//! function into a `Stream` of records and enforces both properties.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use fleetbridge_domain::{FleetError, Result, VersionedPage};
use futures::future::BoxFuture;
use futures::Stream;
use serde_json::Value;
use tracing::debug;

/// Page fetch in flight
pub type PageFuture<'a> = BoxFuture<'a, Result<VersionedPage<Value>>>;

/// Stream of records read page by page from one listing snapshot.
///
/// The fetcher receives `None` for the first page and the previous page's
/// `nextPageIndex` afterwards. The stream ends after the first error.
pub struct VersionedPager<'a, F>
where
    F: FnMut(Option<u64>) -> PageFuture<'a>,
{
    fetcher: F,
    current_fetch: Option<PageFuture<'a>>,
    buffer: VecDeque<Value>,
    version_id: Option<String>,
    pages_fetched: u64,
    next_page_index: Option<u64>,
    done: bool,
}

impl<'a, F> VersionedPager<'a, F>
where
    F: FnMut(Option<u64>) -> PageFuture<'a>,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            current_fetch: None,
            buffer: VecDeque::new(),
            version_id: None,
            pages_fetched: 0,
            next_page_index: None,
            done: false,
        }
    }

    /// Check a freshly fetched page against the snapshot and the page count,
    /// then queue its records.
    fn accept(&mut self, page: VersionedPage<Value>) -> Result<()> {
        let version_id = self.version_id.get_or_insert_with(|| page.version_id.clone());
        if *version_id != page.version_id {
            return Err(FleetError::Consistency(format!(
                "fetched data updated: version {} then {}",
                version_id, page.version_id
            )));
        }

        self.pages_fetched += 1;
        match page.next_page_index {
            Some(index) if index != self.pages_fetched => {
                return Err(FleetError::Validation(format!(
                    "unexpected nextPageIndex {} after {} page(s)",
                    index, self.pages_fetched
                )));
            }
            Some(index) => self.next_page_index = Some(index),
            None => self.done = true,
        }

        debug!(
            page = self.pages_fetched,
            items = page.items.len(),
            last = self.done,
            "received listing page"
        );
        self.buffer.extend(page.items);
        Ok(())
    }
}

impl<'a, F> Stream for VersionedPager<'a, F>
where
    F: FnMut(Option<u64>) -> PageFuture<'a> + Unpin,
{
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch = None;
                        if let Err(e) = this.accept(page) {
                            this.done = true;
                            this.buffer.clear();
                            return Poll::Ready(Some(Err(e)));
                        }
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch = None;
                        this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let fut = (this.fetcher)(this.next_page_index);
            this.current_fetch = Some(fut);
        }
    }
}
