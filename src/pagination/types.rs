//! Pagination types
//!
//! The backend pages collections with `offset`/`limit` query parameters and
//! answers with a `{"totalCount": n, "items": [...]}` envelope.

use crate::error::{Error, Result};
use crate::http::RequestDescriptor;
use serde::{Deserialize, Serialize};

/// Page size used when none is given
pub const DEFAULT_LIMIT: u64 = 100;

/// A collection request to be fetched page by page
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRequest {
    /// Request for the collection, without paging parameters
    pub request: RequestDescriptor,
    /// Offset of the first page
    pub offset: u64,
    /// Items requested per page
    pub limit: u64,
    /// Optional search expression sent as `q`
    pub q: Option<String>,
}

impl PagedRequest {
    /// Page through `request` from the start
    pub fn new(request: RequestDescriptor) -> Self {
        Self {
            request,
            offset: 0,
            limit: DEFAULT_LIMIT,
            q: None,
        }
    }

    /// Start at a different offset
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Use a different page size
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Filter with a search expression
    #[must_use]
    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Request for the page starting at `offset`
    pub fn page_descriptor(&self, offset: u64) -> RequestDescriptor {
        let mut descriptor = self
            .request
            .clone()
            .query("offset", offset.to_string())
            .query("limit", self.limit.to_string());
        if let Some(q) = self.q.as_deref().filter(|q| !q.trim().is_empty()) {
            descriptor = descriptor.query("q", q);
        }
        descriptor
    }
}

/// One page of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    /// Size of the whole collection as reported by the server
    pub total_count: u64,
    /// Items of this page, in server order
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Result of one pagination step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// Fetch the page starting at `offset`
    Continue {
        /// Offset of the next page
        offset: u64,
    },
    /// Everything has been fetched
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Progress through a collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Offset of the page being fetched
    pub offset: u64,
    /// Items received so far
    pub fetched: u64,
    /// Pages received so far
    pub pages: u32,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create state starting at `offset`
    pub fn starting_at(offset: u64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Record a page of `page_len` items out of `total` and move on
    pub fn advance(&mut self, total: u64, page_len: usize) -> Result<NextPage> {
        let next = next_page(self, total, page_len)?;
        self.fetched += page_len as u64;
        self.pages += 1;
        match next {
            NextPage::Continue { offset } => self.offset = offset,
            NextPage::Done => self.done = true,
        }
        Ok(next)
    }
}

/// Decide the next step after a page of `page_len` items out of `total`
///
/// The offset advances by the number of items actually returned, not by the
/// page size. An empty page while items are still missing is a protocol
/// error, since continuing would never terminate.
pub fn next_page(state: &PaginationState, total: u64, page_len: usize) -> Result<NextPage> {
    let page_len = page_len as u64;
    let accumulated = state.fetched + page_len;
    if accumulated >= total {
        return Ok(NextPage::Done);
    }
    if page_len == 0 {
        return Err(Error::protocol(format!(
            "Server returned an empty page at offset {} with {} of {} items fetched",
            state.offset, state.fetched, total
        )));
    }
    Ok(NextPage::Continue {
        offset: state.offset + page_len,
    })
}
