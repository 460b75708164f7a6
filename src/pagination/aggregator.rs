//! Aggregation of paged collections

use super::types::{NextPage, PagedRequest, PagedResponse, PaginationState};
use crate::error::{Error, Result};
use crate::http::Connection;
use crate::types::JsonValue;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Fetches every page of a collection through one connection
#[derive(Debug, Clone, Copy)]
pub struct PaginationAggregator<'a> {
    connection: &'a Connection,
}

impl<'a> PaginationAggregator<'a> {
    /// Create an aggregator over `connection`
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// Fetch the single page starting at `offset`
    pub async fn fetch_page(
        &self,
        request: &PagedRequest,
        offset: u64,
    ) -> Result<PagedResponse<JsonValue>> {
        let descriptor = request.page_descriptor(offset);
        let text = self.connection.get_string(&descriptor).await?;
        let body: JsonValue = serde_json::from_str(&text)
            .map_err(|e| Error::protocol(format!("Page at offset {offset} is not JSON: {e}")))?;
        parse_envelope(body)
    }

    /// Fetch every item of the collection, decoding each with `decode`
    ///
    /// Starts at the request's own offset and never mutates the request, so
    /// the same request can be fetched again. Any error discards the items
    /// fetched so far.
    pub async fn fetch_all<T, F>(&self, request: &PagedRequest, decode: F) -> Result<Vec<T>>
    where
        F: Fn(JsonValue) -> Result<T>,
    {
        let mut state = PaginationState::starting_at(request.offset);
        let mut items = Vec::new();

        loop {
            let page = self.fetch_page(request, state.offset).await?;
            let page_len = page.items.len();
            items.reserve(page_len);
            for item in page.items {
                items.push(decode(item)?);
            }

            if let NextPage::Done = state.advance(page.total_count, page_len)? {
                break;
            }
        }

        debug!(
            items = items.len(),
            pages = state.pages,
            "Fetched all pages"
        );
        Ok(items)
    }

    /// Fetch every item of the collection as `T`
    pub async fn fetch_all_as<T: DeserializeOwned>(&self, request: &PagedRequest) -> Result<Vec<T>> {
        self.fetch_all(request, |item| {
            serde_json::from_value(item)
                .map_err(|e| Error::protocol(format!("Failed to decode item: {e}")))
        })
        .await
    }
}

/// Split a page envelope into its total and raw items
pub fn parse_envelope(body: JsonValue) -> Result<PagedResponse<JsonValue>> {
    let JsonValue::Object(mut envelope) = body else {
        return Err(Error::protocol("Page is not a JSON object"));
    };

    let total_count = envelope
        .get("totalCount")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| Error::protocol("Page has no valid totalCount"))?;

    let items = match envelope.remove("items") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items,
        Some(_) => return Err(Error::protocol("Page items are not an array")),
    };

    Ok(PagedResponse { total_count, items })
}
