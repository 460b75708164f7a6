//! Pagination module
//!
//! Turns an offset/limit paged collection into one complete, ordered result
//! set.
//!
//! # Overview
//!
//! [`PaginationAggregator::fetch_all`] fetches the first page, then keeps
//! advancing the offset by the number of items each page returned until the
//! server-reported total is reached. [`next_page`] is the pure step function
//! behind it.

mod aggregator;
mod types;

pub use aggregator::{parse_envelope, PaginationAggregator};
pub use types::{next_page, NextPage, PagedRequest, PagedResponse, PaginationState, DEFAULT_LIMIT};
