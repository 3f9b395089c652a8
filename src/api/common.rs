//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use serde::{Deserialize, Serialize};

use crate::api::middleware::ApiError;
use crate::models::{ListParams, PagedResult};

// ============================================================================
// Pagination Query Types
// ============================================================================

/// `?page=` and `?query=` of the post listings.
///
/// A missing or non-numeric page means page 1.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        parse_page(self.page.as_deref())
    }

    /// Listing parameters; pages below 1 do not exist
    pub fn list_params(&self, per_page: i64) -> Result<ListParams, ApiError> {
        page_params(self.page(), per_page)
    }
}

/// Page number from a raw `?page=` value, 1 when missing or not a number
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(1)
}

/// Listing parameters for a requested page; 404 below page 1
pub fn page_params(page: i64, per_page: i64) -> Result<ListParams, ApiError> {
    if page < 1 {
        return Err(ApiError::not_found(format!("Page {} not found", page)));
    }
    Ok(ListParams::new(page, per_page))
}

// ============================================================================
// Response Types
// ============================================================================

/// Outcome message, with the location a browser client should go next
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            next: None,
        }
    }

    pub fn with_next(message: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            next: Some(next.into()),
        }
    }
}

/// One page of a listing plus the pager navigation
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_num: Option<i64>,
    pub next_num: Option<i64>,
    /// Page links; `null` marks a gap
    pub pages: Vec<Option<i64>>,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        Self {
            total_pages: result.total_pages(),
            has_prev: result.has_prev(),
            has_next: result.has_next(),
            prev_num: result.prev_num(),
            next_num: result.next_num(),
            pages: result.iter_pages(),
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
        }
    }
}
