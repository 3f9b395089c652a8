//! Pagination types shared by every listing

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: i64,
    pub per_page: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 5,
        }
    }
}

impl ListParams {
    /// Clamp into a usable range: page >= 1, 1 <= per_page <= 100
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for `LIMIT ? OFFSET ?`. Saturates for absurd page numbers,
    /// which then simply select nothing.
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> i64 {
        if self.per_page <= 0 || self.total <= 0 {
            return 0;
        }
        (self.total + self.per_page - 1) / self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next_num(&self) -> Option<i64> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn prev_num(&self) -> Option<i64> {
        self.has_prev().then_some(self.page - 1)
    }

    /// Page links for a pager widget. `None` marks a gap.
    ///
    /// Shows the first two and last two pages and a window from two pages
    /// before the current one to four after it.
    pub fn iter_pages(&self) -> Vec<Option<i64>> {
        const LEFT_EDGE: i64 = 2;
        const LEFT_CURRENT: i64 = 2;
        const RIGHT_CURRENT: i64 = 5;
        const RIGHT_EDGE: i64 = 2;

        let pages = self.total_pages();
        let mut out = Vec::new();
        let mut last = 0;
        for num in 1..=pages {
            let visible = num <= LEFT_EDGE
                || (num > self.page.saturating_sub(LEFT_CURRENT + 1)
                    && num < self.page.saturating_add(RIGHT_CURRENT))
                || num > pages - RIGHT_EDGE;
            if visible {
                if last + 1 != num {
                    out.push(None);
                }
                out.push(Some(num));
                last = num;
            }
        }
        out
    }

    /// Map the items, keeping the page bookkeeping
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}
