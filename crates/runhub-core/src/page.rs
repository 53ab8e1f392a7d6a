//! Pagination types for listing operations.

use serde::{Deserialize, Serialize};

/// Ordering applied when listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    /// Order in which records were first stored.
    #[default]
    Insertion,
    /// Newest first by creation timestamp.
    CreatedAtDesc,
}

/// Offset/limit page request. `page` is zero-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    #[serde(default)]
    pub sort: Sort,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            sort: Sort::Insertion,
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Index of the first element of the page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus the total element count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// An empty page for the given request.
    pub fn empty(request: PageRequest) -> Self {
        Self {
            content: Vec::new(),
            page: request.page,
            size: request.size,
            total: 0,
        }
    }

    /// Number of pages needed to hold `total` elements.
    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.total.div_ceil(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Transform the page content, keeping the paging fields.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}
