//! Offset pagination for list queries.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationErrors;

pub const DEFAULT_PAGE_NUMBER: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A page request with an optional name filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_number: u32,
    pub page_size: u32,
    pub name: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_number: DEFAULT_PAGE_NUMBER,
            page_size: DEFAULT_PAGE_SIZE,
            name: None,
        }
    }
}

impl PageRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.page_number < 1 {
            errors.add("pageNumber", "The field pageNumber must be at least 1.");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            errors.add(
                "pageSize",
                format!("The field pageSize must be between 1 and {MAX_PAGE_SIZE}."),
            );
        }
        errors.into_result()
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// The name filter, ignoring blank values.
    pub fn name_filter(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Number of pages needed to show `total` rows, `page_size` at a time.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size))
}

/// One page of results plus the page count of the whole (filtered) set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total_pages: u64,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total_pages: self.total_pages,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}
