//! Pagination and result types for paged selects.
//!
//! [`PaginationParams`] translate into the `skip`/`limit` window of a select, and a [`Page`]
//! carries one window of results along with the total count of matching documents.

use serde::{Deserialize, Serialize};

use crate::options::{SelectOptions, Sort};

/// A single page of paginated results.
///
/// # Example
///
/// ```ignore
/// use shelf_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Transforms the items of the page, keeping the navigation metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Parameters for paginating through large result sets.
///
/// Pages are 1-indexed (page 1 is the first page). A page number of zero is treated as the
/// first page.
///
/// # Example
///
/// ```ignore
/// use shelf_core::page::PaginationParams;
///
/// let params = PaginationParams::new(2, 50);
/// assert_eq!(params.offset(), 50);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Number of items to skip to reach this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }

    /// The select window for this page.
    pub fn to_select_options(&self, order: Option<Sort>) -> SelectOptions {
        SelectOptions {
            order,
            limit: Some(self.per_page),
            skip: Some(self.offset()),
        }
    }

    /// Wraps one window of items into a [`Page`], given the total number of matches.
    pub fn page_of<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let page = self.page.max(1);
        let end = (self.offset() + items.len()) as u64;

        Page::builder(items)
            .with_count(count)
            .with_next_page(if end < count { Some(page + 1) } else { None })
            .with_previous_page(if page > 1 { Some(page - 1) } else { None })
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_window() {
        let params = PaginationParams::new(3, 20);

        assert_eq!(params.offset(), 40);
        assert_eq!(params.to_select_options(None), SelectOptions {
            order: None,
            limit: Some(20),
            skip: Some(40),
        });
        assert_eq!(PaginationParams::new(0, 20).offset(), 0);
    }

    #[test]
    fn navigation_metadata() {
        let page = PaginationParams::new(2, 10).page_of((11..=20).collect::<Vec<_>>(), 25);

        assert_eq!(page.count, 25);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));

        let last = PaginationParams::new(3, 10).page_of(vec![21, 22, 23, 24, 25], 25);
        assert_eq!(last.next_page, None);
        assert_eq!(last.map(|n| n * 2).items, vec![42, 44, 46, 48, 50]);
    }
}
