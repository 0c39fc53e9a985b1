//! Page/offset derivation for paginated lists.
//!
//! [`PaginationController`] keeps `(current_page, page_size, total_items)` and
//! derives everything else. Out-of-range input is clamped, never rejected:
//! list views routinely ask for a page that no longer exists while data
//! reloads.
//!
//! An empty list has zero pages, and page 1 is still the current page.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Initial state for a [`PaginationController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_initial_page")]
    pub initial_page: usize,

    #[serde(default = "default_page_size")]
    pub initial_page_size: usize,

    #[serde(default)]
    pub total_items: usize,
}

fn default_initial_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            initial_page: default_initial_page(),
            initial_page_size: default_page_size(),
            total_items: 0,
        }
    }
}

impl PaginationConfig {
    pub fn with_total_items(mut self, total_items: usize) -> Self {
        self.total_items = total_items;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.initial_page_size = page_size;
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.initial_page = page;
        self
    }
}

/// Snapshot of every derived value, for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    pub current_page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub start_index: usize,
    /// `None` when the list is empty.
    pub end_index: Option<usize>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

/// Pagination state for one list.
///
/// # Example
///
/// ```rust
/// use civic_link::{PaginationConfig, PaginationController};
///
/// let mut pages = PaginationController::new(
///     PaginationConfig::default().with_page_size(10).with_total_items(95),
/// );
/// assert_eq!(pages.total_pages(), 10);
///
/// pages.go_to_page(42);
/// assert_eq!(pages.current_page(), 10);
/// assert_eq!(pages.query_range(), Some(90..=94));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationController {
    current_page: usize,
    page_size: usize,
    total_items: usize,
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(PaginationConfig::default())
    }
}

impl PaginationController {
    pub fn new(config: PaginationConfig) -> Self {
        let mut controller = Self {
            current_page: 1,
            page_size: config.initial_page_size.max(1),
            total_items: config.total_items,
        };
        controller.go_to_page(config.initial_page);
        controller
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }

    fn last_page(&self) -> usize {
        self.total_pages().max(1)
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }

    /// Zero-based offset of the first item on the current page.
    pub fn start_index(&self) -> usize {
        (self.current_page - 1) * self.page_size
    }

    /// Zero-based offset of the last item on the current page.
    pub fn end_index(&self) -> Option<usize> {
        let last_item = self.total_items.checked_sub(1)?;
        Some(
            self.start_index()
                .saturating_add(self.page_size - 1)
                .min(last_item),
        )
    }

    pub fn is_first_page(&self) -> bool {
        self.current_page == 1
    }

    pub fn is_last_page(&self) -> bool {
        self.current_page >= self.total_pages()
    }

    /// Jump to `page`, clamped into `1..=max(1, total_pages)`.
    pub fn go_to_page(&mut self, page: usize) {
        self.current_page = page.clamp(1, self.last_page());
    }

    pub fn go_to_next_page(&mut self) {
        if self.has_next_page() {
            self.current_page += 1;
        }
    }

    pub fn go_to_previous_page(&mut self) {
        if self.has_previous_page() {
            self.current_page -= 1;
        }
    }

    /// Change the page size (at least 1), keeping the current page in range.
    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.go_to_page(self.current_page);
    }

    /// Change the item count, keeping the current page in range.
    pub fn set_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
        self.go_to_page(self.current_page);
    }

    pub fn state(&self) -> PaginationState {
        PaginationState {
            current_page: self.current_page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages(),
            start_index: self.start_index(),
            end_index: self.end_index(),
            has_next_page: self.has_next_page(),
            has_previous_page: self.has_previous_page(),
            is_first_page: self.is_first_page(),
            is_last_page: self.is_last_page(),
        }
    }

    /// Inclusive offset range for a remote range query, `None` for an empty list.
    pub fn query_range(&self) -> Option<RangeInclusive<usize>> {
        self.end_index().map(|end| self.start_index()..=end)
    }

    /// The current page's items out of a fully loaded list.
    pub fn page_slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.start_index().min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }

    /// Up to `max_visible` consecutive page numbers around the current page,
    /// for numbered page links.
    pub fn page_window(&self, max_visible: usize) -> Vec<usize> {
        let last = self.last_page();
        let visible = max_visible.min(last);
        if visible == 0 {
            return Vec::new();
        }
        let first = self
            .current_page
            .saturating_sub(visible / 2)
            .clamp(1, last - visible + 1);
        (first..first + visible).collect()
    }
}
