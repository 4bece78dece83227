//! Incremental materialization of a filtered subset.
//!
//! Pages accumulate: page `n` exposes the first `(n + 1) * page_size` rows.
//! Loading more grows the prefix until the subset is exhausted. A filter
//! change resets to the first page.

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// The materialized prefix for `page_index`.
pub fn materialize<T>(subset: &[T], page_size: usize, page_index: usize) -> &[T] {
    let end = page_index
        .saturating_add(1)
        .saturating_mul(page_size)
        .min(subset.len());
    &subset[..end]
}

/// Pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materializer {
    page_size: usize,
    page_index: usize,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Materializer {
    /// A page size of zero is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page_index: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current page (0-indexed).
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Back to the first page.
    pub fn reset(&mut self) {
        self.page_index = 0;
    }

    /// Total number of pages for `total_rows` rows (at least one).
    pub fn total_pages(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.page_size).max(1)
    }

    /// Whether rows beyond the current prefix remain.
    pub fn has_more(&self, total_rows: usize) -> bool {
        self.page_index + 1 < self.total_pages(total_rows)
    }

    /// Advance one page if rows remain. Returns whether it advanced.
    pub fn load_more(&mut self, total_rows: usize) -> bool {
        if self.has_more(total_rows) {
            self.page_index += 1;
            true
        } else {
            false
        }
    }

    /// Everything loaded so far.
    pub fn visible<'a, T>(&self, subset: &'a [T]) -> &'a [T] {
        materialize(subset, self.page_size, self.page_index)
    }

    /// Only the rows of the current page.
    pub fn page<'a, T>(&self, subset: &'a [T]) -> &'a [T] {
        let start = (self.page_index * self.page_size).min(subset.len());
        &self.visible(subset)[start..]
    }
}
