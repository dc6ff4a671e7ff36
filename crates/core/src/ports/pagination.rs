//! Pagination types for index scans.
//!
//! Relay-style cursor pagination: the cursor of an entity scan is the entity
//! key, the cursor of an audit scan is the record id.

/// Default page size when neither `first` nor `last` is given.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Opaque cursor for pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub value: String,
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    /// Number of items to fetch (forward pagination).
    pub first: Option<u32>,
    /// Cursor to start after (forward pagination).
    pub after: Option<Cursor>,
    /// Number of items to fetch (backward pagination).
    pub last: Option<u32>,
    /// Cursor to end before (backward pagination).
    pub before: Option<Cursor>,
}

impl Pagination {
    /// Forward page of `n` items.
    pub fn first(n: u32) -> Self {
        Self {
            first: Some(n),
            ..Default::default()
        }
    }

    /// Forward page of `n` items after `cursor`.
    pub fn after(n: u32, cursor: &str) -> Self {
        Self {
            first: Some(n),
            after: Some(Cursor {
                value: cursor.to_string(),
            }),
            ..Default::default()
        }
    }

    /// Effective page size, clamped to [`MAX_PAGE_SIZE`].
    pub fn limit(&self) -> u32 {
        self.first
            .or(self.last)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }
}

/// Paginated result set with edges and page info.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    /// Total count of items (optional, expensive to compute).
    pub total_count: Option<i64>,
}

impl<T> Connection<T> {
    /// Iterate over the nodes of this page.
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

/// A single item in a paginated result.
#[derive(Debug, Clone)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: Cursor,
}

/// Information about the current page in a paginated result.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
}

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}
