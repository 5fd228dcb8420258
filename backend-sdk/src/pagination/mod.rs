//! Pagination planning and continuation state
//!
//! `Paginator::plan` turns a page-number or offset request into a
//! `{limit, offset}` pair; `Paginator::interpret` turns the items a backend
//! returned into a `PageResult`. Without an authoritative total, `has_more`
//! is the full-page heuristic: an exact multiple of the page size reports one
//! extra, empty page. An empty page always ends paging.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Page size used when the request does not name one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Cap applied when a backend does not declare its own
pub const DEFAULT_MAX_PAGE_SIZE: i64 = 100;

/// Where a page starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePosition {
    /// 1-indexed page number
    Number(i64),
    /// Zero-based item offset
    Offset(i64),
}

impl Default for PagePosition {
    fn default() -> Self {
        PagePosition::Number(1)
    }
}

/// A caller's pagination request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: Option<i64>,
    #[serde(default)]
    pub position: PagePosition,
}

impl PageRequest {
    /// First page with the default size
    pub fn first() -> Self {
        Self::default()
    }

    pub fn page(page_size: Option<i64>, page_number: i64) -> Self {
        Self {
            page_size,
            position: PagePosition::Number(page_number),
        }
    }

    pub fn offset(page_size: Option<i64>, offset: i64) -> Self {
        Self {
            page_size,
            position: PagePosition::Offset(offset),
        }
    }
}

/// Backend pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePlan {
    pub limit: i64,
    pub offset: i64,
}

impl PagePlan {
    /// 1-indexed page number for page-number backends
    ///
    /// Fails when the offset does not sit on a page boundary, since such
    /// backends cannot start mid-page.
    pub fn page_number(&self) -> Result<i64> {
        if self.limit <= 0 || self.offset % self.limit != 0 {
            return Err(ServiceError::validation(format!(
                "Offset {} is not a multiple of page size {}",
                self.offset, self.limit
            )));
        }
        Ok(self.offset / self.limit + 1)
    }
}

/// One page of results plus continuation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_offset: Option<i64>,
    pub next_page: Option<i64>,
    /// Authoritative total, when the backend reports one
    pub total: Option<u64>,
}

impl<T> PageResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_offset: self.next_offset,
            next_page: self.next_page,
            total: self.total,
        }
    }
}

/// Plans and interprets pages for one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    default_page_size: i64,
    max_page_size: i64,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl Paginator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paginator for a backend declaring its own page-size cap
    pub fn with_max_page_size(max_page_size: i64) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            default_page_size: DEFAULT_PAGE_SIZE.min(max_page_size),
            max_page_size,
        }
    }

    pub fn max_page_size(&self) -> i64 {
        self.max_page_size
    }

    /// Convert a request into `{limit, offset}`
    ///
    /// Zero or negative sizes and page numbers, and negative offsets, are
    /// rejected. Sizes above the cap are clamped.
    pub fn plan(&self, request: &PageRequest) -> Result<PagePlan> {
        let page_size = match request.page_size {
            None => self.default_page_size,
            Some(size) if size <= 0 => {
                return Err(ServiceError::validation(format!(
                    "page_size must be a positive integer, got {}",
                    size
                )))
            }
            Some(size) => size.min(self.max_page_size),
        };

        let offset = match request.position {
            PagePosition::Number(number) if number <= 0 => {
                return Err(ServiceError::validation(format!(
                    "page_number must be a positive integer, got {}",
                    number
                )))
            }
            PagePosition::Number(number) => (number - 1)
                .checked_mul(page_size)
                .ok_or_else(|| ServiceError::validation(format!("page_number {} is out of range", number)))?,
            PagePosition::Offset(offset) if offset < 0 => {
                return Err(ServiceError::validation(format!(
                    "offset must not be negative, got {}",
                    offset
                )))
            }
            PagePosition::Offset(offset) => offset,
        };

        let plan = PagePlan {
            limit: page_size,
            offset,
        };
        log::debug!("Planned page {:?} for request {:?}", plan, request);
        Ok(plan)
    }

    /// Build continuation state from the items a backend returned
    pub fn interpret<T>(&self, mut items: Vec<T>, plan: &PagePlan, total: Option<u64>) -> PageResult<T> {
        items.truncate(plan.limit.max(0) as usize);
        let returned = items.len() as i64;

        // An empty page never continues, even when the total says otherwise
        let has_more = returned > 0
            && match total {
                Some(total) => ((plan.offset + returned) as u64) < total,
                None => returned == plan.limit,
            };

        let (next_offset, next_page) = if has_more {
            let next = plan.offset + returned;
            let next_page = if plan.limit > 0 && plan.offset % plan.limit == 0 && returned == plan.limit {
                Some(plan.offset / plan.limit + 2)
            } else {
                None
            };
            (Some(next), next_page)
        } else {
            (None, None)
        };

        PageResult {
            items,
            has_more,
            next_offset,
            next_page,
            total,
        }
    }
}
