//! Offset pagination shared by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A validated page request (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> DomainResult<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);

        let mut errors = Vec::new();
        if page == 0 {
            errors.push("page must be at least 1".to_string());
        }
        if limit == 0 || limit > Self::MAX_LIMIT {
            errors.push(format!("limit must be between 1 and {}", Self::MAX_LIMIT));
        }
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

/// Slice an already filtered and sorted result set.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total_results = items.len() as u64;
    let total_pages = total_results.div_ceil(u64::from(request.limit)) as u32;
    let results = items
        .into_iter()
        .skip(request.offset())
        .take(request.limit as usize)
        .collect();

    Page {
        results,
        page: request.page,
        limit: request.limit,
        total_pages,
        total_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_returns_requested_window_and_totals() {
        let items: Vec<u32> = (1..=25).collect();
        let page = paginate(items, PageRequest::new(Some(3), Some(10)).unwrap());
        assert_eq!(page.results, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_results, 25);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = paginate(vec![1, 2, 3], PageRequest::new(Some(5), Some(2)).unwrap());
        assert!(page.results.is_empty());
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn invalid_page_and_limit_report_both_messages() {
        let err = PageRequest::new(Some(0), Some(500)).unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation(
                "page must be at least 1, limit must be between 1 and 100".to_string()
            )
        );
    }
}
