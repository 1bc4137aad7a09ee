use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AppError, AppResult, ErrorCode};

/// Hard ceiling applied to every list query regardless of what the caller asks for.
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PageParams {
    #[validate(range(min = 0))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

/// Resolved limit/offset pair, already capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl PageParams {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit: Some(limit), offset: Some(offset) }
    }

    /// Applies the per-query default and the global cap. Negative values are rejected.
    pub fn resolve(&self, default_limit: i64) -> AppResult<Page> {
        self.validate().map_err(|e| {
            AppError::with_details(
                ErrorCode::InvalidPagination,
                "limit and offset must be non-negative",
                serde_json::json!({ "fields": e.field_errors().keys().collect::<Vec<_>>() }),
            )
        })?;

        Ok(Page {
            limit: self.limit.unwrap_or(default_limit).min(MAX_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

impl Page {
    pub fn first(limit: i64) -> Self {
        Self { limit: limit.min(MAX_LIMIT), offset: 0 }
    }

    /// Number of leading rows a page needs: `offset + limit`, saturating.
    pub fn end(&self) -> usize {
        usize::try_from(self.offset.saturating_add(self.limit)).unwrap_or(usize::MAX)
    }

    /// Slices an already materialised list the same way a LIMIT/OFFSET query would.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(usize::try_from(self.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(0))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page) -> Self {
        let has_more = items.len() as i64 == page.limit;
        Self {
            items,
            pagination: PageInfo {
                limit: page.limit,
                offset: page.offset,
                has_more,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_cap_apply() {
        let page = PageParams::default().resolve(20).unwrap();
        assert_eq!(page, Page { limit: 20, offset: 0 });

        let page = PageParams::new(500, 10).resolve(20).unwrap();
        assert_eq!(page, Page { limit: 100, offset: 10 });
    }

    #[test]
    fn negative_limit_is_rejected() {
        let err = PageParams::new(-1, 0).resolve(20).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidPagination));
    }

    #[test]
    fn has_more_tracks_full_pages() {
        let page = Page { limit: 2, offset: 0 };
        assert!(Paginated::new(vec![1, 2], page).pagination.has_more);
        assert!(!Paginated::new(vec![1], page).pagination.has_more);
    }

    #[test]
    fn end_saturates_on_huge_offset() {
        let page = PageParams::new(5, i64::MAX).resolve(20).unwrap();
        assert_eq!(page.end(), usize::try_from(i64::MAX).unwrap_or(usize::MAX));
        assert!(page.slice(vec![1, 2, 3]).is_empty());
        assert_eq!(Page { limit: 2, offset: 3 }.end(), 5);
    }

    #[test]
    fn slice_honours_offset() {
        let page = Page { limit: 2, offset: 1 };
        assert_eq!(page.slice(vec![1, 2, 3, 4]), vec![2, 3]);
    }
}
