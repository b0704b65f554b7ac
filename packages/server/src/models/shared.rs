use std::collections::HashSet;

use serde::Serialize;

use crate::error::AppError;
use crate::filters::PageParams;

/// Pagination metadata included in list responses.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Pagination {
    /// Current page number (1-based).
    #[schema(example = 1)]
    pub page: u64,
    /// Number of items per page.
    #[schema(example = 10)]
    pub limit: u64,
    /// Total number of matching items across all pages.
    #[schema(example = 25)]
    pub total: u64,
    /// Total number of pages.
    #[schema(example = 3)]
    pub pages: u64,
}

impl Pagination {
    pub fn new(params: PageParams, total: u64) -> Self {
        Self {
            page: params.page,
            limit: params.limit,
            total,
            pages: params.total_pages(total),
        }
    }
}

/// Parse a comma-separated id list (`"3,1,7"`) into distinct ids,
/// first occurrence order preserved.
pub fn parse_id_list(raw: &str) -> Result<Vec<i32>, AppError> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id: i32 = part
            .parse()
            .map_err(|_| AppError::Validation(format!("Invalid id '{part}' in id list")))?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err(AppError::Validation("At least one id is required".into()));
    }
    Ok(ids)
}
