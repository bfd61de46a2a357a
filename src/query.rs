//! Shared read path for listings: page windows, sorting and time-range filters
//!
//! Both backends honour the same contract. The total is always counted over the
//! whole filtered set, never over the returned page, and NULL sort keys come
//! first ascending and last descending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort direction for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn nulls(self) -> &'static str {
        match self {
            SortDirection::Asc => "NULLS FIRST",
            SortDirection::Desc => "NULLS LAST",
        }
    }
}

/// Validated skip/limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Validate)]
pub struct PageRequest {
    #[validate(range(min = 0, message = "skip must not be negative"))]
    pub skip: i64,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: i64,
}

impl PageRequest {
    pub fn new(skip: i64, limit: i64) -> AppResult<Self> {
        let page = Self { skip, limit };
        page.validate()?;
        Ok(page)
    }
}

/// One page of a filtered listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the full filtered set
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Exact and/or inclusive range match on a timestamp column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub exact: Option<DateTime<Utc>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(
        exact: Option<DateTime<Utc>>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::Validation(format!(
                    "range start {} is after range end {}",
                    from, to
                )));
            }
        }
        Ok(Self { exact, from, to })
    }

    pub fn is_unbounded(&self) -> bool {
        self.exact.is_none() && self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, value: DateTime<Utc>) -> bool {
        self.exact.map_or(true, |t| value == t)
            && self.from.map_or(true, |t| value >= t)
            && self.to.map_or(true, |t| value <= t)
    }

    /// Match a nullable column; a bounded range never matches NULL
    pub fn matches(&self, value: Option<DateTime<Utc>>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        value.map_or(false, |v| self.contains(v))
    }

    /// Append ` AND column ...` predicates for every bound that is set
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>, column: &str) {
        if let Some(t) = self.exact {
            qb.push(format!(" AND {} = ", column)).push_bind(t);
        }
        if let Some(t) = self.from {
            qb.push(format!(" AND {} >= ", column)).push_bind(t);
        }
        if let Some(t) = self.to {
            qb.push(format!(" AND {} <= ", column)).push_bind(t);
        }
    }
}

/// Sort, count and slice rows that were already filtered in memory
pub fn paginate<T, K, F>(mut rows: Vec<T>, page: PageRequest, direction: SortDirection, key: F) -> Page<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    rows.sort_by(|a, b| {
        let ordering = key(a).cmp(&key(b));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(page.skip as usize)
        .take(page.limit as usize)
        .collect();

    Page {
        items,
        total,
        skip: page.skip,
        limit: page.limit,
    }
}

/// Append ORDER BY / LIMIT / OFFSET, breaking ties on `tie_column`
pub fn push_order_and_page(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    tie_column: &str,
    direction: SortDirection,
    page: PageRequest,
) {
    qb.push(format!(
        " ORDER BY {} {} {}, {} {}",
        column,
        direction.keyword(),
        direction.nulls(),
        tie_column,
        direction.keyword()
    ));
    qb.push(" LIMIT ").push_bind(page.limit);
    qb.push(" OFFSET ").push_bind(page.skip);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_page_bounds() {
        assert!(PageRequest::new(0, 1).is_ok());
        assert!(PageRequest::new(10, 100).is_ok());
        assert!(matches!(PageRequest::new(0, 0), Err(AppError::Validation(_))));
        assert!(matches!(PageRequest::new(0, 101), Err(AppError::Validation(_))));
        assert!(matches!(PageRequest::new(-1, 10), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_paginate_total_covers_full_set() {
        let page = PageRequest::new(2, 2).unwrap();
        let result = paginate(vec![5, 1, 4, 2, 3], page, SortDirection::Asc, |v| *v);
        assert_eq!(result.items, vec![3, 4]);
        assert_eq!(result.total, 5);

        let result = paginate(vec![5, 1, 4, 2, 3], page, SortDirection::Desc, |v| *v);
        assert_eq!(result.items, vec![3, 2]);
    }

    #[test]
    fn test_paginate_past_end() {
        let page = PageRequest::new(10, 5).unwrap();
        let result = paginate(vec![1, 2, 3], page, SortDirection::Desc, |v| *v);
        assert!(result.items.is_empty());
        assert_eq!(result.total, 3);
    }

    #[test]
    fn test_nulls_first_ascending_last_descending() {
        let rows = vec![Some(at(2)), None, Some(at(1))];
        let page = PageRequest::new(0, 10).unwrap();

        let asc = paginate(rows.clone(), page, SortDirection::Asc, |v| *v);
        assert_eq!(asc.items, vec![None, Some(at(1)), Some(at(2))]);

        let desc = paginate(rows, page, SortDirection::Desc, |v| *v);
        assert_eq!(desc.items, vec![Some(at(2)), Some(at(1)), None]);
    }

    #[test]
    fn test_time_range_inclusive() {
        let range = TimeRange::new(None, Some(at(2)), Some(at(4))).unwrap();
        assert!(!range.contains(at(1)));
        assert!(range.contains(at(2)));
        assert!(range.contains(at(4)));
        assert!(!range.contains(at(4) + Duration::seconds(1)));
    }

    #[test]
    fn test_time_range_exact_and_nullable() {
        let range = TimeRange::new(Some(at(3)), None, None).unwrap();
        assert!(range.matches(Some(at(3))));
        assert!(!range.matches(Some(at(2))));
        assert!(!range.matches(None));
        assert!(TimeRange::default().matches(None));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            TimeRange::new(None, Some(at(5)), Some(at(1))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_order_clause() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM borrowings b WHERE TRUE");
        TimeRange::new(None, Some(at(1)), None)
            .unwrap()
            .push_sql(&mut qb, "b.due_at");
        push_order_and_page(
            &mut qb,
            "b.returned_at",
            "b.id",
            SortDirection::Asc,
            PageRequest::new(0, 20).unwrap(),
        );
        assert_eq!(
            qb.sql(),
            "SELECT * FROM borrowings b WHERE TRUE AND b.due_at >= $1 \
             ORDER BY b.returned_at ASC NULLS FIRST, b.id ASC LIMIT $2 OFFSET $3"
        );
    }
}
