//! Turns raw listing parameters into a validated, bounded book query.
//!
//! Both storage engines consume [`ListQuery`]: the memory store through
//! [`ListQuery::matches`] and [`ListQuery::compare`], Postgres through the
//! column names exposed by [`SortField::column`].

use std::{cmp::Ordering, str::FromStr};

use crate::{
    errors::{AppError, AppResult},
    models::{Book, BookStatus, ListParams},
};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_SORT: &str = "id";

/// Book attributes a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Title,
    Author,
    Year,
    Status,
}

impl SortField {
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Author => "author",
            Self::Year => "year",
            Self::Status => "status",
        }
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            "year" => Ok(Self::Year),
            "status" => Ok(Self::Status),
            other => Err(AppError::InvalidSortField(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    #[must_use]
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    #[must_use]
    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    fn compare(&self, a: &Book, b: &Book) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Author => a.author.cmp(&b.author),
            SortField::Year => a.year.cmp(&b.year),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        };
        if self.descending { ord.reverse() } else { ord }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Lowercased search term; empty matches everything.
    pub term: String,
    pub status: Option<BookStatus>,
    /// Always ends with an `id` key so ordering is total.
    pub sort: Vec<SortKey>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            term: String::new(),
            status: None,
            sort: vec![SortKey::asc(SortField::Id)],
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListQuery {
    /// Validate raw parameters and apply defaults.
    ///
    /// # Errors
    /// Returns a validation error for a non-numeric or zero `page`/`limit` or an
    /// unknown `status`, and `InvalidSortField` for a sort key that is not a
    /// book attribute.
    pub fn build(params: &ListParams) -> AppResult<Self> {
        let page = parse_positive(present(params.page.as_deref()), "page")?.unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(present(params.limit.as_deref()), "limit")?
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let term = present(params.q.as_deref())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let status = present(params.status.as_deref())
            .map(BookStatus::from_str)
            .transpose()?;
        let sort = parse_sort(present(params.sort.as_deref()).unwrap_or(DEFAULT_SORT))?;

        Ok(Self {
            term,
            status,
            sort,
            page,
            limit,
        })
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    #[must_use]
    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }

    /// Whether `book` passes the text and status filters.
    #[must_use]
    pub fn matches(&self, book: &Book) -> bool {
        let text = self.term.is_empty()
            || book.title.to_lowercase().contains(&self.term)
            || book.author.to_lowercase().contains(&self.term);
        text && self.status.is_none_or(|s| s == book.status)
    }

    /// Multi-key ordering, first key primary.
    #[must_use]
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        self.sort
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.filter(|v| !v.is_empty())
}

fn parse_positive(raw: Option<&str>, name: &str) -> AppResult<Option<u32>> {
    raw.map(|v| match v.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(AppError::Validation(format!(
            "{name} must be a positive integer"
        ))),
    })
    .transpose()
}

/// Parse a comma-separated sort spec such as `year,-title`.
///
/// # Errors
/// Returns `InvalidSortField` for any name that is not a book attribute.
pub fn parse_sort(spec: &str) -> AppResult<Vec<SortKey>> {
    let mut keys: Vec<SortKey> = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (descending, name) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let field = name.parse::<SortField>()?;
        if keys.iter().any(|k| k.field == field) {
            continue;
        }
        keys.push(SortKey { field, descending });
    }
    if !keys.iter().any(|k| k.field == SortField::Id) {
        keys.push(SortKey::asc(SortField::Id));
    }
    Ok(keys)
}
