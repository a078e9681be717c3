//! Paging and sorting for bulk listings

use crate::{CoherentResult, Customer, ValidationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Field a bulk listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    FirstName,
    LastName,
    Age,
    EmailId,
}

impl SortField {
    /// Compare two customers on this field.
    pub fn compare(&self, a: &Customer, b: &Customer) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::FirstName => a.first_name.cmp(&b.first_name),
            Self::LastName => a.last_name.cmp(&b.last_name),
            Self::Age => a.age.cmp(&b.age),
            Self::EmailId => a.email_id.cmp(&b.email_id),
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "firstname" | "first_name" => Ok(Self::FirstName),
            "lastname" | "last_name" => Ok(Self::LastName),
            "age" => Ok(Self::Age),
            "emailid" | "email_id" | "email" => Ok(Self::EmailId),
            other => Err(ValidationError::InvalidValue {
                field: "sort_by".to_string(),
                reason: format!("unknown sort field '{}'", other),
            }),
        }
    }
}

/// Sort direction; anything other than ascending sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse case-insensitively; only `asc` is ascending.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// A request for one page of a sorted listing. Pages are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_no: usize,
    pub page_size: usize,
    pub sort_by: SortField,
    pub direction: SortDirection,
}

impl PageRequest {
    pub fn new(page_no: usize, page_size: usize) -> Self {
        Self {
            page_no,
            page_size,
            sort_by: SortField::Id,
            direction: SortDirection::Asc,
        }
    }

    pub fn sorted(mut self, sort_by: SortField, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> CoherentResult<()> {
        if self.page_size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "page_size".to_string(),
                reason: "page_size must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Index of the first element on this page.
    pub fn offset(&self) -> usize {
        self.page_no.saturating_mul(self.page_size)
    }
}

/// One page of results plus the totals needed to walk the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page_no: usize,
    pub page_size: usize,
    /// Total number of elements across all pages.
    pub count: usize,
    pub total_pages: usize,
    pub last: bool,
}

impl<T> Page<T> {
    /// Slice a fully sorted collection into the requested page.
    pub fn from_sorted(all: Vec<T>, request: &PageRequest) -> Self {
        let count = all.len();
        let total_pages = if request.page_size == 0 {
            0
        } else {
            count.div_ceil(request.page_size)
        };
        let content: Vec<T> = all
            .into_iter()
            .skip(request.offset())
            .take(request.page_size)
            .collect();

        Self {
            content,
            page_no: request.page_no,
            page_size: request.page_size,
            count,
            total_pages,
            last: request.page_no.saturating_add(1) >= total_pages,
        }
    }
}
