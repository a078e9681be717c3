//! Filter criteria, canonical cache keys, and query-branch precedence
//!
//! A [`FilterCriteria`] is the query shape handed to the cache-aside
//! resolver. Its [`CacheKey`] is a canonical string with a fixed field order
//! and explicit `null` markers, so two criteria with the same field values
//! always produce the same key regardless of how they were built.

use crate::{CoherentResult, Customer, CustomerId, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker written for an unset field in a canonical key.
const NULL_MARKER: &str = "null";

/// Immutable tuple of optional filter fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub id: Option<CustomerId>,
    /// Exact numeric match on `age`.
    pub age: Option<u32>,
    /// Inclusive lower bound on `age`.
    pub min_age: Option<u32>,
    /// Inclusive upper bound on `age`.
    pub max_age: Option<u32>,
    /// Exact-match field 1.
    pub email: Option<String>,
    /// Exact-match field 2.
    pub gender: Option<String>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<CustomerId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_min_age(mut self, min_age: u32) -> Self {
        self.min_age = Some(min_age);
        self
    }

    pub fn with_max_age(mut self, max_age: u32) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Copy of these criteria with the range bounds replaced.
    ///
    /// Used to build the relaxed probe keys during range widening; every
    /// other field is carried over unchanged.
    pub fn with_bounds(&self, min_age: Option<u32>, max_age: Option<u32>) -> Self {
        Self {
            min_age,
            max_age,
            ..self.clone()
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.age.is_none()
            && self.min_age.is_none()
            && self.max_age.is_none()
            && self.email.is_none()
            && self.gender.is_none()
    }

    /// Reject criteria that cannot select anything meaningful.
    pub fn validate(&self) -> CoherentResult<()> {
        if self.is_empty() {
            return Err(ValidationError::EmptyCriteria.into());
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return Err(ValidationError::InvertedRange { min, max }.into());
            }
        }
        Ok(())
    }

    /// Canonical cache key for these criteria.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_criteria(self)
    }

    /// The single store branch that answers these criteria.
    ///
    /// Precedence: `id` > exact age > bounded range > email > min-only >
    /// max-only > gender. Only the first populated branch is returned even
    /// when several fields are set.
    pub fn branch(&self) -> Option<QueryBranch> {
        if let Some(id) = &self.id {
            return Some(QueryBranch::Id(id.clone()));
        }
        if let Some(age) = self.age {
            return Some(QueryBranch::ExactAge(age));
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            return Some(QueryBranch::AgeBetween { min, max });
        }
        if let Some(email) = &self.email {
            return Some(QueryBranch::Email(email.clone()));
        }
        if let Some(min) = self.min_age {
            return Some(QueryBranch::AgeGreaterThan(min));
        }
        if let Some(max) = self.max_age {
            return Some(QueryBranch::AgeLessThan(max));
        }
        self.gender.clone().map(QueryBranch::Gender)
    }

    /// Shape of the requested numeric range, if range widening applies.
    ///
    /// Widening only applies when a bound is set and no exact age is.
    pub fn range_request(&self) -> Option<RangeRequest> {
        if self.age.is_some() {
            return None;
        }
        match (self.min_age, self.max_age) {
            (Some(min), None) => Some(RangeRequest::MinOnly(min)),
            (None, Some(max)) => Some(RangeRequest::MaxOnly(max)),
            (Some(min), Some(max)) => Some(RangeRequest::Bounded { min, max }),
            (None, None) => None,
        }
    }

    /// Full conjunctive predicate over every populated field.
    pub fn matches(&self, customer: &Customer) -> bool {
        let id_ok = self
            .id
            .as_ref()
            .map_or(true, |id| customer.id.as_ref() == Some(id));
        let age_ok = self.age.map_or(true, |age| customer.age == age);
        let min_ok = self.min_age.map_or(true, |min| customer.age >= min);
        let max_ok = self.max_age.map_or(true, |max| customer.age <= max);
        let email_ok = self
            .email
            .as_ref()
            .map_or(true, |email| customer.email_id.as_ref() == Some(email));
        let gender_ok = self
            .gender
            .as_ref()
            .map_or(true, |gender| customer.gender.as_ref() == Some(gender));

        id_ok && age_ok && min_ok && max_ok && email_ok && gender_ok
    }

    /// Keep the records that match, preserving their order.
    pub fn filter<'a, I>(&self, customers: I) -> Vec<Customer>
    where
        I: IntoIterator<Item = &'a Customer>,
    {
        customers
            .into_iter()
            .filter(|c| self.matches(c))
            .cloned()
            .collect()
    }
}

/// One store lookup selected by [`FilterCriteria::branch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBranch {
    Id(CustomerId),
    ExactAge(u32),
    /// Inclusive on both ends.
    AgeBetween { min: u32, max: u32 },
    Email(String),
    /// Strictly greater than.
    AgeGreaterThan(u32),
    /// Strictly less than.
    AgeLessThan(u32),
    Gender(String),
}

impl fmt::Display for QueryBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id = {}", id),
            Self::ExactAge(age) => write!(f, "age = {}", age),
            Self::AgeBetween { min, max } => write!(f, "age between {} and {}", min, max),
            Self::Email(email) => write!(f, "email = {}", email),
            Self::AgeGreaterThan(min) => write!(f, "age > {}", min),
            Self::AgeLessThan(max) => write!(f, "age < {}", max),
            Self::Gender(gender) => write!(f, "gender = {}", gender),
        }
    }
}

/// Which bounds a range query carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    MinOnly(u32),
    MaxOnly(u32),
    Bounded { min: u32, max: u32 },
}

/// Canonical cache-aside lookup key.
///
/// Format: `id=<v>,exact=<v>,min=<v>,max=<v>,field1=<v>,field2=<v>` where an
/// unset field is written as `null`. String values escape `\`, `,` and `=`,
/// and a literal `null` string is written as `\null`, so distinct criteria
/// never share a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    fn from_criteria(criteria: &FilterCriteria) -> Self {
        let key = format!(
            "id={},exact={},min={},max={},field1={},field2={}",
            text_component(criteria.id.as_ref().map(CustomerId::as_str)),
            numeric_component(criteria.age),
            numeric_component(criteria.min_age),
            numeric_component(criteria.max_age),
            text_component(criteria.email.as_deref()),
            text_component(criteria.gender.as_deref()),
        );
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn numeric_component(value: Option<u32>) -> String {
    value.map_or_else(|| NULL_MARKER.to_string(), |v| v.to_string())
}

fn text_component(value: Option<&str>) -> String {
    match value {
        None => NULL_MARKER.to_string(),
        Some(NULL_MARKER) => format!("\\{}", NULL_MARKER),
        Some(text) => {
            let mut escaped = String::with_capacity(text.len());
            for ch in text.chars() {
                if matches!(ch, '\\' | ',' | '=') {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
            escaped
        }
    }
}
