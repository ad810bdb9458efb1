//! Field-keyed validation errors and the small checks that produce them.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Messages grouped by field name, serialised as `{"field": ["message", ...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn has_any(&self) -> bool {
        !self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Build an error set holding a single message.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn require_present(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("{} can not be blank.", label(field)));
        }
    }

    /// Present and shaped like an email address.
    pub fn require_email(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("{} can not be blank.", label(field)));
        } else if !valid_email(value) {
            self.add(field, format!("{} does not match the email format.", label(field)));
        }
    }

    /// Length in characters within `min..=max`.
    pub fn require_length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let length = value.chars().count();
        if length < min || length > max {
            self.add(
                field,
                format!("{} not in range({min}, {max})", label(field)),
            );
        }
    }

    /// Present means supplied and non-zero.
    pub fn require_int_present(&mut self, field: &str, value: Option<i32>) {
        if value.unwrap_or(0) == 0 {
            self.add(field, format!("{} can not be blank.", label(field)));
        }
    }

    pub fn require_less_than(&mut self, field: &str, value: Option<i32>, bound: i32) {
        if let Some(value) = value.filter(|value| *value >= bound) {
            self.add(field, format!("{value} is not less than {bound}."));
        }
    }

    pub fn require_match(&mut self, field: &str, value: &str, other: &str, message: &str) {
        if value != other {
            self.add(field, message);
        }
    }
}

/// Trim and lowercase an identity so lookups, uniqueness checks, and the attempt
/// counter all agree on one spelling.
#[must_use]
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Basic email format check.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

fn label(field: &str) -> String {
    field
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}
