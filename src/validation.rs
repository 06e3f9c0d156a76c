//! Local request validation, run before any store or gateway call.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

pub trait Validatable {
    fn validate(&self) -> AppResult<()>;
}

/// Collects per-field violations and turns them into a single `AppError::Validation`.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length is counted in characters, not bytes.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let n = value.chars().count();
        if n < min || n > max {
            self.errors.insert(
                field.to_string(),
                format!("{field} must be between {min} and {max} characters"),
            );
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.insert(field.to_string(), format!("{field} is required"));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.len() > 255 || !EMAIL_RE.is_match(value) {
            self.errors.insert(field.to_string(), format!("{field} must be a valid email address"));
        }
        self
    }

    pub fn finish(&mut self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation { errors: std::mem::take(&mut self.errors) })
        }
    }
}
