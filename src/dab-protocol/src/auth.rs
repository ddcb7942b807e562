// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Control connection authorization.

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization token")]
    Missing,
    #[error("invalid authorization token")]
    Invalid,
}

/// Strip a case-insensitive "Bearer " prefix and surrounding whitespace.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    let prefix = "bearer ";
    match trimmed.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => trimmed[prefix.len()..].trim_start(),
        _ => trimmed,
    }
}

pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Accepts any token from a fixed set. An empty set disables auth.
pub struct SimpleTokenValidator {
    tokens: HashSet<String>,
}

impl SimpleTokenValidator {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for SimpleTokenValidator {
    fn validate(&self, token: Option<&str>) -> Result<(), AuthError> {
        if self.tokens.is_empty() {
            return Ok(());
        }
        let token = token.ok_or(AuthError::Missing)?;
        if self.tokens.contains(strip_bearer(token)) {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

pub struct NoAuthValidator;

impl TokenValidator for NoAuthValidator {
    fn validate(&self, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SimpleTokenValidator {
        SimpleTokenValidator::new(vec!["token123".to_string(), "  ".to_string()])
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc123"), "abc123");
        assert_eq!(strip_bearer("BeArEr  abc123 "), "abc123");
        assert_eq!(strip_bearer("abc123"), "abc123");
        assert_eq!(strip_bearer("bearer "), "bearer");
        assert_eq!(strip_bearer(""), "");
    }

    #[test]
    fn test_simple_validator() {
        let v = validator();
        assert!(!v.is_empty());
        assert_eq!(v.validate(Some("token123")), Ok(()));
        assert_eq!(v.validate(Some("Bearer token123")), Ok(()));
        assert_eq!(v.validate(Some("wrong")), Err(AuthError::Invalid));
        assert_eq!(v.validate(None), Err(AuthError::Missing));
        assert_eq!(
            AuthError::Missing.to_string(),
            "missing authorization token"
        );
    }

    #[test]
    fn test_empty_set_disables_auth() {
        let v = SimpleTokenValidator::new(Vec::new());
        assert!(v.is_empty());
        assert_eq!(v.validate(None), Ok(()));
        assert_eq!(NoAuthValidator.validate(Some("anything")), Ok(()));
    }
}
