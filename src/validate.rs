//! Resource-name and argument validation.
//!
//! Every validator is a pure function: it returns a fresh [`ValidationResult`]
//! for each call and keeps no state between calls.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{ErrorCode, GatewayError, GatewayResult};

/// Lowercase alphanumeric runs joined by single dashes.
pub const CONTAINER_NAME_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";

/// Minimum container name length.
pub const MIN_CONTAINER_NAME_LEN: usize = 3;

/// Maximum container name length.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

/// Maximum blob name length, in bytes.
pub const MAX_BLOB_NAME_BYTES: usize = 254;

pub const INVALID_CONTAINER_NAME_MESSAGE: &str = "The container name is invalid: ";
pub const INVALID_BLOB_NAME_MESSAGE: &str = "The blob name is invalid.";
pub const MISSING_ARGUMENT_MESSAGE: &str = "Required missing argument in query string: ";

/// Outcome of a single validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    valid: bool,
    error: Option<String>,
}

impl ValidationResult {
    /// A passing result.
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// A failing result carrying the given message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The failure message, `None` when valid.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Converts a failing result into a [`GatewayError`] of the given code.
    pub fn into_result(self, code: ErrorCode) -> GatewayResult<()> {
        if self.valid {
            return Ok(());
        }
        Err(match self.error {
            Some(message) => GatewayError::with_message(code, message),
            None => GatewayError::new(code),
        })
    }
}

fn container_name_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CONTAINER_NAME_PATTERN).expect("container name pattern compiles"))
}

/// Validates a container name.
///
/// Names are 3 to 63 characters of lowercase letters, digits and dashes. Every
/// dash must be immediately preceded and followed by a letter or digit.
pub fn validate_container_name(value: &str) -> ValidationResult {
    let len_ok = (MIN_CONTAINER_NAME_LEN..=MAX_CONTAINER_NAME_LEN).contains(&value.len());
    if len_ok && container_name_regex().is_match(value) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid(format!("{INVALID_CONTAINER_NAME_MESSAGE}{value}"))
    }
}

/// Validates a blob name.
///
/// The name must not be blank and must fit in 254 bytes. Path separators are
/// allowed; the name is otherwise opaque.
pub fn validate_blob_name(value: &str) -> ValidationResult {
    if value.trim().is_empty() || value.len() > MAX_BLOB_NAME_BYTES {
        ValidationResult::invalid(INVALID_BLOB_NAME_MESSAGE)
    } else {
        ValidationResult::valid()
    }
}

/// Checks that `name` is present among the request arguments.
pub fn validate_required_argument(
    name: &str,
    arguments: &HashMap<String, String>,
) -> ValidationResult {
    if name.is_empty() || !arguments.contains_key(name) {
        ValidationResult::invalid(format!("{MISSING_ARGUMENT_MESSAGE}{name}"))
    } else {
        ValidationResult::valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_container_names() {
        for name in ["my-container-name", "abc123", "xxx", "a-b-c", &"x".repeat(63)] {
            let result = validate_container_name(name);
            assert!(result.is_valid(), "{name} should be valid");
            assert_eq!(result.error(), None);
        }
    }

    #[test]
    fn test_invalid_container_names() {
        let long = "x".repeat(64);
        for name in [
            "",
            "c",
            "cc",
            long.as_str(),
            "Container Name",
            "UPPER",
            "-invalid",
            "invalid-",
            "invalid--name",
            "-invalid-",
            "under_score",
            "dot.name",
        ] {
            let result = validate_container_name(name);
            assert!(!result.is_valid(), "{name} should be invalid");
            assert_eq!(
                result.error(),
                Some(format!("{INVALID_CONTAINER_NAME_MESSAGE}{name}").as_str())
            );
        }
    }

    #[test]
    fn test_blob_names() {
        assert!(validate_blob_name("foo.txt").is_valid());
        assert!(validate_blob_name("foo/bar.txt").is_valid());
        assert!(validate_blob_name(&"x".repeat(254)).is_valid());

        for name in ["", "   ", &"x".repeat(255)] {
            let result = validate_blob_name(name);
            assert!(!result.is_valid());
            assert_eq!(result.error(), Some(INVALID_BLOB_NAME_MESSAGE));
        }
    }

    #[test]
    fn test_blob_name_limit_counts_bytes() {
        // 127 two-byte characters is 254 bytes.
        let at_limit = "é".repeat(127);
        assert_eq!(at_limit.len(), 254);
        assert!(validate_blob_name(&at_limit).is_valid());

        // 128 characters, but 256 bytes.
        let over_limit = "é".repeat(128);
        assert_eq!(over_limit.chars().count(), 128);
        assert!(!validate_blob_name(&over_limit).is_valid());

        let mixed = format!("{}€", "x".repeat(252));
        assert_eq!(mixed.len(), 255);
        assert!(!validate_blob_name(&mixed).is_valid());
    }

    #[test]
    fn test_required_argument() {
        let mut args = HashMap::new();
        args.insert("op".to_string(), "list".to_string());
        assert!(validate_required_argument("op", &args).is_valid());

        let result = validate_required_argument("op", &HashMap::new());
        assert!(!result.is_valid());
        assert_eq!(result.error(), Some("Required missing argument in query string: op"));

        assert!(!validate_required_argument("", &HashMap::new()).is_valid());
        assert!(!validate_required_argument("", &args).is_valid());
    }

    #[test]
    fn test_results_do_not_leak_between_calls() {
        let bad = validate_container_name("-bad-");
        let good = validate_container_name("good-name");
        assert!(!bad.is_valid());
        assert!(good.is_valid());
        assert_eq!(good.error(), None);
    }

    #[test]
    fn test_into_result_maps_code() {
        let err = validate_blob_name("").into_result(ErrorCode::InvalidBlob).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidBlob);
        assert_eq!(err.message, INVALID_BLOB_NAME_MESSAGE);

        assert!(validate_blob_name("a").into_result(ErrorCode::InvalidBlob).is_ok());
    }
}
