//! Input validation for tier and group identifiers
//!
//! Group and tier names follow a DNS-subdomain-like grammar:
//! `[a-z0-9]([a-z0-9\-:._]*[a-z0-9])?`, 1-253 characters. Colons are allowed so
//! compound identity-system names such as `system:authenticated` validate.
//!
//! Validation is pure and runs before any remote lookup.

use thiserror::Error;

/// Maximum length of a group or tier name (DNS subdomain limit)
pub const MAX_NAME_LENGTH: usize = 253;

/// Validation failures for user-supplied input
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An identifier was empty
    #[error("{field} is required")]
    NameRequired {
        /// Which identifier was missing (e.g. "group name")
        field: &'static str,
    },

    /// An identifier was non-empty but malformed
    #[error(
        "invalid {field} '{value}': must be 1-253 characters, start and end with a lowercase \
         alphanumeric character, and contain only lowercase alphanumerics, '-', ':', '.' or '_'"
    )]
    InvalidName {
        /// Which identifier was malformed
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// Tier description was empty
    #[error("tier description is required")]
    DescriptionRequired,

    /// Tier level was negative
    #[error("tier level must be non-negative, got {level}")]
    NegativeLevel {
        /// The rejected level
        level: i64,
    },

    /// Username was empty
    #[error("username is required")]
    UserRequired,

    /// A required request field was empty
    #[error("{field} is required")]
    FieldRequired {
        /// Name of the missing field
        field: &'static str,
    },
}

/// Validate an identifier against the group/tier name grammar.
///
/// `field` names the identifier in the error message.
pub fn validate_name(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::NameRequired { field });
    }

    let invalid = || ValidationError::InvalidName {
        field,
        value: value.to_string(),
    };

    if value.len() > MAX_NAME_LENGTH {
        return Err(invalid());
    }

    let bytes = value.as_bytes();
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if !is_edge_char(first) || !is_edge_char(last) {
        return Err(invalid());
    }

    if !bytes.iter().all(|&b| is_edge_char(b) || is_interior_char(b)) {
        return Err(invalid());
    }

    Ok(())
}

/// Validate a group name
pub fn validate_group_name(value: &str) -> Result<(), ValidationError> {
    validate_name(value, "group name")
}

/// Validate a tier name
pub fn validate_tier_name(value: &str) -> Result<(), ValidationError> {
    validate_name(value, "tier name")
}

/// Reject empty request fields (namespace, workload name, tier)
pub fn require_field(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::FieldRequired { field });
    }
    Ok(())
}

fn is_edge_char(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_interior_char(b: u8) -> bool {
    matches!(b, b'-' | b':' | b'.' | b'_')
}
