//! Shape validation for identifiers sent to the engine.
//!
//! Every type in [`crate::types`] is built through these checks, so a value
//! that reached an engine call has already passed them. Semantic validity
//! (does the relation exist in the model, does the user exist) is left to
//! the engine.

use crate::error::AuthzError;
use rootcause::prelude::Report;

/// Longest type name the engine accepts.
pub const MAX_TYPE_LEN: usize = 254;
/// Longest object id the engine accepts.
pub const MAX_ID_LEN: usize = 256;
/// Longest relation name the engine accepts.
pub const MAX_RELATION_LEN: usize = 50;

fn check_common(
    field: &'static str,
    value: &str,
    max_len: usize,
    forbidden: &[char],
) -> Result<(), Report<AuthzError>> {
    if value.trim().is_empty() {
        return Err(AuthzError::invalid(field, "must not be empty").into());
    }
    if value.chars().count() > max_len {
        return Err(AuthzError::invalid(
            field,
            format!("'{value}' is longer than {max_len} characters"),
        )
        .into());
    }
    if let Some(c) = value.chars().find(|c| c.is_whitespace()) {
        return Err(AuthzError::invalid(
            field,
            format!("'{value}' contains whitespace {c:?}"),
        )
        .into());
    }
    if let Some(c) = value.chars().find(|c| forbidden.contains(c)) {
        return Err(AuthzError::invalid(
            field,
            format!("'{value}' contains reserved character '{c}'"),
        )
        .into());
    }
    Ok(())
}

/// Validates a type tag such as `user` or `doc`.
pub fn type_name(field: &'static str, value: &str) -> Result<(), Report<AuthzError>> {
    check_common(field, value, MAX_TYPE_LEN, &[':', '#', '@', '*'])
}

/// Validates the id half of a `type:id` pair.
///
/// `:` is rejected so an id taken from user input cannot smuggle in a
/// different type.
pub fn object_id(field: &'static str, value: &str) -> Result<(), Report<AuthzError>> {
    check_common(field, value, MAX_ID_LEN, &[':', '#'])
}

/// Validates a relation name such as `viewer` or `can_read`.
pub fn relation_name(field: &'static str, value: &str) -> Result<(), Report<AuthzError>> {
    check_common(field, value, MAX_RELATION_LEN, &[':', '#', '@', '*'])
}

/// Splits a `type:id` string at its namespace separator.
pub fn split_namespaced<'a>(
    field: &'static str,
    value: &'a str,
) -> Result<(&'a str, &'a str), Report<AuthzError>> {
    if value.trim().is_empty() {
        return Err(AuthzError::invalid(field, "must not be empty").into());
    }
    value.split_once(':').ok_or_else(|| {
        AuthzError::invalid(
            field,
            format!("'{value}' is missing a type tag (expected 'type:id')"),
        )
        .into()
    })
}
