//! Canonical key codec.
//!
//! Keys are escaped tuple fields joined with a raw `\n` separator. Because
//! every `\`, CR and LF inside a field is backslash-escaped first, the
//! separator is unambiguous even when fields contain it, and `split` is the
//! exact inverse of `join` for arbitrary strings.

use thiserror::Error as ThisError;

/// Raw separator between escaped tuple fields.
pub const SEPARATOR: char = '\n';

///
/// KeyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum KeyError {
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("trailing backslash in escaped field")]
    TrailingEscape,
}

/// Escape one tuple field (`\` -> `\\`, CR -> `\r`, LF -> `\n`).
#[must_use]
pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }

    out
}

/// Exact inverse of [`escape`].
pub fn unescape(field: &str) -> Result<String, KeyError> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => return Err(KeyError::InvalidEscape(other)),
            None => return Err(KeyError::TrailingEscape),
        }
    }

    Ok(out)
}

/// Join fields into one canonical key.
#[must_use]
pub fn join(fields: &[&str]) -> String {
    let escaped: Vec<String> = fields.iter().map(|f| escape(f)).collect();

    escaped.join("\n")
}

/// Split a canonical key back into its unescaped fields.
pub fn split(key: &str) -> Result<Vec<String>, KeyError> {
    key.split(SEPARATOR).map(unescape).collect()
}

/// Key of one entity's one record: (entity-or-map id, instance id).
#[must_use]
pub fn row_key(entity_id: &str, instance_id: &str) -> String {
    join(&[entity_id, instance_id])
}

/// Set-membership key of one (record, property, value) triple.
///
/// Membership changes when the value changes; a changed value is "old tuple
/// absent, new tuple present".
#[must_use]
pub fn property_key(entity_id: &str, instance_id: &str, property_id: &str, value: &str) -> String {
    join(&[entity_id, instance_id, property_id, value])
}

/// Value-independent key of one (record, property) cell.
#[must_use]
pub fn identity_key(entity_id: &str, instance_id: &str, property_id: &str) -> String {
    join(&[entity_id, instance_id, property_id])
}

///
/// TESTS
///
