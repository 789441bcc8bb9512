//! Identifier guard.
//!
//! Table names are interpolated into SQL text (they cannot be bound), so every
//! store validates its name here first. Project names come from operators and
//! end up in file and table names, so they are mapped to a safe key here too.

use crate::error::{DbError, Result};

const MAX_IDENTIFIER_LEN: usize = 63;
/// Longest project key; leaves room for the `spider_queue_` table prefix.
const MAX_PROJECT_KEY_LEN: usize = 50;
const MAX_SLUG_LEN: usize = 32;

/// Validate a table name: `table` or `schema.table`, each part a plain
/// identifier (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes).
pub fn validate_table_name(name: &str) -> Result<&str> {
    let mut parts = name.split('.');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    if parts.next().is_some() {
        return Err(DbError::InvalidTable(format!(
            "{name} (at most one schema qualifier allowed)"
        )));
    }

    for part in std::iter::once(first).chain(second) {
        if !is_identifier(part) {
            return Err(DbError::InvalidTable(name.to_string()));
        }
    }
    Ok(name)
}

/// Returns true if `project` can be used as its own key.
///
/// Safe keys never contain `__`; that sequence is reserved for the hash
/// separator of [`project_key`].
pub fn is_safe_project_key(project: &str) -> bool {
    !project.is_empty()
        && project.len() <= MAX_PROJECT_KEY_LEN
        && !project.contains("__")
        && project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Map a project name to the key used for its SQLite file stem and its
/// PostgreSQL table suffix.
///
/// Safe names map to themselves. Anything else is slugged and suffixed with
/// `__` plus a hash of the raw name, so distinct projects never share a key
/// and no key can escape the dbs directory.
pub fn project_key(project: &str) -> String {
    if is_safe_project_key(project) {
        return project.to_string();
    }

    let mut slug = String::with_capacity(project.len());
    for ch in project.chars() {
        let mapped = if ch.is_ascii_alphanumeric() {
            ch.to_ascii_lowercase()
        } else {
            '_'
        };
        if mapped == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(mapped);
    }

    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() {
        "project"
    } else {
        slug[..slug.len().min(MAX_SLUG_LEN)].trim_end_matches('_')
    };
    format!("{slug}__{}", short_hash(project))
}

/// Index name for `table` (unqualified), kept within the identifier limit.
///
/// PostgreSQL silently truncates long identifiers, which would let two long
/// table names share one index name; those get a hash of the table instead.
pub(crate) fn index_name(table: &str, suffix: &str) -> String {
    let plain = format!("idx_{table}_{suffix}");
    if plain.len() <= MAX_IDENTIFIER_LEN {
        return plain;
    }
    let hash = short_hash(table);
    let keep = MAX_IDENTIFIER_LEN - "idx___".len() - hash.len() - suffix.len();
    format!("idx_{}_{hash}_{suffix}", &table[..keep.min(table.len())])
}

fn short_hash(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex()[..16].to_string()
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    part.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
