//! Key derivation for raw parameter rows
//!
//! Every emitted reading carries a stable `key`: the lookup-table name for
//! known vendor parameter codes, the code itself for unknown ones, and a
//! deterministic title-derived slug for rows without a code.

use std::collections::HashMap;

use crate::models::{RawParameter, Reading};

/// Resolve the stable key for a raw parameter row.
pub fn derive_key(
    raw: &RawParameter,
    category_id: &str,
    table: &HashMap<String, String>,
) -> String {
    match &raw.parameter_id {
        Some(id) => table.get(id).cloned().unwrap_or_else(|| id.clone()),
        None => derive_slug(category_id, &raw.title),
    }
}

/// Build a [`Reading`] from a raw row, tagging it with its category.
pub fn normalize(
    raw: RawParameter,
    category_id: &str,
    table: &HashMap<String, String>,
) -> Reading {
    let key = derive_key(&raw, category_id, table);
    Reading {
        key,
        parameter_id: raw.parameter_id,
        title: raw.title,
        designation: raw.designation,
        unit: raw.unit,
        value: raw.value,
        raw_value: raw.raw_value,
        category_id: category_id.to_string(),
    }
}

/// Slug fallback for rows without a parameter id: split the title on runs of
/// non-ASCII-letter characters (a leading run yields a leading empty
/// segment), join with `_`, lower-case, strip trailing underscores and
/// prefix the category id.
fn derive_slug(category_id: &str, title: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if title.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        segments.push("");
    }
    segments.extend(
        title
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|s| !s.is_empty()),
    );

    let slug = format!("{}_{}", category_id, segments.join("_")).to_lowercase();
    slug.trim_end_matches('_').to_string()
}
