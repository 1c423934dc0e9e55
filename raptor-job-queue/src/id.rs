//! Hierarchical job identifiers.
//!
//! A root id is an opaque UUID v4 rendered without hyphens. Sequence jobs of a
//! batch append `-<index>` to the root, so the batch a job belongs to can be
//! recovered from the job id alone. The `-` separator is part of the external
//! id format: clients split on the last occurrence to find the parent.

use uuid::Uuid;

/// Separator between a parent id and a child index.
pub const SEPARATOR: char = '-';

/// Generate a globally unique root identifier.
pub fn new_root_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Derive the identifier of the `index`-th child of `parent_id`.
#[inline]
pub fn child_id(parent_id: &str, index: usize) -> String {
    format!("{parent_id}{SEPARATOR}{index}")
}

/// Strip the trailing index segment from `id`.
///
/// Only the last separator is considered, and only when the text after it is a
/// non-empty run of ASCII digits. Returns `None` for root identifiers.
pub fn parent_of(id: &str) -> Option<&str> {
    split_child(id).map(|(parent, _)| parent)
}

/// Index of `id` within its batch, if it is a child identifier.
pub fn child_index(id: &str) -> Option<usize> {
    split_child(id).and_then(|(_, index)| index.parse().ok())
}

fn split_child(id: &str) -> Option<(&str, &str)> {
    let (parent, index) = id.rsplit_once(SEPARATOR)?;
    if parent.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((parent, index))
}
