//! Builders for the Drive `q` search language.

use crate::model::FOLDER_MIME_TYPE;

/// Quote a string literal, escaping `\` and `'`.
pub fn literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

pub fn in_parents(folder_id: &str) -> String {
    format!("{} in parents", literal(folder_id))
}

pub fn folder_named(name: &str) -> String {
    format!(
        "mimeType = {} and name = {} and trashed = false",
        literal(FOLDER_MIME_TYPE),
        literal(name)
    )
}

pub fn child_folders_of(folder_id: &str) -> String {
    format!(
        "mimeType = {} and {} and trashed = false",
        literal(FOLDER_MIME_TYPE),
        in_parents(folder_id)
    )
}

/// Non-folder objects matching `parent_filter`, which may be an OR-chain.
pub fn files_within(parent_filter: &str) -> String {
    format!(
        "({parent_filter}) and mimeType != {} and trashed = false",
        literal(FOLDER_MIME_TYPE)
    )
}
