//! Author list normalization.
//!
//! Providers send authors as plain strings, `{given, family}` pairs,
//! `{first, last}` or `{firstName, lastName}` pairs, `{name}` objects,
//! Scopus `{"$": ...}` objects, one free-text string for the whole list,
//! or a list mixing any of these.

use serde_json::Value;

use crate::models::{Author, UNKNOWN_AUTHOR};

/// Normalize an author field of any supported shape
///
/// Never returns an empty list: when nothing is recognizable the result is
/// the single "Unknown" placeholder.
pub fn parse_authors(value: &Value) -> Vec<Author> {
    let authors = match value {
        Value::Array(items) => items.iter().filter_map(parse_author).collect(),
        Value::String(s) => split_author_string(s),
        Value::Null => Vec::new(),
        other => parse_author(other).into_iter().collect(),
    };

    if authors.is_empty() {
        vec![Author::unknown()]
    } else {
        authors
    }
}

/// Normalize one author entry
pub fn parse_author(value: &Value) -> Option<Author> {
    match value {
        Value::Null => None,
        Value::String(s) => clean(s).map(Author::new),
        Value::Object(map) => {
            let name = name_from_object(map).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
            Some(Author::with_affiliation(name, affiliation_from_object(map)))
        }
        other => clean(&other.to_string()).map(Author::new),
    }
}

/// Split a single free-text author string into names
///
/// `;` takes precedence over `,`, which takes precedence over " and ".
pub fn split_author_string(s: &str) -> Vec<Author> {
    let parts: Vec<&str> = if s.contains(';') {
        s.split(';').collect()
    } else if s.contains(',') {
        s.split(',').collect()
    } else {
        s.split(" and ").collect()
    };

    parts.into_iter().filter_map(clean).map(Author::new).collect()
}

fn name_from_object(map: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(name) = map.get("name").and_then(text) {
        return Some(name);
    }

    for (first, last) in [("given", "family"), ("firstName", "lastName"), ("first", "last")] {
        if map.contains_key(first) || map.contains_key(last) {
            let joined = format!(
                "{} {}",
                map.get(first).and_then(text).unwrap_or_default(),
                map.get(last).and_then(text).unwrap_or_default()
            );
            if let Some(name) = clean(&joined) {
                return Some(name);
            }
        }
    }

    ["$", "display_name", "author", "authname"]
        .iter()
        .find_map(|key| map.get(*key).and_then(text))
}

fn affiliation_from_object(map: &serde_json::Map<String, Value>) -> Option<String> {
    ["affiliation", "affiliations", "institutions"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(first_affiliation)
}

fn first_affiliation(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(s),
        Value::Array(items) => items.iter().find_map(first_affiliation),
        Value::Object(map) => ["name", "display_name", "affilname"]
            .iter()
            .find_map(|key| map.get(*key).and_then(text)),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_str().and_then(clean)
}

fn clean(s: &str) -> Option<String> {
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(s)
    }
}
