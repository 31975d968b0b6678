//! Abstract handling: inverted-index reconstruction and markup stripping.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Largest word position accepted in an inverted index
pub const MAX_ABSTRACT_POSITION: u32 = 100_000;

/// Rebuild an abstract from a word → positions inverted index
///
/// Words are placed at every listed position of an array sized to the
/// largest position and the array is joined with single spaces. Positions
/// nobody claims stay empty strings, so a gap shows up as a double space.
/// Returns `None` for an empty index, or one whose largest position exceeds
/// [`MAX_ABSTRACT_POSITION`] or ten times the number of positions listed.
pub fn reconstruct_abstract(index: &BTreeMap<String, Vec<u32>>) -> Option<String> {
    let max = index.values().flatten().copied().max()?;
    let listed: usize = index.values().map(Vec::len).sum();
    if max > MAX_ABSTRACT_POSITION || max as usize > listed.saturating_mul(10) {
        tracing::warn!(
            "Dropping inverted-index abstract: position {} with only {} words listed",
            max,
            listed
        );
        return None;
    }
    let mut words = vec![""; max as usize + 1];

    for (word, positions) in index {
        for &pos in positions {
            words[pos as usize] = word.as_str();
        }
    }

    let text = words.join(" ");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Reconstruct from a raw JSON value, ignoring malformed entries
pub fn reconstruct_from_value(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let index: BTreeMap<String, Vec<u32>> = map
        .iter()
        .map(|(word, positions)| {
            let positions = positions
                .as_array()
                .map(|ps| {
                    ps.iter()
                        .filter_map(|p| p.as_u64())
                        .filter_map(|p| u32::try_from(p).ok())
                        .collect()
                })
                .unwrap_or_default();
            (word.clone(), positions)
        })
        .collect();

    reconstruct_abstract(&index)
}

fn markup_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").ok()).as_ref()
}

/// Strip JATS/HTML tags and collapse whitespace
pub fn strip_markup(text: &str) -> Option<String> {
    let stripped = match markup_pattern() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = collapsed
        .strip_prefix("Abstract ")
        .map(str::to_string)
        .unwrap_or(collapsed);

    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reconstruct_preserves_word_order() {
        let mut index = BTreeMap::new();
        index.insert("the".to_string(), vec![0, 2]);
        index.insert("fox".to_string(), vec![1]);

        assert_eq!(reconstruct_abstract(&index).as_deref(), Some("the fox the"));
    }

    #[test]
    fn test_reconstruct_from_json() {
        let value = json!({
            "Despite": [0],
            "growing": [1],
            "interest": [2],
            "in": [3, 5],
            "Open": [4]
        });
        assert_eq!(
            reconstruct_from_value(&value).as_deref(),
            Some("Despite growing interest in Open in")
        );
    }

    #[test]
    fn test_reconstruct_keeps_gaps() {
        let value = json!({"a": [0], "c": [2]});
        assert_eq!(reconstruct_from_value(&value).as_deref(), Some("a  c"));
    }

    #[test]
    fn test_reconstruct_empty_index() {
        assert_eq!(reconstruct_abstract(&BTreeMap::new()), None);
        assert_eq!(reconstruct_from_value(&json!({})), None);
        assert_eq!(reconstruct_from_value(&json!(null)), None);
        assert_eq!(reconstruct_from_value(&json!({"word": []})), None);
    }

    #[test]
    fn test_reconstruct_rejects_runaway_positions() {
        assert_eq!(reconstruct_from_value(&json!({"word": [4294967295u64]})), None);
        assert_eq!(reconstruct_from_value(&json!({"a": [0], "b": [100_001]})), None);
        // sparse beyond ten slots per listed word
        assert_eq!(reconstruct_from_value(&json!({"a": [0], "b": [50]})), None);
        assert!(reconstruct_from_value(&json!({"a": [0], "b": [19]})).is_some());
    }

    #[test]
    fn test_strip_jats_markup() {
        let jats = "<jats:title>Abstract</jats:title><jats:p>Warming   is\n <jats:italic>real</jats:italic>.</jats:p>";
        assert_eq!(strip_markup(jats).as_deref(), Some("Warming is real ."));
        assert_eq!(strip_markup("<p> </p>"), None);
    }
}
