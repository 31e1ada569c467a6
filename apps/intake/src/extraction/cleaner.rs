//! Response cleaner: reduces raw model output to a single JSON object candidate.
//!
//! Order of operations:
//! 1. strip the first reasoning region (`<think>...</think>`, case-insensitive)
//! 2. unwrap a Markdown code fence if one is present
//! 3. brace-balance scan for the first complete outermost `{...}`

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Opening marker of a reasoning region.
pub const REASONING_OPEN: &str = "<think>";
/// Closing marker of a reasoning region.
pub const REASONING_CLOSE: &str = "</think>";

fn reasoning_region() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            "(?is){}.*?{}",
            regex::escape(REASONING_OPEN),
            regex::escape(REASONING_CLOSE)
        );
        Regex::new(&pattern).expect("reasoning region pattern is a valid regex")
    })
}

/// Returns the candidate JSON object text, or `None` if the output holds no
/// balanced object.
pub fn clean(raw: &str) -> Option<String> {
    let stripped = strip_reasoning_region(raw);
    let unfenced = unwrap_code_fence(&stripped);

    extract_json_object(unfenced)
        .or_else(|| extract_json_object(&stripped))
        .map(str::to_string)
}

/// Removes only the first reasoning region, markers included. Later regions
/// are left in place.
pub fn strip_reasoning_region(text: &str) -> Cow<'_, str> {
    reasoning_region().replacen(text, 1, "")
}

/// Returns the body of the first fenced code block (optionally tagged
/// `json`), or the input unchanged when there is no closed fence.
pub fn unwrap_code_fence(text: &str) -> &str {
    const FENCE: &str = "```";

    let Some(open) = text.find(FENCE) else {
        return text;
    };
    let after_open = &text[open + FENCE.len()..];
    let body = match after_open.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &after_open[4..],
        _ => after_open,
    };

    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => text,
    }
}

/// Finds the first complete outermost `{...}` span by tracking brace depth.
/// Stray `}` before any `{` are ignored; scanning stops at the first span
/// that closes, so trailing content is never inspected.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, ch) in text.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_nested_object_from_prose() {
        let input = r#"prefix {"a": {"b": 1}} suffix"#;
        assert_eq!(extract_json_object(input), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn test_only_first_object_is_returned() {
        let input = r#"{"first": 1} and then {"second": 2}"#;
        assert_eq!(extract_json_object(input), Some(r#"{"first": 1}"#));
    }

    #[test]
    fn test_unbalanced_input_yields_none() {
        assert_eq!(extract_json_object(r#"{"a": {"b": 1}"#), None);
        assert_eq!(clean("no json here at all"), None);
        assert_eq!(clean("} stray close {"), None);
    }

    #[test]
    fn test_stray_close_before_object_is_ignored() {
        assert_eq!(extract_json_object(r#"} {"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_multibyte_text_around_object() {
        let input = "Résumé → {\"city\": \"Zürich\"} ✓";
        assert_eq!(extract_json_object(input), Some("{\"city\": \"Zürich\"}"));
    }

    #[test]
    fn test_strips_reasoning_region_before_scanning() {
        let input = r#"<think>maybe {"wrong": true}</think> Here: {"title": "SRE"} done"#;
        assert_eq!(clean(input).as_deref(), Some(r#"{"title": "SRE"}"#));
    }

    #[test]
    fn test_reasoning_markers_are_case_insensitive_and_multiline() {
        let input = "<THINK>line one\n{oops}\nline two</Think>{\"a\": 1}";
        assert_eq!(strip_reasoning_region(input), "{\"a\": 1}");
    }

    #[test]
    fn test_only_first_reasoning_region_is_stripped() {
        let input = "<think>one</think>x<think>two</think>y";
        assert_eq!(strip_reasoning_region(input), "x<think>two</think>y");
    }

    #[test]
    fn test_unclosed_reasoning_region_is_left_alone() {
        let input = "<think>still thinking {\"a\": 1}";
        assert_eq!(strip_reasoning_region(input), input);
        assert_eq!(clean(input).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_unwraps_json_fence() {
        let input = "Sure!\n```json\n{\"a\": 1}\n```\nanything else";
        assert_eq!(unwrap_code_fence(input), "{\"a\": 1}");
    }

    #[test]
    fn test_unwraps_untagged_fence() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(unwrap_code_fence(input), "{\"a\": 1}");
    }

    #[test]
    fn test_unclosed_fence_returns_input() {
        let input = "```json\n{\"a\": 1}";
        assert_eq!(unwrap_code_fence(input), input);
        assert_eq!(clean(input).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_fence_without_object_falls_back_to_full_text() {
        let input = "```bash\nls -la\n``` then {\"a\": 1}";
        assert_eq!(clean(input).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_full_pipeline_input() {
        let input = "Thinking...<think>reasoning noise</think>\n```json\n{\"title\": \"Backend Engineer\", \"company\": \"Acme\", \"skills\": \"Python, SQL\"}\n```far 10%; err unused";
        assert_eq!(
            clean(input).as_deref(),
            Some(r#"{"title": "Backend Engineer", "company": "Acme", "skills": "Python, SQL"}"#)
        );
    }

    #[test]
    fn test_clean_is_idempotent() {
        let input = "<think>x</think>\n```json\n{\"a\": {\"b\": [1, 2]}}\n```";
        let once = clean(input).unwrap();
        let twice = clean(&once).unwrap();
        assert_eq!(once, twice);
    }
}
