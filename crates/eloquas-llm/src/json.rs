// Pull a JSON object out of model output. JSON mode usually returns a bare
// object, but fallbacks and reasoning models wrap it in fences or prose.

use serde::de::DeserializeOwned;

use crate::client::LlmError;

/// Locate the first complete JSON object in `response`.
///
/// Tries, in order: a ```json fence, a bare fence whose body is an object,
/// and finally the first balanced `{...}` span (string- and escape-aware).
pub fn extract_json(response: &str) -> Option<&str> {
    if let Some(body) = fenced_body(response, "```json") {
        return first_object(body);
    }
    if let Some(body) = fenced_body(response, "```") {
        if let Some(obj) = first_object(body) {
            return Some(obj);
        }
    }
    first_object(response)
}

/// Extract and deserialize the JSON object in `response`.
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, LlmError> {
    let raw = extract_json(response)
        .ok_or_else(|| LlmError::InvalidJson("no JSON object in response".to_string()))?;
    serde_json::from_str(raw).map_err(|e| LlmError::InvalidJson(e.to_string()))
}

/// Body between an opening fence marker (skipping the rest of its line) and
/// the next closing fence.
fn fenced_body<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let body_start = rest.find('\n').map(|nl| nl + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// The first balanced `{...}` span in `text`.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            b'{' => depth += 1,
            b'}' => {
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
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        total: u32,
    }

    #[test]
    fn bare_object() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn json_fence() {
        let text = "Here you go:\n```json\n{\"a\": {\"b\": 2}}\n```\nThanks";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn generic_fence() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn object_embedded_in_prose_with_trailing_text() {
        let text = "Sure! {\"note\": \"a } inside\", \"n\": {\"x\": 1}} trailing {junk}";
        assert_eq!(
            extract_json(text),
            Some("{\"note\": \"a } inside\", \"n\": {\"x\": 1}}")
        );
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let text = r#"{"quote": "she said \"}\" loudly"}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn unbalanced_or_missing_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"a\": 1"), None);
    }

    #[test]
    fn parse_json_deserializes() {
        let score: Score = parse_json("```json\n{\"total\": 17}\n```").unwrap();
        assert_eq!(score, Score { total: 17 });
    }

    #[test]
    fn parse_json_reports_invalid_shape() {
        let err = parse_json::<Score>("{\"total\": \"high\"}").unwrap_err();
        assert!(matches!(err, LlmError::InvalidJson(_)));
    }
}
