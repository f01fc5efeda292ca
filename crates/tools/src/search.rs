//! URL extraction from `web_search` tool results.
//!
//! Search results arrive as nested JSON and are frequently truncated by the
//! per-tool result cap, so a structured parse cannot be relied on alone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct SearchResultOuter {
    #[serde(default)]
    content: Vec<SearchContent>,
    #[serde(default)]
    details: SearchDetails,
}

#[derive(Debug, Deserialize)]
struct SearchContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDetails {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResultInner {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Matches both unescaped (`"url": "https://..."`) and escaped
/// (`\"url\": \"https://...\"`) URL fields, for the regex fallback on
/// truncated JSON.
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:\\?"url\\?")\s*:\s*(?:\\?")(https?://[^"\\]+)"#)
        .expect("url pattern must compile")
});

/// Parse a `web_search` result string and return the ordered list of result
/// URLs. Three strategies are tried in order:
///
/// 1. Structured parse of `details.results[*].url` (present when the result
///    was not truncated).
/// 2. Structured parse of `content[0].text` as a nested JSON string.
/// 3. Regex scan over the raw text, which tolerates truncated JSON.
pub fn extract_search_urls(result: &str) -> Vec<String> {
    if let Ok(outer) = serde_json::from_str::<SearchResultOuter>(result) {
        let urls: Vec<String> = outer
            .details
            .results
            .iter()
            .filter(|hit| !hit.url.is_empty())
            .map(|hit| hit.url.clone())
            .collect();
        if !urls.is_empty() {
            return urls;
        }

        if let Some(first) = outer.content.first() {
            if !first.text.is_empty() {
                if let Ok(inner) = serde_json::from_str::<SearchResultInner>(&first.text) {
                    let urls: Vec<String> = inner
                        .results
                        .iter()
                        .filter(|hit| !hit.url.is_empty())
                        .map(|hit| hit.url.clone())
                        .collect();
                    if !urls.is_empty() {
                        return urls;
                    }
                }
            }
        }
    }

    // Fallback: scan raw bytes, de-duplicating while preserving order.
    let mut seen = std::collections::HashSet::new();
    URL_RE
        .captures_iter(result)
        .map(|caps| caps[1].to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_details_parse() {
        let result = r#"{
            "content": [{"type": "text", "text": ""}],
            "details": {"results": [
                {"url": "https://a.example/one"},
                {"url": "https://b.example/two"}
            ]}
        }"#;
        assert_eq!(
            extract_search_urls(result),
            ["https://a.example/one", "https://b.example/two"]
        );
    }

    #[test]
    fn nested_content_text_parse() {
        let inner = r#"{"results": [{"url": "https://nested.example/x"}]}"#;
        let result = serde_json::json!({
            "content": [{"type": "text", "text": inner}],
            "details": {"results": []}
        })
        .to_string();
        assert_eq!(extract_search_urls(&result), ["https://nested.example/x"]);
    }

    #[test]
    fn regex_fallback_on_truncated_json() {
        let result = r#"{"content": [{"text": "{\"results\": [{\"url\": \"https://t.example/a\"}, {\"url\": \"https://t.example/b\"}, {\"ti"#;
        assert_eq!(
            extract_search_urls(result),
            ["https://t.example/a", "https://t.example/b"]
        );
    }

    #[test]
    fn regex_fallback_dedups_preserving_order() {
        let result = r#""url": "https://x.example/1" "url": "https://x.example/1" "url": "https://x.example/2""#;
        assert_eq!(
            extract_search_urls(result),
            ["https://x.example/1", "https://x.example/2"]
        );
    }

    #[test]
    fn no_urls_yields_empty() {
        assert!(extract_search_urls("plain text with no links").is_empty());
        assert!(extract_search_urls(r#"{"details": {"results": []}}"#).is_empty());
    }
}
