//! Result formatting: raw records to the normalized `FormMatch` shape.
//!
//! Upstream extraction quality varies, so every metadata key is optional
//! here. Defaults: title falls back to the form code and then to
//! "Untitled form"; topic/form code/effective date default to absent;
//! languages default to empty; mandatory defaults to false.

use formscout_types::query::FormMatch;
use formscout_types::record::ScoredRecord;
use serde_json::{Map, Value};

/// Translation markers the source site appends to titles. Stripped from
/// display titles; the structured language list lives in metadata.
pub const LANGUAGE_MARKERS: [&str; 4] = ["汉语", "한국어", "español", "Tiếng Việt"];

/// Fallback display title when a record carries no usable title at all.
pub const UNTITLED: &str = "Untitled form";

/// Strip translation markers and the mandatory-form asterisk from a raw
/// title, collapsing the leftover whitespace.
pub fn normalize_title(raw: &str) -> String {
    let mut title = raw.to_string();
    for marker in LANGUAGE_MARKERS {
        title = title.replace(marker, " ");
    }
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('*').trim().to_string()
}

fn metadata_str(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn metadata_string_list(metadata: &Map<String, Value>, key: &str) -> Vec<String> {
    metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Map a scored record to the normalized result shape.
pub fn to_form_match(scored: &ScoredRecord) -> FormMatch {
    let metadata = &scored.record.metadata;

    let form_code = metadata_str(metadata, "form_code");
    let raw_title = metadata_str(metadata, "form_title").or_else(|| metadata_str(metadata, "title"));
    let title = raw_title
        .as_deref()
        .map(normalize_title)
        .filter(|t| !t.is_empty())
        .or_else(|| form_code.clone())
        .unwrap_or_else(|| UNTITLED.to_string());

    FormMatch {
        title,
        form_code,
        topic: metadata_str(metadata, "topic"),
        url: scored.record.locator.clone(),
        content: scored.record.content.clone(),
        similarity: scored.similarity,
        effective_date: metadata_str(metadata, "effective_date"),
        languages: metadata_string_list(metadata, "languages"),
        mandatory: metadata
            .get("mandatory")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_record;
    use serde_json::json;

    #[test]
    fn test_normalize_title_strips_language_markers() {
        let raw = "Petition—Marriage/Domestic Partnership (Family Law) 汉语 한국어 español Tiếng Việt";
        assert_eq!(
            normalize_title(raw),
            "Petition—Marriage/Domestic Partnership (Family Law)"
        );
    }

    #[test]
    fn test_normalize_title_strips_mandatory_asterisk() {
        assert_eq!(normalize_title("Summons (Family Law)*"), "Summons (Family Law)");
    }

    #[test]
    fn test_normalize_title_collapses_whitespace() {
        assert_eq!(normalize_title("  Request   for\nOrder  "), "Request for Order");
    }

    #[test]
    fn test_normalize_title_plain_passthrough() {
        assert_eq!(
            normalize_title("Income and Expense Declaration"),
            "Income and Expense Declaration"
        );
    }

    #[test]
    fn test_to_form_match_full_metadata() {
        let record = make_record(
            "https://example.test/forms/fl100",
            0,
            "Petition for Dissolution FL-100",
            &[
                ("form_code", json!("FL-100")),
                ("form_title", json!("Petition for Dissolution español")),
                ("topic", json!("divorce")),
                ("effective_date", json!("January 1, 2023")),
                ("languages", json!(["español", "한국어"])),
                ("mandatory", json!(true)),
            ],
        );
        let result = to_form_match(&ScoredRecord {
            record,
            similarity: 0.72,
        });

        assert_eq!(result.title, "Petition for Dissolution");
        assert_eq!(result.form_code.as_deref(), Some("FL-100"));
        assert_eq!(result.topic.as_deref(), Some("divorce"));
        assert_eq!(result.url, "https://example.test/forms/fl100");
        assert_eq!(result.languages, vec!["español", "한국어"]);
        assert!(result.mandatory);
        assert!((result.similarity - 0.72).abs() < f32::EPSILON);
    }

    #[test]
    fn test_to_form_match_title_falls_back_to_form_code() {
        let record = make_record(
            "https://example.test/forms/dv100",
            0,
            "content",
            &[("form_code", json!("DV-100"))],
        );
        let result = to_form_match(&ScoredRecord {
            record,
            similarity: 0.5,
        });
        assert_eq!(result.title, "DV-100");
    }

    #[test]
    fn test_to_form_match_empty_metadata_uses_defaults() {
        let record = make_record("https://example.test/forms", 0, "bare content", &[]);
        let result = to_form_match(&ScoredRecord {
            record,
            similarity: 0.4,
        });

        assert_eq!(result.title, UNTITLED);
        assert!(result.form_code.is_none());
        assert!(result.topic.is_none());
        assert!(result.effective_date.is_none());
        assert!(result.languages.is_empty());
        assert!(!result.mandatory);
        assert_eq!(result.content, "bare content");
    }

    #[test]
    fn test_to_form_match_ignores_wrongly_typed_metadata() {
        let record = make_record(
            "https://example.test/forms",
            0,
            "content",
            &[
                ("form_code", json!(42)),
                ("languages", json!("not a list")),
                ("mandatory", json!("yes")),
            ],
        );
        let result = to_form_match(&ScoredRecord {
            record,
            similarity: 0.4,
        });
        assert!(result.form_code.is_none());
        assert!(result.languages.is_empty());
        assert!(!result.mandatory);
    }
}
