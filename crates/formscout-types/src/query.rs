//! Query result types.
//!
//! `FormMatch` is the normalized shape a retrieval query returns: one entry
//! per record that cleared the similarity threshold, with display fields
//! derived from the record's open metadata mapping.

use serde::{Deserialize, Serialize};

/// One retrieval result, normalized for presentation.
///
/// All metadata-derived fields are optional upstream; the facade fills in
/// the documented defaults (empty strings/lists, `false` for flags) so
/// consumers never have to re-read the raw mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormMatch {
    /// Display title with translation markers stripped. Falls back to the
    /// form code, then to "Untitled form".
    pub title: String,
    /// Canonical form identifier (e.g. "FL-100"), if extraction found one.
    pub form_code: Option<String>,
    /// Originating topic/category (e.g. "divorce"), if known.
    pub topic: Option<String>,
    /// Source page address (the record's locator).
    pub url: String,
    /// Raw record content that was embedded.
    pub content: String,
    /// Cosine similarity to the query, in `[0, 1]` after threshold
    /// filtering.
    pub similarity: f32,
    /// Effective date string as extracted, if any.
    pub effective_date: Option<String>,
    /// Translations available for this form.
    pub languages: Vec<String>,
    /// Whether the form is mandatory (the site's asterisk marker).
    pub mandatory: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_match_serde_roundtrip() {
        let result = FormMatch {
            title: "Petition for Dissolution".into(),
            form_code: Some("FL-100".into()),
            topic: Some("divorce".into()),
            url: "https://example.test/forms/fl100".into(),
            content: "Petition for Dissolution FL-100".into(),
            similarity: 0.83,
            effective_date: Some("January 1, 2023".into()),
            languages: vec!["español".into()],
            mandatory: true,
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: FormMatch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.form_code.as_deref(), Some("FL-100"));
        assert!((parsed.similarity - 0.83).abs() < f32::EPSILON);
        assert!(parsed.mandatory);
    }
}
