//! Structured search filters, applied after vector retrieval.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::PatentMetadata;

/// Structured constraints on resolved patent metadata.
///
/// Every set field must match for a result to be kept. Date bounds are
/// inclusive; a patent without a publication date fails any date bound.
/// Text comparisons ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Earliest publication date.
    pub published_after: Option<NaiveDate>,
    /// Latest publication date.
    pub published_before: Option<NaiveDate>,
    /// Exact assignee.
    pub assignee: Option<String>,
    /// One of the named inventors.
    pub inventor: Option<String>,
    /// Prefix of at least one classification code, e.g. `H04L`.
    pub classification_prefix: Option<String>,
    /// Exact values for source-specific fields.
    pub extra: BTreeMap<String, String>,
}

impl SearchFilters {
    /// An empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep patents published on or after `date`.
    pub fn published_after(mut self, date: NaiveDate) -> Self {
        self.published_after = Some(date);
        self
    }

    /// Keep patents published on or before `date`.
    pub fn published_before(mut self, date: NaiveDate) -> Self {
        self.published_before = Some(date);
        self
    }

    /// Keep patents owned by `assignee`.
    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Keep patents naming `inventor`.
    pub fn inventor(mut self, inventor: impl Into<String>) -> Self {
        self.inventor = Some(inventor.into());
        self
    }

    /// Keep patents with a classification code starting with `prefix`.
    pub fn classification_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.classification_prefix = Some(prefix.into());
        self
    }

    /// Keep patents whose `extra[key]` equals `value`.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether no constraint is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether `metadata` satisfies every constraint.
    pub fn matches(&self, metadata: &PatentMetadata) -> bool {
        let date = metadata.publication_date;
        if let Some(after) = self.published_after {
            if date.is_none_or(|d| d < after) {
                return false;
            }
        }
        if let Some(before) = self.published_before {
            if date.is_none_or(|d| d > before) {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if !metadata.assignee.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(assignee)) {
                return false;
            }
        }
        if let Some(inventor) = &self.inventor {
            if !metadata.inventors.iter().any(|i| i.eq_ignore_ascii_case(inventor)) {
                return false;
            }
        }
        if let Some(prefix) = &self.classification_prefix {
            let prefix = prefix.to_ascii_uppercase();
            if !metadata
                .classification_codes
                .iter()
                .any(|code| code.to_ascii_uppercase().starts_with(&prefix))
            {
                return false;
            }
        }
        self.extra.iter().all(|(key, value)| metadata.extra.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PatentMetadata {
        PatentMetadata {
            inventors: vec!["Jane Smith".into(), "John Doe".into()],
            assignee: Some("Tech Corp Inc.".into()),
            publication_date: NaiveDate::from_ymd_opt(2023, 1, 15),
            patent_number: Some("US10123456B2".into()),
            classification_codes: vec!["H04L 9/32".into(), "G06F 21/60".into()],
            extra: BTreeMap::from([("country".to_string(), "US".to_string())]),
        }
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(SearchFilters::new().is_empty());
        assert!(SearchFilters::new().matches(&PatentMetadata::default()));
    }

    #[test]
    fn date_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let f = SearchFilters::new().published_after(day).published_before(day);
        assert!(f.matches(&metadata()));

        let later = NaiveDate::from_ymd_opt(2023, 1, 16).unwrap();
        assert!(!SearchFilters::new().published_after(later).matches(&metadata()));
        assert!(!SearchFilters::new().published_after(day).matches(&PatentMetadata::default()));
    }

    #[test]
    fn text_fields_ignore_case() {
        assert!(SearchFilters::new().assignee("tech corp inc.").matches(&metadata()));
        assert!(SearchFilters::new().inventor("JOHN DOE").matches(&metadata()));
        assert!(SearchFilters::new().classification_prefix("g06f").matches(&metadata()));
        assert!(!SearchFilters::new().classification_prefix("A61K").matches(&metadata()));
    }

    #[test]
    fn extra_fields_must_match_exactly() {
        assert!(SearchFilters::new().extra("country", "US").matches(&metadata()));
        assert!(!SearchFilters::new().extra("country", "EP").matches(&metadata()));
        assert!(!SearchFilters::new().extra("kind", "B2").matches(&metadata()));
    }
}
