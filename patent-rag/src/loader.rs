//! Loading and cleaning patent records from JSON and CSV exports.
//!
//! Sources disagree on field shapes: inventors arrive as a single string or
//! a list, dates in several formats, claims as a list or one block of text.
//! [`clean_patent`] folds all of that into a [`PatentDocument`].

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::document::{PatentDocument, PatentMetadata};
use crate::error::{RagError, Result};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CSV columns holding several values in one cell.
const CSV_LIST_FIELDS: &[&str] = &["inventors", "classification_codes", "claims"];
const CSV_LIST_SEPARATOR: char = ';';

/// Fields consumed by [`clean_patent`]; everything else scalar goes to `extra`.
const KNOWN_FIELDS: &[&str] = &[
    "id",
    "title",
    "abstract",
    "full_text",
    "description",
    "claims",
    "inventors",
    "assignee",
    "publication_date",
    "patent_number",
    "classification_codes",
];

/// Read a JSON file holding one patent object or an array of them.
///
/// # Errors
///
/// Returns [`RagError::Io`] if the file cannot be read and the errors of
/// [`parse_patents_json`] otherwise.
pub fn load_patents_json(path: impl AsRef<Path>) -> Result<Vec<PatentDocument>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let documents = parse_patents_json(&raw)?;
    info!(path = %path.display(), document_count = documents.len(), "loaded patents");
    Ok(documents)
}

/// Parse one patent object or an array of them, cleaning each record.
///
/// Records that cannot be cleaned are skipped with a warning.
///
/// # Errors
///
/// - [`RagError::Json`] for malformed JSON
/// - [`RagError::Validation`] if the top-level value is neither an object
///   nor an array
pub fn parse_patents_json(raw: &str) -> Result<Vec<PatentDocument>> {
    let value: Value = serde_json::from_str(raw)?;
    let records = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        _ => {
            return Err(RagError::Validation(
                "patent JSON must be an object or an array of objects".to_string(),
            ));
        }
    };

    let total = records.len();
    let documents: Vec<PatentDocument> = records.iter().filter_map(clean_patent).collect();
    if documents.len() < total {
        warn!(skipped = total - documents.len(), total, "skipped unusable patent records");
    }
    Ok(documents)
}

/// Read a CSV file with a header row, one patent per line.
///
/// Column names are the field names [`clean_patent`] understands. The
/// `inventors`, `classification_codes` and `claims` cells may hold several
/// values separated by `;`. Rows that cannot be cleaned are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`RagError::Csv`] if the file cannot be opened or a row is
/// malformed.
pub fn load_patents_csv(path: impl AsRef<Path>) -> Result<Vec<PatentDocument>> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let documents = parse_patents_csv(reader)?;
    info!(path = %path.display(), document_count = documents.len(), "loaded patents");
    Ok(documents)
}

/// Clean every row of a CSV reader.
fn parse_patents_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<PatentDocument>> {
    let headers = reader.headers()?.clone();
    let mut total = 0;
    let mut documents = Vec::new();
    for row in reader.records() {
        let row = row?;
        total += 1;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.to_string(), csv_cell(header, cell)))
            .collect();
        documents.extend(clean_patent(&Value::Object(fields)));
    }
    if documents.len() < total {
        warn!(skipped = total - documents.len(), total, "skipped unusable patent rows");
    }
    Ok(documents)
}

fn csv_cell(header: &str, cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else if CSV_LIST_FIELDS.contains(&header) && cell.contains(CSV_LIST_SEPARATOR) {
        Value::Array(cell.split(CSV_LIST_SEPARATOR).map(|s| Value::String(s.to_string())).collect())
    } else {
        Value::String(cell.to_string())
    }
}

/// Clean one raw patent record.
///
/// Strings are trimmed, inventors normalised to a list and the publication
/// date parsed from any supported format. The full text is `full_text`, or
/// else `description` followed by the claims.
///
/// Returns `None`, with a warning, for records that are not objects or that
/// lack an `id`, a `title` or any text to index.
pub fn clean_patent(raw: &Value) -> Option<PatentDocument> {
    let Some(fields) = raw.as_object() else {
        warn!("skipping patent record that is not a JSON object");
        return None;
    };

    let id = text(fields, "id");
    let title = text(fields, "title");
    let (Some(id), Some(title)) = (id, title) else {
        let raw_id = fields.get("id").and_then(scalar).unwrap_or_default();
        warn!(id = %raw_id, "skipping patent with missing required fields");
        return None;
    };

    let full_text = text(fields, "full_text").or_else(|| {
        let parts: Vec<String> =
            text(fields, "description").into_iter().chain(claims(fields.get("claims"))).collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    });
    let Some(full_text) = full_text else {
        warn!(document.id = %id, "skipping patent without description, claims or full text");
        return None;
    };

    let publication_date = fields.get("publication_date").and_then(|v| {
        let parsed = v.as_str().and_then(parse_date);
        if parsed.is_none() && !v.is_null() {
            warn!(document.id = %id, value = %v, "ignoring unparseable publication date");
        }
        parsed
    });

    let metadata = PatentMetadata {
        inventors: string_list(fields.get("inventors")),
        assignee: text(fields, "assignee"),
        publication_date,
        patent_number: text(fields, "patent_number"),
        classification_codes: string_list(fields.get("classification_codes")),
        extra: fields
            .iter()
            .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
            .filter_map(|(key, value)| scalar(value).map(|v| (key.clone(), v)))
            .collect(),
    };

    let abstract_text = text(fields, "abstract").unwrap_or_default();
    Some(PatentDocument::new(id, title, full_text).with_abstract(abstract_text).with_metadata(metadata))
}

/// Parse a date in any of the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok().map(|dt| dt.date()))
}

/// A trimmed, non-empty string field.
fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(scalar).filter(|s| !s.is_empty())
}

/// Render a scalar as a trimmed string. Objects, arrays and null yield `None`.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A string or a list of strings, trimmed, without blanks.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() { Vec::new() } else { vec![s.to_string()] }
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Claims as one block, from a string or a list.
fn claims(value: Option<&Value>) -> Option<String> {
    let claims = string_list(value);
    (!claims.is_empty()).then(|| claims.join("\n"))
}
