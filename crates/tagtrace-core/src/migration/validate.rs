//! Structural validation of flat index documents.
//!
//! Runs on the raw JSON value so that every problem is reported with its
//! location (`index.REQ:A1.0.line`), not just the first one serde hits.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::tags::{is_storage_category, parse_tag_key};

/// Default minimum identifier length.
pub const DEFAULT_MIN_IDENTIFIER_LENGTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingField,
    InvalidType,
    InvalidKey,
    UnknownCategory,
    IdentifierTooShort,
    InvalidEntry,
    InvalidReference,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidType => "invalid_type",
            Self::InvalidKey => "invalid_key",
            Self::UnknownCategory => "unknown_category",
            Self::IdentifierTooShort => "identifier_too_short",
            Self::InvalidEntry => "invalid_entry",
            Self::InvalidReference => "invalid_reference",
        }
    }
}

/// One structural problem in a flat index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// Dotted path into the document.
    pub location: String,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.location, self.message)
    }
}

/// Strict-mode validator.
#[derive(Debug, Clone)]
pub struct FlatIndexValidator {
    pub min_identifier_length: usize,
}

impl Default for FlatIndexValidator {
    fn default() -> Self {
        Self {
            min_identifier_length: DEFAULT_MIN_IDENTIFIER_LENGTH,
        }
    }
}

impl FlatIndexValidator {
    pub fn new(min_identifier_length: usize) -> Self {
        Self {
            min_identifier_length,
        }
    }

    /// Collect every problem in the document. Empty means valid.
    pub fn validate(&self, value: &Value) -> Vec<ValidationError> {
        use ValidationErrorKind::*;
        let mut errors = Vec::new();

        let Some(root) = value.as_object() else {
            errors.push(ValidationError::new(InvalidType, "$", "root must be an object"));
            return errors;
        };

        match root.get("version") {
            None => errors.push(ValidationError::new(MissingField, "version", "required field missing")),
            Some(Value::String(_)) => {}
            Some(_) => errors.push(ValidationError::new(InvalidType, "version", "must be a string")),
        }

        if let Some(stats) = root.get("statistics") {
            self.check_statistics(stats, &mut errors);
        }

        match root.get("index") {
            None => errors.push(ValidationError::new(MissingField, "index", "required field missing")),
            Some(Value::Object(index)) => self.check_index(index, &mut errors),
            Some(_) => errors.push(ValidationError::new(InvalidType, "index", "must be an object")),
        }

        match root.get("references") {
            None => {}
            Some(Value::Object(refs)) => self.check_references(refs, &mut errors),
            Some(_) => errors.push(ValidationError::new(InvalidType, "references", "must be an object")),
        }

        errors
    }

    fn check_statistics(&self, stats: &Value, errors: &mut Vec<ValidationError>) {
        use ValidationErrorKind::*;
        let Some(stats) = stats.as_object() else {
            errors.push(ValidationError::new(InvalidType, "statistics", "must be an object"));
            return;
        };
        if let Some(total) = stats.get("total_tags") {
            if total.as_u64().is_none() {
                errors.push(ValidationError::new(
                    InvalidType,
                    "statistics.total_tags",
                    "must be a non-negative integer",
                ));
            }
        }
        if let Some(cats) = stats.get("categories") {
            if !cats.is_object() {
                errors.push(ValidationError::new(
                    InvalidType,
                    "statistics.categories",
                    "must be an object",
                ));
            }
        }
    }

    /// Validate a `CATEGORY:IDENTIFIER` key. Returns false if it has errors.
    fn check_key(&self, key: &str, location: &str, errors: &mut Vec<ValidationError>) -> bool {
        use ValidationErrorKind::*;
        let Some(parsed) = parse_tag_key(key) else {
            errors.push(ValidationError::new(
                InvalidKey,
                location,
                format!("'{key}' is not of the form CATEGORY:IDENTIFIER"),
            ));
            return false;
        };
        let mut ok = true;
        if !is_storage_category(&parsed.category) {
            errors.push(ValidationError::new(
                UnknownCategory,
                location,
                format!("unknown category '{}'", parsed.category),
            ));
            ok = false;
        }
        if parsed.identifier.chars().count() < self.min_identifier_length {
            errors.push(ValidationError::new(
                IdentifierTooShort,
                location,
                format!(
                    "identifier '{}' shorter than {} characters",
                    parsed.identifier, self.min_identifier_length
                ),
            ));
            ok = false;
        }
        ok
    }

    fn check_index(&self, index: &Map<String, Value>, errors: &mut Vec<ValidationError>) {
        use ValidationErrorKind::*;

        for (key, entries) in index {
            let base = format!("index.{key}");
            self.check_key(key, &base, errors);

            let Some(list) = entries.as_array() else {
                errors.push(ValidationError::new(InvalidType, &base, "entries must be an array"));
                continue;
            };
            if list.is_empty() {
                errors.push(ValidationError::new(InvalidEntry, &base, "no entries"));
            }

            for (i, entry) in list.iter().enumerate() {
                let loc = format!("{base}.{i}");
                let Some(obj) = entry.as_object() else {
                    errors.push(ValidationError::new(InvalidEntry, &loc, "entry must be an object"));
                    continue;
                };

                match obj.get("file") {
                    None => errors.push(ValidationError::new(MissingField, format!("{loc}.file"), "required field missing")),
                    Some(Value::String(_)) => {}
                    Some(_) => errors.push(ValidationError::new(InvalidType, format!("{loc}.file"), "must be a string")),
                }
                match obj.get("line") {
                    None => errors.push(ValidationError::new(MissingField, format!("{loc}.line"), "required field missing")),
                    Some(v) if v.as_u64().is_some() => {}
                    Some(_) => errors.push(ValidationError::new(
                        InvalidType,
                        format!("{loc}.line"),
                        "must be a non-negative integer",
                    )),
                }
                match obj.get("context") {
                    None => errors.push(ValidationError::new(MissingField, format!("{loc}.context"), "required field missing")),
                    Some(Value::String(_)) => {}
                    Some(_) => errors.push(ValidationError::new(InvalidType, format!("{loc}.context"), "must be a string")),
                }
            }
        }
    }

    fn check_references(&self, refs: &Map<String, Value>, errors: &mut Vec<ValidationError>) {
        use ValidationErrorKind::*;

        for (source, targets) in refs {
            let base = format!("references.{source}");
            if parse_tag_key(source).is_none() {
                errors.push(ValidationError::new(
                    InvalidReference,
                    &base,
                    format!("source '{source}' is not a tag key"),
                ));
            }
            let Some(list) = targets.as_array() else {
                errors.push(ValidationError::new(InvalidType, &base, "targets must be an array"));
                continue;
            };
            for (i, target) in list.iter().enumerate() {
                let loc = format!("{base}.{i}");
                match target.as_str() {
                    Some(t) if parse_tag_key(t).is_some() => {}
                    Some(t) => errors.push(ValidationError::new(
                        InvalidReference,
                        loc,
                        format!("target '{t}' is not a tag key"),
                    )),
                    None => errors.push(ValidationError::new(InvalidType, loc, "target must be a string")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_document() {
        let doc = json!({
            "version": "1.0",
            "statistics": { "total_tags": 1, "categories": { "primary": 1 } },
            "index": {
                "REQ:A1": [{ "file": "a.md", "line": 3, "context": "@REQ:A1 x" }],
                "CUSTOM:XY": [{ "file": "b.md", "line": 0, "context": "" }]
            },
            "references": { "REQ:A1": ["CUSTOM:XY"] }
        });
        assert!(FlatIndexValidator::default().validate(&doc).is_empty());
    }

    #[test]
    fn test_missing_version_and_index() {
        let errors = FlatIndexValidator::default().validate(&json!({}));
        assert_eq!(
            kinds(&errors),
            vec![ValidationErrorKind::MissingField, ValidationErrorKind::MissingField]
        );
        assert_eq!(errors[0].location, "version");
        assert_eq!(errors[1].location, "index");
    }

    #[test]
    fn test_bad_keys() {
        let doc = json!({
            "version": "1.0",
            "index": {
                "NOCOLON": [{ "file": "a", "line": 1, "context": "" }],
                "WHAT:AB": [{ "file": "a", "line": 1, "context": "" }],
                "REQ:A": [{ "file": "a", "line": 1, "context": "" }]
            }
        });
        let errors = FlatIndexValidator::default().validate(&doc);
        let k = kinds(&errors);
        assert!(k.contains(&ValidationErrorKind::InvalidKey));
        assert!(k.contains(&ValidationErrorKind::UnknownCategory));
        assert!(k.contains(&ValidationErrorKind::IdentifierTooShort));
        assert_eq!(errors.len(), 3);

        assert!(FlatIndexValidator::new(1)
            .validate(&json!({ "version": "1", "index": { "REQ:A": [{ "file": "a", "line": 1, "context": "" }] } }))
            .is_empty());
    }

    #[test]
    fn test_entry_fields() {
        let doc = json!({
            "version": "1.0",
            "index": {
                "REQ:A1": [
                    { "line": 1, "context": "" },
                    { "file": "a", "line": -4, "context": 5 },
                    "nope"
                ],
                "REQ:B1": []
            }
        });
        let errors = FlatIndexValidator::default().validate(&doc);
        let locations: Vec<&str> = errors.iter().map(|e| e.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "index.REQ:A1.0.file",
                "index.REQ:A1.1.line",
                "index.REQ:A1.1.context",
                "index.REQ:A1.2",
                "index.REQ:B1",
            ]
        );
    }

    #[test]
    fn test_references() {
        let doc = json!({
            "version": "1.0",
            "index": {},
            "references": { "bad": ["REQ:A1", "worse", 3], "REQ:A1": "x" }
        });
        let errors = FlatIndexValidator::default().validate(&doc);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| e.location.starts_with("references.")));
    }
}
