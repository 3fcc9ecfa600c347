//! Composite tag queries.
//!
//! Every filter is optional and filters combine with AND. A query with no
//! filters returns every tag.

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::{contains_pattern, SearchEngine};
use crate::store::crud::query_tags;
use crate::store::schema::TIMESTAMP_FORMAT;
use crate::store::{Result, StoredTag};

/// Conjunctive filter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagQuery {
    /// Exact category.
    pub category: Option<String>,
    pub identifier_contains: Option<String>,
    pub file_contains: Option<String>,
    pub description_contains: Option<String>,
    /// Inclusive line bounds.
    pub min_line: Option<u32>,
    pub max_line: Option<u32>,
    /// Inclusive creation-time bounds, `YYYY-MM-DD HH:MM:SS.mmm`.
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub limit: Option<usize>,
}

impl TagQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn identifier_contains(mut self, text: impl Into<String>) -> Self {
        self.identifier_contains = Some(text.into());
        self
    }

    pub fn file_contains(mut self, text: impl Into<String>) -> Self {
        self.file_contains = Some(text.into());
        self
    }

    pub fn description_contains(mut self, text: impl Into<String>) -> Self {
        self.description_contains = Some(text.into());
        self
    }

    pub fn lines(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_line = min;
        self.max_line = max;
        self
    }

    pub fn created_after(mut self, ts: NaiveDateTime) -> Self {
        self.created_after = Some(ts.format(TIMESTAMP_FORMAT).to_string());
        self
    }

    pub fn created_before(mut self, ts: NaiveDateTime) -> Self {
        self.created_before = Some(ts.format(TIMESTAMP_FORMAT).to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.clauses().0.is_empty()
    }

    /// WHERE clauses and their bound values, in order.
    fn clauses(&self) -> (Vec<String>, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        let mut push = |sql: &str, value: Value| {
            values.push(value);
            clauses.push(sql.replace('?', &format!("?{}", values.len())));
        };

        if let Some(cat) = &self.category {
            push("category = ?", Value::Text(cat.clone()));
        }
        if let Some(text) = &self.identifier_contains {
            push(r"identifier LIKE ? ESCAPE '\'", Value::Text(contains_pattern(text)));
        }
        if let Some(text) = &self.file_contains {
            push(r"file_path LIKE ? ESCAPE '\'", Value::Text(contains_pattern(text)));
        }
        if let Some(text) = &self.description_contains {
            push(r"description LIKE ? ESCAPE '\'", Value::Text(contains_pattern(text)));
        }
        if let Some(min) = self.min_line {
            push("line_number >= ?", Value::Integer(min as i64));
        }
        if let Some(max) = self.max_line {
            push("line_number <= ?", Value::Integer(max as i64));
        }
        if let Some(ts) = &self.created_after {
            push("created_at >= ?", Value::Text(ts.clone()));
        }
        if let Some(ts) = &self.created_before {
            push("created_at <= ?", Value::Text(ts.clone()));
        }

        (clauses, values)
    }

    /// SQL tail (after `FROM tags`) and parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let (clauses, values) = self.clauses();
        let mut tail = String::new();
        if !clauses.is_empty() {
            tail.push_str("WHERE ");
            tail.push_str(&clauses.join(" AND "));
            tail.push(' ');
        }
        tail.push_str("ORDER BY created_at, id");
        if let Some(limit) = self.limit {
            tail.push_str(&format!(" LIMIT {limit}"));
        }
        (tail, values)
    }
}

impl SearchEngine<'_> {
    /// Run a composite query.
    pub fn search(&self, query: &TagQuery) -> Result<Vec<StoredTag>> {
        let (tail, values) = query.to_sql();
        self.store()
            .with_conn(|conn| query_tags(conn, &tail, rusqlite::params_from_iter(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TagStore;
    use chrono::{Duration, Utc};

    fn seeded() -> TagStore {
        let store = TagStore::in_memory().unwrap();
        store
            .insert_tag("REQ", "AUTH-001", Some("User login"), "docs/req.md", 3)
            .unwrap();
        store
            .insert_tag("REQ", "PAY-001", Some("Refunds"), "docs/req.md", 40)
            .unwrap();
        store
            .insert_tag("TASK", "AUTH-002", Some("login form"), "src/ui/login.rs", 8)
            .unwrap();
        store
    }

    #[test]
    fn test_empty_query_returns_all() {
        let store = seeded();
        let q = TagQuery::new();
        assert!(q.is_unfiltered());
        assert_eq!(SearchEngine::new(&store).search(&q).unwrap().len(), 3);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let store = seeded();
        let search = SearchEngine::new(&store);

        let q = TagQuery::new().category("REQ").description_contains("login");
        let found = search.search(&q).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, "AUTH-001");

        let q = TagQuery::new().identifier_contains("AUTH").file_contains("src/");
        assert_eq!(search.search(&q).unwrap().len(), 1);

        let q = TagQuery::new().lines(Some(5), Some(40));
        assert_eq!(search.search(&q).unwrap().len(), 2);

        let q = TagQuery::new().category("REQ").limit(1);
        assert_eq!(search.search(&q).unwrap().len(), 1);
    }

    #[test]
    fn test_created_bounds() {
        let store = seeded();
        let search = SearchEngine::new(&store);
        let now = Utc::now().naive_utc();

        let q = TagQuery::new().created_after(now - Duration::hours(1));
        assert_eq!(search.search(&q).unwrap().len(), 3);

        let q = TagQuery::new().created_before(now - Duration::hours(1));
        assert!(search.search(&q).unwrap().is_empty());
    }

    #[test]
    fn test_sql_numbering() {
        let (tail, values) = TagQuery::new()
            .category("REQ")
            .lines(Some(1), None)
            .to_sql();
        assert_eq!(
            tail,
            "WHERE category = ?1 AND line_number >= ?2 ORDER BY created_at, id"
        );
        assert_eq!(values.len(), 2);
    }
}
