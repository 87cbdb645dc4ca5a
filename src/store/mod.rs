//! Document store boundary.
//!
//! Components talk to persistence through [`DocumentStore`], a collection of
//! JSON documents keyed by their `id` field. Each single-document write is
//! atomic; nothing spans two documents.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document has no string `id` field")]
    MissingId,

    #[error("duplicate document id: {0}")]
    DuplicateId(String),

    #[error("document has no value at unique field `{0}`")]
    MissingKey(String),

    #[error("duplicate value for unique field `{field}`: {value}")]
    DuplicateKey { field: String, value: String },

    #[error("document codec failure: {0}")]
    Codec(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Parcels,
    Payments,
    Users,
    Riders,
    TrackingEvents,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Parcels,
        Collection::Payments,
        Collection::Users,
        Collection::Riders,
        Collection::TrackingEvents,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Parcels => "parcels",
            Collection::Payments => "payments",
            Collection::Users => "users",
            Collection::Riders => "riders",
            Collection::TrackingEvents => "tracking_events",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    ContainsIgnoreCase(String),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Condition::Eq(expected) => value == expected,
            Condition::In(candidates) => candidates.iter().any(|c| c == value),
            Condition::ContainsIgnoreCase(needle) => value
                .as_str()
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
        }
    }
}

/// Conjunction of field conditions. Field names may be dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq("id", id.to_string())
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn eq_opt(self, field: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    pub fn one_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push((field.to_string(), Condition::In(values)));
        self
    }

    pub fn contains_ignore_case(mut self, field: &str, needle: &str) -> Self {
        self.conditions.push((
            field.to_string(),
            Condition::ContainsIgnoreCase(needle.to_string()),
        ));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(lookup(doc, field)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Descending,
        }
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(
            lookup(a, &self.field).unwrap_or(&Value::Null),
            lookup(b, &self.field).unwrap_or(&Value::Null),
        );
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// `$set`-style partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    set: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.insert(field.to_string(), value.into());
        self
    }

    pub fn apply(&self, doc: &mut Value) {
        for (field, value) in &self.set {
            assign(doc, field, value.clone());
        }
    }
}

/// Group-and-count over the documents matching `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub filter: Filter,
    pub group_by: String,
}

impl Aggregation {
    pub fn count_by(field: &str) -> Self {
        Self {
            filter: Filter::new(),
            group_by: field.to_string(),
        }
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupCount {
    pub key: Value,
    pub count: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn find_one(&self, collection: Collection, filter: &Filter)
        -> Result<Option<Value>, StoreError>;

    /// Inserts `doc` and returns its `id`.
    async fn insert_one(&self, collection: Collection, doc: Value) -> Result<String, StoreError>;

    /// Inserts `doc` unless another document in `collection` already holds the
    /// same value at `unique_field`. The check and the insert are one atomic step.
    async fn insert_unique(
        &self,
        collection: Collection,
        doc: Value,
        unique_field: &str,
    ) -> Result<String, StoreError>;

    /// Applies `patch` to the first document matching `filter`; returns the matched count.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError>;

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    async fn aggregate(
        &self,
        collection: Collection,
        aggregation: &Aggregation,
    ) -> Result<Vec<GroupCount>, StoreError>;
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::Codec(err.to_string()))
}

pub fn decode<T: DeserializeOwned>(doc: Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|err| StoreError::Codec(err.to_string()))
}

pub fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>, StoreError> {
    docs.into_iter().map(decode).collect()
}

pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

fn assign(doc: &mut Value, path: &str, value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Value::Object(map) = doc else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            assign(map.entry(head.to_string()).or_insert(Value::Null), rest, value);
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null sorts lowest, then by type, then by content.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filter_conditions_are_anded() {
        let doc = json!({ "created_by": "a@x.com", "payment_status": "paid" });

        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("created_by", "a@x.com").matches(&doc));
        assert!(
            !Filter::new()
                .eq("created_by", "a@x.com")
                .eq("payment_status", "unpaid")
                .matches(&doc)
        );
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let doc = json!({ "assigned_rider": { "email": "r@x.com" } });
        assert!(Filter::new().eq("assigned_rider.email", "r@x.com").matches(&doc));
        assert!(!Filter::new().eq("assigned_rider.name", "r").matches(&doc));
    }

    #[test]
    fn contains_ignore_case_matches_substrings() {
        let doc = json!({ "email": "Someone@Example.com" });
        assert!(Filter::new().contains_ignore_case("email", "example").matches(&doc));
        assert!(!Filter::new().contains_ignore_case("email", "other").matches(&doc));
    }

    #[test]
    fn patch_sets_nested_and_top_level_fields() {
        let mut doc = json!({ "status": "pending" });
        Patch::new()
            .set("status", "active")
            .set("meta.flag", true)
            .apply(&mut doc);
        assert_eq!(doc, json!({ "status": "active", "meta": { "flag": true } }));
    }

    #[test]
    fn descending_sort_places_nulls_last() {
        let sort = Sort::desc("at");
        let mut docs = vec![json!({ "at": null }), json!({ "at": "b" }), json!({ "at": "a" })];
        docs.sort_by(|a, b| sort.compare(a, b));
        assert_eq!(docs[0]["at"], "b");
        assert_eq!(docs[1]["at"], "a");
        assert!(docs[2]["at"].is_null());
    }
}
