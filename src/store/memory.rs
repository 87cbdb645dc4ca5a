use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use crate::store::{
    lookup, Aggregation, Collection, DocumentStore, Filter, GroupCount, Patch, Sort, SortOrder,
    StoreError,
};

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    doc: Value,
}

/// `(collection, field, encoded value)` of a value claimed through `insert_unique`.
type UniqueKey = (Collection, String, String);

/// Process-local document store. Documents keep their insertion sequence, so
/// unsorted reads come back in insertion order.
pub struct InMemoryStore {
    collections: HashMap<Collection, DashMap<String, StoredDoc>>,
    /// Claimed unique values, mapped to the id of the holding document.
    unique_keys: DashMap<UniqueKey, String>,
    next_seq: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Collection::ALL
                .into_iter()
                .map(|collection| (collection, DashMap::new()))
                .collect(),
            unique_keys: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn collection(&self, collection: Collection) -> Result<&DashMap<String, StoredDoc>, StoreError> {
        self.collections
            .get(&collection)
            .ok_or_else(|| StoreError::Backend(format!("unknown collection {}", collection.name())))
    }

    /// Matching documents with their keys, in insertion order.
    fn scan(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<(String, StoredDoc)>, StoreError> {
        let mut matched: Vec<(String, StoredDoc)> = self
            .collection(collection)?
            .iter()
            .filter(|entry| filter.matches(&entry.value().doc))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matched.sort_by_key(|(_, stored)| stored.seq);
        Ok(matched)
    }

    fn put(&self, collection: Collection, doc: Value) -> Result<String, StoreError> {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingId)?
            .to_string();

        match self.collection(collection)?.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredDoc { seq, doc });
                Ok(id)
            }
        }
    }
}

fn duplicate_key(field: &str, value: &Value) -> StoreError {
    StoreError::DuplicateKey {
        field: field.to_string(),
        value: value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut matched = self.scan(collection, filter)?;
        if let Some(sort) = sort {
            // Ties fall back to insertion order in the requested direction.
            matched.sort_by(|(_, a), (_, b)| {
                let seq = match sort.order {
                    SortOrder::Ascending => a.seq.cmp(&b.seq),
                    SortOrder::Descending => b.seq.cmp(&a.seq),
                };
                sort.compare(&a.doc, &b.doc).then(seq)
            });
        }
        Ok(matched.into_iter().map(|(_, stored)| stored.doc).collect())
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .scan(collection, filter)?
            .into_iter()
            .next()
            .map(|(_, stored)| stored.doc))
    }

    async fn insert_one(&self, collection: Collection, doc: Value) -> Result<String, StoreError> {
        self.put(collection, doc)
    }

    async fn insert_unique(
        &self,
        collection: Collection,
        doc: Value,
        unique_field: &str,
    ) -> Result<String, StoreError> {
        let value = lookup(&doc, unique_field)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| StoreError::MissingKey(unique_field.to_string()))?;
        let key = (collection, unique_field.to_string(), value.to_string());

        // The index slot stays locked until the document is stored, so racing
        // inserts of the same value serialize here.
        match self.unique_keys.entry(key) {
            Entry::Occupied(_) => Err(duplicate_key(unique_field, &value)),
            Entry::Vacant(slot) => {
                // Documents written through plain `insert_one` never claimed a slot.
                let holder = Filter::new().eq(unique_field, value.clone());
                if !self.scan(collection, &holder)?.is_empty() {
                    return Err(duplicate_key(unique_field, &value));
                }
                let id = self.put(collection, doc)?;
                slot.insert(id.clone());
                Ok(id)
            }
        }
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        let docs = self.collection(collection)?;
        for (key, _) in self.scan(collection, filter)? {
            // Re-check under the entry lock so conditional updates stay atomic.
            if let Some(mut entry) = docs.get_mut(&key) {
                if filter.matches(&entry.doc) {
                    patch.apply(&mut entry.doc);
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let docs = self.collection(collection)?;
        for (key, _) in self.scan(collection, filter)? {
            if docs
                .remove_if(&key, |_, stored| filter.matches(&stored.doc))
                .is_some()
            {
                self.unique_keys
                    .retain(|(owner, _, _), id| *owner != collection || *id != key);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn aggregate(
        &self,
        collection: Collection,
        aggregation: &Aggregation,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let mut groups: Vec<GroupCount> = Vec::new();
        for (_, stored) in self.scan(collection, &aggregation.filter)? {
            let key = lookup(&stored.doc, &aggregation.group_by)
                .cloned()
                .unwrap_or(Value::Null);
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.count += 1,
                None => groups.push(GroupCount { key, count: 1 }),
            }
        }
        Ok(groups)
    }
}
