use crate::{Document, DocumentStore, Filter, FindOptions, ID_FIELD, store::select};
use multitxn_core::{Error, Result};
use serde_json::Value as Json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct PendingWrite {
    pub(crate) seq: u64,
    /// `None` deletes the document.
    pub(crate) document: Option<Document>,
}

pub(crate) type DocumentKey = (String, String);

/// Transaction of a [`DocumentStore`].
///
/// Writes are buffered until commit, reads see the committed documents overlaid with the writes
/// of this session.
pub struct DocumentSession {
    store: DocumentStore,
    pending: HashMap<String, HashMap<String, PendingWrite>>,
    /// Version of each touched document when the session first touched it, `None` if missing.
    observed: HashMap<DocumentKey, Option<u64>>,
}

impl DocumentSession {
    pub(crate) fn new(store: DocumentStore) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            observed: HashMap::new(),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.values().map(HashMap::len).sum()
    }

    /// Insert a JSON object, a missing `_id` is generated. Returns the stored document.
    pub fn insert_one(&mut self, collection: &str, document: Json) -> Result<Document> {
        let mut document = match document {
            Json::Object(v) => v,
            other => {
                return Err(Error::msg(format!(
                    "Cannot insert a non object document into `{}`: {}",
                    collection, other
                )));
            }
        };
        let id = match document.get(ID_FIELD) {
            None => Uuid::new_v4().to_string(),
            Some(Json::String(id)) => id.clone(),
            Some(other) => {
                return Err(Error::msg(format!(
                    "Field `{}` must be a string, found {}",
                    ID_FIELD, other
                )));
            }
        };
        if self.get(collection, &id).is_some() {
            let error = Error::msg(format!(
                "E11000 duplicate key error collection: {} {}: \"{}\"",
                collection, ID_FIELD, id
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        document.insert(ID_FIELD.into(), Json::String(id.clone()));
        let seq = self.seq_of(collection, &id);
        self.write(collection, id, seq, Some(document.clone()));
        Ok(document)
    }

    /// All or nothing: nothing is inserted if any document is rejected.
    pub fn insert_many(
        &mut self,
        collection: &str,
        documents: impl IntoIterator<Item = Json>,
    ) -> Result<Vec<Document>> {
        let pending = self.pending.get(collection).cloned();
        let observed = self.observed.clone();
        let mut result = Vec::new();
        for document in documents {
            match self.insert_one(collection, document) {
                Ok(v) => result.push(v),
                Err(e) => {
                    match pending {
                        Some(v) => self.pending.insert(collection.into(), v),
                        None => self.pending.remove(collection),
                    };
                    self.observed = observed;
                    return Err(e);
                }
            }
        }
        Ok(result)
    }

    pub fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let state = self.store.read();
        let pending = self.pending.get(collection);
        let committed = state
            .collections
            .get(collection)
            .into_iter()
            .flat_map(|v| v.iter())
            .filter(|(id, _)| pending.is_none_or(|p| !p.contains_key(*id)))
            .map(|(_, v)| (v.seq, &v.document));
        let written = pending
            .into_iter()
            .flat_map(|v| v.values())
            .filter_map(|v| v.document.as_ref().map(|d| (v.seq, d)));
        select(committed.chain(written), filter, options)
    }

    pub fn find_one(&self, collection: &str, filter: &Filter) -> Option<Document> {
        self.find(collection, filter, &FindOptions::default().limit(1))
            .pop()
    }

    pub fn count(&self, collection: &str, filter: &Filter) -> usize {
        self.find(collection, filter, &FindOptions::default()).len()
    }

    /// Merge the fields of `set` into every matching document, returns how many were modified.
    pub fn update_many(&mut self, collection: &str, filter: &Filter, set: Json) -> Result<u64> {
        let set = match set {
            Json::Object(v) => v,
            other => {
                return Err(Error::msg(format!(
                    "The update of `{}` must be an object of fields: {}",
                    collection, other
                )));
            }
        };
        if set.contains_key(ID_FIELD) {
            return Err(Error::msg(format!(
                "Field `{}` is immutable and cannot be updated",
                ID_FIELD
            )));
        }
        let matching = self.find(collection, filter, &FindOptions::default());
        for mut document in matching.iter().cloned() {
            let id = document_id(&document)?;
            document.extend(set.clone());
            let seq = self.seq_of(collection, &id);
            self.write(collection, id, seq, Some(document));
        }
        Ok(matching.len() as u64)
    }

    pub fn delete_many(&mut self, collection: &str, filter: &Filter) -> Result<u64> {
        let matching = self.find(collection, filter, &FindOptions::default());
        for document in &matching {
            let id = document_id(document)?;
            let seq = self.seq_of(collection, &id);
            self.write(collection, id, seq, None);
        }
        Ok(matching.len() as u64)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        HashMap<DocumentKey, Option<u64>>,
        HashMap<String, HashMap<String, PendingWrite>>,
    ) {
        (self.observed, self.pending)
    }

    /// Current view of one document.
    fn get(&self, collection: &str, id: &str) -> Option<Document> {
        if let Some(write) = self.pending.get(collection).and_then(|v| v.get(id)) {
            return write.document.clone();
        }
        self.store
            .read()
            .get(collection, id)
            .map(|v| v.document.clone())
    }

    fn seq_of(&self, collection: &str, id: &str) -> u64 {
        if let Some(write) = self.pending.get(collection).and_then(|v| v.get(id)) {
            return write.seq;
        }
        let committed = self.store.read().get(collection, id).map(|v| v.seq);
        committed.unwrap_or_else(|| self.store.next_seq())
    }

    fn write(&mut self, collection: &str, id: String, seq: u64, document: Option<Document>) {
        let key = (collection.to_string(), id);
        if !self.observed.contains_key(&key) {
            let version = self.store.read().get(collection, &key.1).map(|v| v.version);
            self.observed.insert(key.clone(), version);
        }
        self.pending
            .entry(key.0)
            .or_default()
            .insert(key.1, PendingWrite { seq, document });
    }
}

fn document_id(document: &Document) -> Result<String> {
    document
        .get(ID_FIELD)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::msg(format!("Document without `{}`", ID_FIELD)))
}
