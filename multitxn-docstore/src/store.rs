use crate::{Document, DocumentSession, Filter, FindOptions};
use multitxn_core::{Backend, Error, Result};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

/// Field holding the identifier of every document.
pub const ID_FIELD: &str = "_id";

pub(crate) struct Stored {
    /// Insertion order, documents are returned in this order unless sorted.
    pub(crate) seq: u64,
    /// Commit that last wrote the document.
    pub(crate) version: u64,
    pub(crate) document: Document,
}

pub(crate) type Collection = HashMap<String, Stored>;

#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) collections: HashMap<String, Collection>,
    pub(crate) version: u64,
}

impl StoreState {
    pub(crate) fn get(&self, collection: &str, id: &str) -> Option<&Stored> {
        self.collections.get(collection).and_then(|v| v.get(id))
    }
}

#[derive(Default)]
struct StoreShared {
    state: RwLock<StoreState>,
    next_seq: AtomicU64,
}

/// In memory document database.
///
/// Clones share the same data. Writes go through a [`DocumentSession`] and become visible
/// atomically when the session commits.
#[derive(Clone, Default)]
pub struct DocumentStore(Arc<StoreShared>);

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> DocumentSession {
        DocumentSession::new(self.clone())
    }

    pub fn collections(&self) -> Vec<String> {
        let mut result = self.read().collections.keys().cloned().collect::<Vec<_>>();
        result.sort();
        result
    }

    /// Committed documents of `collection` matching `filter`.
    pub fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let state = self.read();
        let Some(documents) = state.collections.get(collection) else {
            return Vec::new();
        };
        select(
            documents.values().map(|v| (v.seq, &v.document)),
            filter,
            options,
        )
    }

    pub fn find_one(&self, collection: &str, filter: &Filter) -> Option<Document> {
        self.find(collection, filter, &FindOptions::default().limit(1))
            .pop()
    }

    pub fn count(&self, collection: &str, filter: &Filter) -> usize {
        self.read()
            .collections
            .get(collection)
            .map(|v| v.values().filter(|v| filter.matches(&v.document)).count())
            .unwrap_or_default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.0.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.0.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.0.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Validate the documents touched by the session against the current data, then apply
    /// every buffered write under the same lock.
    pub(crate) fn apply(&self, session: DocumentSession) -> Result<()> {
        let (observed, pending) = session.into_parts();
        let mut state = self.write();
        for ((collection, id), version) in &observed {
            let current = state.get(collection, id).map(|v| v.version);
            if current == *version {
                continue;
            }
            let error = match version {
                None => Error::msg(format!(
                    "E11000 duplicate key error collection: {} {}: \"{}\"",
                    collection, ID_FIELD, id
                )),
                Some(..) => Error::msg(format!(
                    "Write conflict on document `{}` of collection `{}`, it was changed by another transaction",
                    id, collection
                )),
            };
            log::error!("{:#}", error);
            return Err(error);
        }
        state.version += 1;
        let version = state.version;
        let mut written = 0;
        for (name, documents) in pending {
            let collection = state.collections.entry(name).or_default();
            for (id, write) in documents {
                written += 1;
                match write.document {
                    Some(document) => {
                        collection.insert(
                            id,
                            Stored {
                                seq: write.seq,
                                version,
                                document,
                            },
                        );
                    }
                    None => {
                        collection.remove(&id);
                    }
                }
            }
        }
        log::debug!(
            "Document store version {} applied {} writes",
            version,
            written
        );
        Ok(())
    }
}

/// Filter, order (insertion order by default) and truncate.
pub(crate) fn select<'a>(
    documents: impl Iterator<Item = (u64, &'a Document)>,
    filter: &Filter,
    options: &FindOptions,
) -> Vec<Document> {
    let mut matching = documents
        .filter(|(_, v)| filter.matches(v))
        .collect::<Vec<_>>();
    matching.sort_by_key(|(seq, _)| *seq);
    if let Some(sort) = &options.sort {
        matching.sort_by(|(_, a), (_, b)| sort.compare(a, b));
    }
    matching
        .into_iter()
        .take(options.limit.unwrap_or(usize::MAX))
        .map(|(_, v)| v.clone())
        .collect()
}

impl Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("DocumentStore")
            .field("version", &state.version)
            .field(
                "collections",
                &state
                    .collections
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

impl Backend for DocumentStore {
    type Transaction = DocumentSession;

    const KIND: &'static str = "document";

    async fn begin(&self) -> Result<DocumentSession> {
        Ok(self.session())
    }

    async fn commit(&self, session: DocumentSession) -> Result<()> {
        self.apply(session)
    }

    async fn rollback(&self, session: DocumentSession) -> Result<()> {
        log::debug!(
            "Document session discarded {} pending writes",
            session.pending_writes()
        );
        Ok(())
    }
}
