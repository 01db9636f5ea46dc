use crate::{Command, Entry, Pipeline, command::wrong_type};
use anyhow::Context as _;
use multitxn_core::{Backend, Result, Value};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

/// In memory key-value store holding strings and lists.
///
/// Clones share the same data. Reads are immediate, writes are queued on a [`Pipeline`] and
/// applied all together when it commits.
#[derive(Clone, Default)]
pub struct KvStore(Arc<RwLock<HashMap<String, Entry>>>);

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.clone())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.read().get(key) {
            None => Ok(None),
            Some(Entry::String(v)) => Ok(Some(v.clone())),
            Some(Entry::List(..)) => Err(wrong_type()),
        }
    }

    /// Elements from `start` to `stop` inclusive, negative indexes count from the end of the list.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let state = self.read();
        let list = match state.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(v)) => v,
            Some(Entry::String(..)) => return Err(wrong_type()),
        };
        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list
            .range(start as usize..=stop as usize)
            .cloned()
            .collect())
    }

    pub fn llen(&self, key: &str) -> Result<usize> {
        match self.read().get(key) {
            None => Ok(0),
            Some(Entry::List(v)) => Ok(v.len()),
            Some(Entry::String(..)) => Err(wrong_type()),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every command against a staged copy of the keys they touch and publish the staged
    /// keys only if all of them succeeded.
    pub(crate) fn exec(&self, commands: Vec<Command>) -> Result<Vec<Value>> {
        let mut state = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged: HashMap<String, Option<Entry>> = HashMap::new();
        let mut replies = Vec::with_capacity(commands.len());
        for (i, command) in commands.into_iter().enumerate() {
            let description = command.to_string();
            let slot = staged
                .entry(command.key().to_string())
                .or_insert_with_key(|key| state.get(key).cloned());
            let reply = command.apply(slot).with_context(|| {
                format!("Command {} `{}` of the pipeline failed", i, description)
            });
            match reply {
                Ok(v) => replies.push(v),
                Err(e) => {
                    log::error!("{:#}", e);
                    return Err(e);
                }
            }
        }
        for (key, entry) in staged {
            match entry {
                Some(entry) => state.insert(key, entry),
                None => state.remove(&key),
            };
        }
        Ok(replies)
    }
}

impl Debug for KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStore")
            .field("keys", &self.read().len())
            .finish()
    }
}

impl Backend for KvStore {
    type Transaction = Pipeline;

    const KIND: &'static str = "kv";

    async fn begin(&self) -> Result<Pipeline> {
        Ok(self.pipeline())
    }

    async fn commit(&self, pipeline: Pipeline) -> Result<()> {
        let replies = self.exec(pipeline.into_commands())?;
        log::debug!("Key-value pipeline applied {} commands", replies.len());
        Ok(())
    }

    async fn rollback(&self, pipeline: Pipeline) -> Result<()> {
        log::debug!(
            "Key-value pipeline discarded {} commands",
            pipeline.len()
        );
        Ok(())
    }
}
