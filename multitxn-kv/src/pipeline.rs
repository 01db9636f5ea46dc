use crate::{Command, KvStore};

/// Transaction of a [`KvStore`]: commands queued here take effect only when the pipeline commits.
///
/// Every queue method returns the position of the command in the batch.
#[derive(Debug)]
pub struct Pipeline {
    store: KvStore,
    commands: Vec<Command>,
}

impl Pipeline {
    pub(crate) fn new(store: KvStore) -> Self {
        Self {
            store,
            commands: Vec::new(),
        }
    }

    /// Store the pipeline belongs to, reads on it see committed data only.
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn push(&mut self, command: Command) -> usize {
        log::trace!("Pipeline queued {}", command);
        self.commands.push(command);
        self.commands.len() - 1
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> usize {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::Del { key: key.into() })
    }

    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> usize {
        self.push(Command::IncrBy {
            key: key.into(),
            delta,
        })
    }

    pub fn rpush<V: Into<String>>(
        &mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> usize {
        self.push(Command::RPush {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn lpush<V: Into<String>>(
        &mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> usize {
        self.push(Command::LPush {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn lpop(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::LPop { key: key.into() })
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
