use multitxn_core::{Error, Result, Value};
use std::{
    collections::VecDeque,
    fmt::{self, Display},
};

/// Value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    String(String),
    List(VecDeque<String>),
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::String(..) => "string",
            Entry::List(..) => "list",
        }
    }
}

pub(crate) fn wrong_type() -> Error {
    Error::msg("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn wrong_arity(command: &str) -> Error {
    Error::msg(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

/// Command queued on a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Del { key: String },
    IncrBy { key: String, delta: i64 },
    RPush { key: String, values: Vec<String> },
    LPush { key: String, values: Vec<String> },
    LPop { key: String },
}

impl Command {
    pub fn key(&self) -> &str {
        match self {
            Command::Set { key, .. }
            | Command::Del { key }
            | Command::IncrBy { key, .. }
            | Command::RPush { key, .. }
            | Command::LPush { key, .. }
            | Command::LPop { key } => key,
        }
    }

    /// Apply to the current content of the key, `None` when the key is missing. Returns the reply.
    pub(crate) fn apply(self, slot: &mut Option<Entry>) -> Result<Value> {
        match self {
            Command::Set { value, .. } => {
                *slot = Some(Entry::String(value));
                Ok("OK".into())
            }
            Command::Del { .. } => Ok(Value::from(slot.take().is_some() as i64)),
            Command::IncrBy { delta, .. } => {
                let current = match slot {
                    None => 0,
                    Some(Entry::String(v)) => v.parse::<i64>().map_err(|_| {
                        Error::msg("ERR value is not an integer or out of range")
                    })?,
                    Some(Entry::List(..)) => return Err(wrong_type()),
                };
                let value = current
                    .checked_add(delta)
                    .ok_or_else(|| Error::msg("ERR increment or decrement would overflow"))?;
                *slot = Some(Entry::String(value.to_string()));
                Ok(value.into())
            }
            Command::RPush { values, .. } => {
                if values.is_empty() {
                    return Err(wrong_arity("rpush"));
                }
                let list = list_of(slot)?;
                list.extend(values);
                Ok(Value::from(list.len() as i64))
            }
            Command::LPush { values, .. } => {
                if values.is_empty() {
                    return Err(wrong_arity("lpush"));
                }
                let list = list_of(slot)?;
                for value in values {
                    list.push_front(value);
                }
                Ok(Value::from(list.len() as i64))
            }
            Command::LPop { .. } => {
                let result = match slot {
                    None => None,
                    Some(Entry::List(list)) => list.pop_front(),
                    Some(Entry::String(..)) => return Err(wrong_type()),
                };
                if matches!(slot, Some(Entry::List(list)) if list.is_empty()) {
                    *slot = None;
                }
                Ok(result.into())
            }
        }
    }
}

fn list_of(slot: &mut Option<Entry>) -> Result<&mut VecDeque<String>> {
    match slot.get_or_insert_with(|| Entry::List(VecDeque::new())) {
        Entry::List(list) => Ok(list),
        Entry::String(..) => Err(wrong_type()),
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Set { key, .. } => write!(f, "SET {}", key),
            Command::Del { key } => write!(f, "DEL {}", key),
            Command::IncrBy { key, delta } => write!(f, "INCRBY {} {}", key, delta),
            Command::RPush { key, values } => write!(f, "RPUSH {} ({} values)", key, values.len()),
            Command::LPush { key, values } => write!(f, "LPUSH {} ({} values)", key, values.len()),
            Command::LPop { key } => write!(f, "LPOP {}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_commands() {
        let mut slot = None;
        let push = Command::RPush {
            key: "q".into(),
            values: vec!["a".into(), "b".into()],
        };
        assert_eq!(push.apply(&mut slot).unwrap(), Value::Int64(2));
        let push = Command::LPush {
            key: "q".into(),
            values: vec!["x".into(), "y".into()],
        };
        assert_eq!(push.apply(&mut slot).unwrap(), Value::Int64(4));
        assert_eq!(
            slot,
            Some(Entry::List(VecDeque::from(["y", "x", "a", "b"].map(String::from))))
        );
        for expected in ["y", "x", "a", "b"] {
            let pop = Command::LPop { key: "q".into() };
            assert_eq!(pop.apply(&mut slot).unwrap(), Value::from(expected));
        }
        assert_eq!(slot, None);
        let pop = Command::LPop { key: "q".into() };
        assert_eq!(pop.apply(&mut slot).unwrap(), Value::Null);
    }

    #[test]
    fn empty_push_leaves_the_key_missing() {
        let mut slot = None;
        let push = Command::RPush {
            key: "q".into(),
            values: Vec::new(),
        };
        let error = push.apply(&mut slot).unwrap_err();
        assert!(error.to_string().contains("wrong number of arguments"));
        assert_eq!(slot, None);
        let push = Command::LPush {
            key: "q".into(),
            values: Vec::new(),
        };
        assert!(push.apply(&mut slot).is_err());
        assert_eq!(slot, None);
    }

    #[test]
    fn increments() {
        let mut slot = None;
        let incr = |delta| Command::IncrBy {
            key: "n".into(),
            delta,
        };
        assert_eq!(incr(5).apply(&mut slot).unwrap(), Value::Int64(5));
        assert_eq!(incr(-7).apply(&mut slot).unwrap(), Value::Int64(-2));
        let mut text = Some(Entry::String("abc".into()));
        assert!(incr(1).apply(&mut text).is_err());
        let mut max = Some(Entry::String(i64::MAX.to_string()));
        assert!(incr(1).apply(&mut max).is_err());
        let mut list = Some(Entry::List(VecDeque::new()));
        let error = incr(1).apply(&mut list).unwrap_err();
        assert!(error.to_string().starts_with("WRONGTYPE"));
    }
}
