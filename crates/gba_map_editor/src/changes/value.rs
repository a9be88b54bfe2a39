//! Property edits addressed by dotted paths into the header record

use super::{Change, ChangeKind, History, Preparation};
use crate::session::SessionData;
use crate::ChangeError;
use serde_json::{Map, Value};
use std::fmt;

/// A dotted path such as `"header.music"`.
/// Numeric segments index into arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuePath(Vec<String>);

impl ValuePath {
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Read the value at this path, `None` when any segment is missing
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Write `value` at this path, creating missing objects on the way.
    /// Writing `None` removes the entry.
    pub fn set(&self, root: &mut Value, value: Option<Value>) -> Result<(), ChangeError> {
        let Some((last, parents)) = self.0.split_last() else {
            *root = value.unwrap_or(Value::Null);
            return Ok(());
        };

        let mut current = root;
        for segment in parents {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| self.blocked(segment))?,
                _ => return Err(self.blocked(segment)),
            };
        }

        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        match (current, value) {
            (Value::Object(map), Some(value)) => {
                map.insert(last.clone(), value);
            }
            (Value::Object(map), None) => {
                map.remove(last);
            }
            (Value::Array(items), value) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| self.blocked(last))?;
                *slot = value.unwrap_or(Value::Null);
            }
            _ => return Err(self.blocked(last)),
        }
        Ok(())
    }

    fn blocked(&self, segment: &str) -> ChangeError {
        ChangeError::PathBlocked {
            path: self.to_string(),
            segment: segment.to_string(),
        }
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for ValuePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Sets one value in the header record
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub path: ValuePath,
    pub prev: Option<Value>,
    pub next: Option<Value>,
}

impl ValueChange {
    pub fn new(path: impl Into<ValuePath>, next: Value) -> Self {
        Self {
            path: path.into(),
            prev: None,
            next: Some(next),
        }
    }

    pub(super) fn prepare(
        &mut self,
        timestamp_ms: u64,
        history: &History<'_>,
        data: &SessionData,
    ) -> Preparation {
        self.prev = self.path.get(&data.header).cloned();
        if self.prev == self.next {
            return Preparation::Discard;
        }

        // Merge with a recent edit of the same path into one undo step
        if let Some(Change {
            timestamp_ms: previous_ts,
            kind: ChangeKind::Value(previous),
            ..
        }) = history.previous
        {
            if previous.path == self.path
                && timestamp_ms.saturating_sub(*previous_ts) < history.coalesce_window_ms
                && history.len > 1
            {
                self.prev = previous.prev.clone();
                return Preparation::Coalesce;
            }
        }
        Preparation::Ready
    }

    pub(super) fn apply(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        self.path.set(&mut data.header, self.next.clone())
    }

    pub(super) fn revert(&self, data: &mut SessionData) -> Result<(), ChangeError> {
        self.path.set(&mut data.header, self.prev.clone())
    }
}
