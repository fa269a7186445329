// Context - the per-instance variable store of a guided workflow

//! # Workflow Context
//!
//! Every workflow instance owns one `Context`: a map from a logical field name
//! (`"NewConcept"`, `"Supertype"`, ...) to a `(uid, value)` pair. The uid is
//! either a real knowledge-graph uid or a provisional one; the value is the
//! display name.
//!
//! ## Partial Updates
//!
//! Fields are frequently filled in two phases: the user types a name first,
//! and the knowledge-graph uid arrives later from a lookup. A `ContextUpdate`
//! therefore carries only what the caller knows, and [`Context::set`] keeps
//! existing non-null uids and non-empty values the update leaves out.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::fact::Uid;

/// One context slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextEntry {
    pub uid: Option<Uid>,
    #[serde(default)]
    pub value: String,
}

impl ContextEntry {
    pub fn new(uid: Option<Uid>, value: impl Into<String>) -> Self {
        ContextEntry {
            uid,
            value: value.into(),
        }
    }

    /// Resolved means a non-null uid and a non-empty value
    pub fn is_resolved(&self) -> bool {
        self.uid.is_some() && !self.value.is_empty()
    }
}

/// A partial write to one context slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextUpdate {
    #[serde(default)]
    pub uid: Option<Uid>,
    #[serde(default)]
    pub value: Option<String>,
}

impl ContextUpdate {
    pub fn uid(uid: Uid) -> Self {
        ContextUpdate {
            uid: Some(uid),
            value: None,
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        ContextUpdate {
            uid: None,
            value: Some(value.into()),
        }
    }

    pub fn both(uid: Uid, value: impl Into<String>) -> Self {
        ContextUpdate {
            uid: Some(uid),
            value: Some(value.into()),
        }
    }
}

/// Field name → entry, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: IndexMap<String, ContextEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ContextEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a fresh entry, replacing whatever was there
    ///
    /// Only used while an instance is being started; later writes go through
    /// [`Context::set`].
    pub fn insert(&mut self, key: impl Into<String>, entry: ContextEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Merge a partial update into `key`, creating the entry if needed
    ///
    /// A `Some` uid and a non-empty value overwrite; anything the update omits
    /// is preserved. Returns the entry as it stands after the merge.
    pub fn set(&mut self, key: &str, update: ContextUpdate) -> &ContextEntry {
        let entry = self.entries.entry(key.to_string()).or_default();
        if let Some(uid) = update.uid {
            entry.uid = Some(uid);
        }
        if let Some(value) = update.value.filter(|v| !v.is_empty()) {
            entry.value = value;
        }
        entry
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ContextEntry)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, ContextEntry)>>(iter: I) -> Self {
        Context {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
