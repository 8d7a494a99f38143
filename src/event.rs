// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change notification emitted once per inventory commit.
//!
//! A [`ChangeEvent`] carries full snapshots of created objects, per-attribute
//! diffs of changed objects and the ids of deleted objects. Its JSON form is:
//!
//! ```json
//! {
//!   "commit_id": 42,
//!   "created": [{"object_id": 7, "servertype": "record", "hostname": "www.example.com",
//!                "attributes": {"domain": "example.com", "mx": "10 mail.example.com"}}],
//!   "changed": {"8": {"intern_ip": {"action": "update", "old": "10.0.0.1", "new": "10.0.0.2"},
//!                     "records": {"action": "multi", "add": ["www.example.com"], "remove": []}}},
//!   "deleted": [9]
//! }
//! ```

use crate::inventory::{InventoryObject, ObjectId, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Diff of one attribute of a changed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AttributeDiff {
    /// Single-valued attribute changed from `old` to `new`; `None` means no value.
    Update {
        /// Previous value
        #[serde(default)]
        old: Option<Scalar>,
        /// Current value
        #[serde(default)]
        new: Option<Scalar>,
    },
    /// Multi-valued attribute gained `add` and lost `remove`.
    ///
    /// For the relation attribute the values are hostnames of related objects.
    Multi {
        /// Values added by the commit
        #[serde(default)]
        add: BTreeSet<Scalar>,
        /// Values removed by the commit
        #[serde(default)]
        remove: BTreeSet<Scalar>,
    },
}

impl AttributeDiff {
    /// Single-valued diff.
    #[must_use]
    pub fn update(old: Option<Scalar>, new: Option<Scalar>) -> Self {
        Self::Update { old, new }
    }

    /// Multi-valued diff.
    pub fn multi<A, R, V, W>(add: A, remove: R) -> Self
    where
        A: IntoIterator<Item = V>,
        R: IntoIterator<Item = W>,
        V: Into<Scalar>,
        W: Into<Scalar>,
    {
        Self::Multi {
            add: add.into_iter().map(Into::into).collect(),
            remove: remove.into_iter().map(Into::into).collect(),
        }
    }

    /// True if applying the diff changes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Update { old, new } => old == new,
            Self::Multi { add, remove } => add.is_empty() && remove.is_empty(),
        }
    }
}

/// Attribute diffs of one changed object, keyed by attribute name.
pub type ObjectChanges = BTreeMap<String, AttributeDiff>;

/// Notification describing everything one commit created, changed and deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Monotonic id of the commit; redeliveries carry the same id
    #[serde(default)]
    pub commit_id: u64,
    /// Full snapshots of created objects
    #[serde(default)]
    pub created: Vec<InventoryObject>,
    /// Attribute diffs of changed objects
    #[serde(default)]
    pub changed: BTreeMap<ObjectId, ObjectChanges>,
    /// Ids of deleted objects; these must never be queried
    #[serde(default)]
    pub deleted: BTreeSet<ObjectId>,
}

impl ChangeEvent {
    /// Empty event for a commit.
    #[must_use]
    pub fn new(commit_id: u64) -> Self {
        Self {
            commit_id,
            ..Self::default()
        }
    }

    /// True if the commit touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Parse an event from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the document does not describe an event.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
