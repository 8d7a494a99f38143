// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory inventory with a commit pipeline.
//!
//! [`MemoryInventory`] stores objects in process memory and implements the commit
//! protocol the reconciler relies on:
//!
//! 1. a [`Commit`] is validated and applied to a working copy,
//! 2. relation attributes are checked for referential integrity,
//! 3. one [`ChangeEvent`] describing the whole commit is built,
//! 4. the working copy is published and every subscriber is notified,
//! 5. if a subscriber fails, the previous objects are restored and the commit is
//!    rejected with the subscriber's error.
//!
//! Commits are serialized; queries issued by subscribers see the new state.

use super::{
    AttributeValue, ChangeSubscriber, InventoryObject, InventoryStore, ObjectId, Query, Scalar,
};
use crate::config::AttributeMapping;
use crate::constants::{ATTR_HOSTNAME, ATTR_OBJECT_ID, ATTR_SERVERTYPE};
use crate::dns_errors::{ReconcileError, ResolutionError};
use crate::event::{AttributeDiff, ChangeEvent, ObjectChanges};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Errors returned by [`MemoryInventory::commit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// The commit is malformed (unknown object, duplicate hostname, type mismatch)
    #[error("Validation failed: {reason}")]
    Validation {
        /// What is wrong
        reason: String,
    },

    /// A deleted object is still referenced through a relation attribute
    #[error("Cannot delete '{hostname}' because it is referenced by {referenced_by}")]
    Referenced {
        /// Hostname of the object that was to be deleted
        hostname: String,
        /// Hostnames of the referencing objects
        referenced_by: String,
    },

    /// A subscriber failed to apply the change; nothing was committed
    #[error("Commit rejected: {0}")]
    Rejected(#[from] ReconcileError),
}

#[derive(Debug, Clone)]
enum Operation {
    Create(InventoryObject),
    Set {
        object_id: ObjectId,
        attribute: String,
        value: Option<AttributeValue>,
    },
    Add {
        object_id: ObjectId,
        attribute: String,
        values: BTreeSet<Scalar>,
    },
    Remove {
        object_id: ObjectId,
        attribute: String,
        values: BTreeSet<Scalar>,
    },
    Delete(ObjectId),
}

/// A set of changes committed atomically.
///
/// ```rust
/// use pdns_sync::inventory::InventoryObject;
/// use pdns_sync::inventory::memory::Commit;
///
/// let commit = Commit::new()
///     .create(InventoryObject::new(1, "domain", "example.com"))
///     .set(2, "mx", "10 mail.example.com")
///     .add(3, "records", ["www.example.com"])
///     .delete(4);
/// assert_eq!(commit.len(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Commit {
    operations: Vec<Operation>,
}

impl Commit {
    /// Empty commit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True if the commit has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Create an object.
    #[must_use]
    pub fn create(mut self, object: InventoryObject) -> Self {
        self.operations.push(Operation::Create(object));
        self
    }

    /// Set an attribute (or the hostname) to a value.
    #[must_use]
    pub fn set(
        mut self,
        object_id: ObjectId,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.operations.push(Operation::Set {
            object_id,
            attribute: attribute.to_string(),
            value: Some(value.into()),
        });
        self
    }

    /// Remove an attribute's value.
    #[must_use]
    pub fn clear(mut self, object_id: ObjectId, attribute: &str) -> Self {
        self.operations.push(Operation::Set {
            object_id,
            attribute: attribute.to_string(),
            value: None,
        });
        self
    }

    /// Add values to a multi-valued attribute.
    #[must_use]
    pub fn add<I, V>(mut self, object_id: ObjectId, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.operations.push(Operation::Add {
            object_id,
            attribute: attribute.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Remove values from a multi-valued attribute.
    #[must_use]
    pub fn remove<I, V>(mut self, object_id: ObjectId, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.operations.push(Operation::Remove {
            object_id,
            attribute: attribute.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Delete an object.
    #[must_use]
    pub fn delete(mut self, object_id: ObjectId) -> Self {
        self.operations.push(Operation::Delete(object_id));
        self
    }
}

#[derive(Debug, Clone)]
struct Rename {
    servertype: String,
    old: String,
    new: String,
}

#[derive(Debug, Clone)]
struct Relation {
    attribute: String,
    target_servertype: String,
}

/// Inventory kept in process memory.
pub struct MemoryInventory {
    objects: RwLock<BTreeMap<ObjectId, InventoryObject>>,
    last_commit_id: Mutex<u64>,
    relations: Vec<Relation>,
    subscribers: RwLock<Vec<Arc<dyn ChangeSubscriber>>>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventory {
    /// Empty inventory without relation attributes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            last_commit_id: Mutex::new(0),
            relations: Vec::new(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Empty inventory whose relation attributes follow `mapping`: the record
    /// relation attribute points at record objects and the domain relation
    /// attribute points at domain objects.
    #[must_use]
    pub fn for_mapping(mapping: &AttributeMapping) -> Self {
        Self::new()
            .with_relation(mapping.relation_attribute(), mapping.record_servertype())
            .with_relation(
                mapping.domain_relation_attribute(),
                mapping.domain_servertype(),
            )
    }

    /// Declare an attribute whose values are hostnames of `target_servertype` objects.
    #[must_use]
    pub fn with_relation(mut self, attribute: &str, target_servertype: &str) -> Self {
        self.relations.push(Relation {
            attribute: attribute.to_string(),
            target_servertype: target_servertype.to_string(),
        });
        self
    }

    /// Register a subscriber notified of every commit.
    pub async fn subscribe(&self, subscriber: Arc<dyn ChangeSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Insert an object without running the commit pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Validation`] if the id or hostname is already used.
    pub async fn seed(&self, object: InventoryObject) -> Result<(), CommitError> {
        let mut objects = self.objects.write().await;
        Self::insert_new(&mut objects, object)
    }

    /// Current snapshot of an object.
    pub async fn get(&self, object_id: ObjectId) -> Option<InventoryObject> {
        self.objects.read().await.get(&object_id).cloned()
    }

    /// Current snapshot of the object with a hostname.
    pub async fn find(&self, hostname: &str) -> Option<InventoryObject> {
        self.objects
            .read()
            .await
            .values()
            .find(|object| object.hostname == hostname)
            .cloned()
    }

    /// Apply a commit and notify subscribers.
    ///
    /// Returns the event delivered to subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Validation`] or [`CommitError::Referenced`] before any
    /// subscriber is notified, and [`CommitError::Rejected`] if a subscriber failed;
    /// in every case the inventory is left unchanged.
    pub async fn commit(&self, commit: Commit) -> Result<ChangeEvent, CommitError> {
        let mut last_commit_id = self.last_commit_id.lock().await;

        let before = self.objects.read().await.clone();
        let mut after = before.clone();
        let mut created = BTreeSet::new();
        let mut renames = Vec::new();

        for operation in commit.operations {
            self.apply(&mut after, &mut created, &mut renames, operation)?;
        }

        self.check_references(&before, &after)?;

        // Relation values follow renamed objects without showing up as changes.
        let mut baseline = before.clone();
        for rename in &renames {
            self.rewrite_references(&mut baseline, rename);
        }

        let mut event = ChangeEvent::new(*last_commit_id + 1);
        event.created = created
            .iter()
            .filter_map(|id| after.get(id).cloned())
            .collect();
        event.deleted = before
            .keys()
            .filter(|id| !after.contains_key(id))
            .copied()
            .collect();
        for (id, old) in &baseline {
            if let Some(new) = after.get(id) {
                let changes = diff_objects(old, new);
                if !changes.is_empty() {
                    event.changed.insert(*id, changes);
                }
            }
        }

        if event.is_empty() {
            debug!("Commit changed nothing, skipping notification");
            return Ok(event);
        }

        *self.objects.write().await = after;

        let subscribers = self.subscribers.read().await.clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_commit(&event).await {
                warn!(
                    commit_id = event.commit_id,
                    reason = e.reason(),
                    "Subscriber rejected commit, restoring previous inventory state: {}",
                    e
                );
                *self.objects.write().await = before;
                return Err(CommitError::Rejected(e));
            }
        }

        *last_commit_id = event.commit_id;
        info!(
            commit_id = event.commit_id,
            created = event.created.len(),
            changed = event.changed.len(),
            deleted = event.deleted.len(),
            "Inventory commit applied"
        );
        Ok(event)
    }

    fn insert_new(
        objects: &mut BTreeMap<ObjectId, InventoryObject>,
        object: InventoryObject,
    ) -> Result<(), CommitError> {
        if objects.contains_key(&object.object_id) {
            return Err(CommitError::Validation {
                reason: format!("object id {} already exists", object.object_id),
            });
        }
        ensure_unique_hostname(objects, &object.hostname, object.object_id)?;
        objects.insert(object.object_id, object);
        Ok(())
    }

    fn apply(
        &self,
        objects: &mut BTreeMap<ObjectId, InventoryObject>,
        created: &mut BTreeSet<ObjectId>,
        renames: &mut Vec<Rename>,
        operation: Operation,
    ) -> Result<(), CommitError> {
        match operation {
            Operation::Create(object) => {
                created.insert(object.object_id);
                Self::insert_new(objects, object)
            }
            Operation::Set {
                object_id,
                attribute,
                value,
            } => {
                if attribute == ATTR_OBJECT_ID || attribute == ATTR_SERVERTYPE {
                    return Err(CommitError::Validation {
                        reason: format!("attribute '{attribute}' is read-only"),
                    });
                }

                if attribute == ATTR_HOSTNAME {
                    let hostname = match value {
                        Some(AttributeValue::Single(Scalar::Text(hostname)))
                            if !hostname.is_empty() =>
                        {
                            hostname
                        }
                        _ => {
                            return Err(CommitError::Validation {
                                reason: format!("object {object_id} needs a text hostname"),
                            })
                        }
                    };
                    ensure_unique_hostname(objects, &hostname, object_id)?;
                    let object = object_mut(objects, object_id)?;
                    if object.hostname == hostname {
                        return Ok(());
                    }
                    let rename = Rename {
                        servertype: object.servertype.clone(),
                        old: std::mem::replace(&mut object.hostname, hostname.clone()),
                        new: hostname,
                    };
                    self.rewrite_references(objects, &rename);
                    renames.push(rename);
                    return Ok(());
                }

                let object = object_mut(objects, object_id)?;
                match value {
                    Some(value) => {
                        object.attributes.insert(attribute, value);
                    }
                    None => {
                        object.attributes.remove(&attribute);
                    }
                }
                Ok(())
            }
            Operation::Add {
                object_id,
                attribute,
                values,
            } => {
                let object = object_mut(objects, object_id)?;
                match object
                    .attributes
                    .entry(attribute.clone())
                    .or_insert_with(|| AttributeValue::Multi(BTreeSet::new()))
                {
                    AttributeValue::Multi(existing) => {
                        existing.extend(values);
                        Ok(())
                    }
                    AttributeValue::Single(_) => Err(CommitError::Validation {
                        reason: format!("attribute '{attribute}' is not multi-valued"),
                    }),
                }
            }
            Operation::Remove {
                object_id,
                attribute,
                values,
            } => {
                let object = object_mut(objects, object_id)?;
                match object.attributes.get_mut(&attribute) {
                    Some(AttributeValue::Multi(existing)) => {
                        existing.retain(|value| !values.contains(value));
                        Ok(())
                    }
                    Some(AttributeValue::Single(_)) => Err(CommitError::Validation {
                        reason: format!("attribute '{attribute}' is not multi-valued"),
                    }),
                    None => Ok(()),
                }
            }
            Operation::Delete(object_id) => {
                if objects.remove(&object_id).is_none() {
                    return Err(CommitError::Validation {
                        reason: format!("object {object_id} does not exist"),
                    });
                }
                Ok(())
            }
        }
    }

    /// Point relation values naming the old hostname at the new one.
    fn rewrite_references(
        &self,
        objects: &mut BTreeMap<ObjectId, InventoryObject>,
        rename: &Rename,
    ) {
        let old = Scalar::Text(rename.old.clone());
        for relation in self
            .relations
            .iter()
            .filter(|relation| relation.target_servertype == rename.servertype)
        {
            for object in objects.values_mut() {
                match object.attributes.get_mut(&relation.attribute) {
                    Some(AttributeValue::Single(value)) if *value == old => {
                        *value = Scalar::Text(rename.new.clone());
                    }
                    Some(AttributeValue::Multi(values)) => {
                        if values.remove(&old) {
                            values.insert(Scalar::Text(rename.new.clone()));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Every relation value must name an existing object of the target servertype,
    /// and no deleted object may still be referenced.
    fn check_references(
        &self,
        before: &BTreeMap<ObjectId, InventoryObject>,
        after: &BTreeMap<ObjectId, InventoryObject>,
    ) -> Result<(), CommitError> {
        for relation in &self.relations {
            for object in after.values() {
                for hostname in object.contents(&relation.attribute) {
                    let target = after.values().find(|candidate| {
                        candidate.hostname == hostname
                            && candidate.servertype == relation.target_servertype
                    });
                    if target.is_some() {
                        continue;
                    }

                    let deleted = before.values().any(|candidate| {
                        candidate.hostname == hostname && !after.contains_key(&candidate.object_id)
                    });
                    if deleted {
                        return Err(CommitError::Referenced {
                            hostname,
                            referenced_by: object.hostname.clone(),
                        });
                    }
                    return Err(CommitError::Validation {
                        reason: format!(
                            "attribute '{}' of '{}' names unknown {} '{}'",
                            relation.attribute,
                            object.hostname,
                            relation.target_servertype,
                            hostname
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

fn object_mut(
    objects: &mut BTreeMap<ObjectId, InventoryObject>,
    object_id: ObjectId,
) -> Result<&mut InventoryObject, CommitError> {
    objects
        .get_mut(&object_id)
        .ok_or_else(|| CommitError::Validation {
            reason: format!("object {object_id} does not exist"),
        })
}

fn ensure_unique_hostname(
    objects: &BTreeMap<ObjectId, InventoryObject>,
    hostname: &str,
    object_id: ObjectId,
) -> Result<(), CommitError> {
    if objects
        .values()
        .any(|other| other.hostname == hostname && other.object_id != object_id)
    {
        return Err(CommitError::Validation {
            reason: format!("hostname '{hostname}' is already used"),
        });
    }
    Ok(())
}

/// Per-attribute diff between two snapshots of one object.
fn diff_objects(old: &InventoryObject, new: &InventoryObject) -> ObjectChanges {
    let mut changes = ObjectChanges::new();

    if old.hostname != new.hostname {
        changes.insert(
            ATTR_HOSTNAME.to_string(),
            AttributeDiff::update(
                Some(Scalar::Text(old.hostname.clone())),
                Some(Scalar::Text(new.hostname.clone())),
            ),
        );
    }

    let names: BTreeSet<&String> = old.attributes.keys().chain(new.attributes.keys()).collect();
    for name in names {
        let before = old.attributes.get(name);
        let after = new.attributes.get(name);
        if before == after {
            continue;
        }

        let multi = before.is_some_and(AttributeValue::is_multi)
            || after.is_some_and(AttributeValue::is_multi);
        let diff = if multi {
            let empty = BTreeSet::new();
            let before = multi_values(before).unwrap_or(&empty);
            let after = multi_values(after).unwrap_or(&empty);
            AttributeDiff::Multi {
                add: after.difference(before).cloned().collect(),
                remove: before.difference(after).cloned().collect(),
            }
        } else {
            AttributeDiff::update(single_value(before), single_value(after))
        };

        if !diff.is_noop() {
            changes.insert(name.clone(), diff);
        }
    }

    changes
}

fn multi_values(value: Option<&AttributeValue>) -> Option<&BTreeSet<Scalar>> {
    match value {
        Some(AttributeValue::Multi(values)) => Some(values),
        _ => None,
    }
}

fn single_value(value: Option<&AttributeValue>) -> Option<Scalar> {
    match value {
        Some(AttributeValue::Single(value)) => Some(value.clone()),
        _ => None,
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn query(&self, query: &Query) -> Result<Vec<InventoryObject>, ResolutionError> {
        let objects = self.objects.read().await;
        Ok(objects
            .values()
            .filter(|object| query.matches(object))
            .map(|object| object.project(&query.restrict))
            .collect())
    }
}
