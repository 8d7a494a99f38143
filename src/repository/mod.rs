// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Derived Record Repository.
//!
//! The derived store follows the PowerDNS generic SQL backend schema: a zone table
//! (`id`, `name`, `type`) and a record table (`id`, `domain_id`, `name`, `type`,
//! `content`, `ttl`, `change_date`, `disabled`, `ordername`, `auth`). pdns-sync adds
//! the two bookkeeping columns `object_id` and `record_id` naming the inventory
//! objects a row was derived from.
//!
//! All mutations of one change event go through a single [`RecordTransaction`]:
//! either every mutation becomes visible on [`RecordTransaction::commit`] or none
//! does.
//!
//! [`memory::MemoryRecordStore`] is an in-process implementation honouring the same
//! constraints as the SQL schema (zone foreign key, lowercase names, unique zone names).

pub mod memory;


use crate::dns_errors::RepositoryError;
use crate::inventory::ObjectId;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use std::collections::BTreeSet;

/// Row id of a derived record.
pub type RowId = u64;

/// A row of the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRecord {
    /// Row id assigned by the store
    pub id: RowId,
    /// Owning zone
    pub domain_id: ObjectId,
    /// Inventory object whose attribute produced the row
    pub object_id: ObjectId,
    /// Record object anchoring the DNS name and TTL
    pub record_id: ObjectId,
    /// DNS name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record payload
    pub content: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Unix timestamp of the last change
    pub change_date: i64,
    /// Disabled rows are not served
    pub disabled: bool,
    /// DNSSEC ordering name
    pub ordername: Option<String>,
    /// Authoritative data
    pub auth: bool,
}

impl DerivedRecord {
    /// Identity key of the row for override bookkeeping.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            object_id: self.object_id,
            record_id: self.record_id,
            record_type: self.record_type,
        }
    }

    /// True if the row is owned by a relation holder rather than the record itself.
    #[must_use]
    pub fn is_override(&self) -> bool {
        self.object_id != self.record_id
    }
}

/// Fields of a row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Owning zone
    pub domain_id: ObjectId,
    /// Inventory object whose attribute produced the row
    pub object_id: ObjectId,
    /// Record object anchoring the row
    pub record_id: ObjectId,
    /// DNS name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record payload
    pub content: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Unix timestamp of the change
    pub change_date: i64,
}

impl NewRecord {
    /// Identity key of the row to insert.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            object_id: self.object_id,
            record_id: self.record_id,
            record_type: self.record_type,
        }
    }
}

/// (`object_id`, `record_id`, `type`) identity of single-valued rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Owning inventory object
    pub object_id: ObjectId,
    /// Anchoring record object
    pub record_id: ObjectId,
    /// Record type
    pub record_type: RecordType,
}

impl RecordKey {
    /// Filter selecting the rows of this key.
    #[must_use]
    pub fn filter(&self) -> RecordFilter {
        RecordFilter::new()
            .object(self.object_id)
            .record(self.record_id)
            .record_type(self.record_type)
    }
}

/// Result of [`RecordTransaction::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    /// No row had the key; this row was inserted
    Created(DerivedRecord),
    /// Rows with the key existed and were updated; these are their previous values
    Updated(Vec<DerivedRecord>),
}

/// A row of the zone table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedDomain {
    /// Zone id (the domain object's id)
    pub id: ObjectId,
    /// Zone name
    pub name: String,
    /// PowerDNS zone type (NATIVE, MASTER, SLAVE)
    pub kind: String,
}

/// Predicate over record rows. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Rows of this zone
    pub domain_id: Option<ObjectId>,
    /// Rows owned by this object
    pub object_id: Option<ObjectId>,
    /// Rows anchored by this record object
    pub record_id: Option<ObjectId>,
    /// Rows whose `object_id` or `record_id` is in this set
    pub involving: Option<BTreeSet<ObjectId>>,
    /// Rows with this name
    pub name: Option<String>,
    /// Rows of any of these types
    pub record_types: Option<Vec<RecordType>>,
    /// Rows of none of these types
    pub exclude_types: Vec<RecordType>,
    /// Rows with this content
    pub content: Option<String>,
}

impl RecordFilter {
    /// Filter matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a zone.
    #[must_use]
    pub fn domain(mut self, domain_id: ObjectId) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    /// Restrict to rows owned by an object.
    #[must_use]
    pub fn object(mut self, object_id: ObjectId) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Restrict to rows anchored by a record object.
    #[must_use]
    pub fn record(mut self, record_id: ObjectId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// Restrict to rows owned or anchored by any of `ids`.
    #[must_use]
    pub fn involving(mut self, ids: impl IntoIterator<Item = ObjectId>) -> Self {
        self.involving = Some(ids.into_iter().collect());
        self
    }

    /// Restrict to a name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to one record type.
    #[must_use]
    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.record_types = Some(vec![record_type]);
        self
    }

    /// Restrict to any of several record types.
    #[must_use]
    pub fn record_types(mut self, record_types: impl IntoIterator<Item = RecordType>) -> Self {
        self.record_types = Some(record_types.into_iter().collect());
        self
    }

    /// Exclude record types.
    #[must_use]
    pub fn excluding(mut self, record_types: impl IntoIterator<Item = RecordType>) -> Self {
        self.exclude_types.extend(record_types);
        self
    }

    /// Restrict to a content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// True if `record` satisfies every set condition.
    #[must_use]
    pub fn matches(&self, record: &DerivedRecord) -> bool {
        self.domain_id.map_or(true, |id| record.domain_id == id)
            && self.object_id.map_or(true, |id| record.object_id == id)
            && self.record_id.map_or(true, |id| record.record_id == id)
            && self.involving.as_ref().map_or(true, |ids| {
                ids.contains(&record.object_id) || ids.contains(&record.record_id)
            })
            && self.name.as_ref().map_or(true, |name| record.name == *name)
            && self
                .record_types
                .as_ref()
                .map_or(true, |types| types.contains(&record.record_type))
            && !self.exclude_types.contains(&record.record_type)
            && self
                .content
                .as_ref()
                .map_or(true, |content| record.content == *content)
    }
}

/// Column updates applied by [`RecordTransaction::update_where`]. Unset fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    /// New zone
    pub domain_id: Option<ObjectId>,
    /// New name
    pub name: Option<String>,
    /// New content
    pub content: Option<String>,
    /// New TTL
    pub ttl: Option<u32>,
    /// New change timestamp
    pub change_date: Option<i64>,
}

impl RecordPatch {
    /// Patch refreshing only the change timestamp.
    #[must_use]
    pub fn touched(change_date: i64) -> Self {
        Self {
            change_date: Some(change_date),
            ..Self::default()
        }
    }

    /// Set the zone.
    #[must_use]
    pub fn domain(mut self, domain_id: ObjectId) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    /// Set the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Apply the patch to a row.
    pub fn apply(&self, record: &mut DerivedRecord) {
        if let Some(domain_id) = self.domain_id {
            record.domain_id = domain_id;
        }
        if let Some(name) = &self.name {
            record.name.clone_from(name);
        }
        if let Some(content) = &self.content {
            record.content.clone_from(content);
        }
        if let Some(ttl) = self.ttl {
            record.ttl = ttl;
        }
        if let Some(change_date) = self.change_date {
            record.change_date = change_date;
        }
    }
}

/// Entry point of the derived record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a transaction. Transactions on one store are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if the store cannot be reached.
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>, RepositoryError>;
}

/// One atomic unit of record-store mutations.
///
/// Dropping a transaction without committing discards its mutations.
#[async_trait]
pub trait RecordTransaction: Send {
    /// Insert a row.
    async fn create(&mut self, record: NewRecord) -> Result<DerivedRecord, RepositoryError>;

    /// Update the rows with `key` from `fields`, or insert `fields` if none exists.
    async fn upsert(&mut self, key: &RecordKey, fields: NewRecord)
        -> Result<Upserted, RepositoryError>;

    /// Patch every matching row; returns the number of rows changed.
    async fn update_where(
        &mut self,
        filter: &RecordFilter,
        patch: &RecordPatch,
    ) -> Result<usize, RepositoryError>;

    /// Delete every matching row; returns the deleted rows.
    async fn delete_where(
        &mut self,
        filter: &RecordFilter,
    ) -> Result<Vec<DerivedRecord>, RepositoryError>;

    /// Matching rows, ordered by row id.
    async fn filter(
        &mut self,
        filter: &RecordFilter,
    ) -> Result<Vec<DerivedRecord>, RepositoryError>;

    /// Zone by id.
    async fn domain(&mut self, id: ObjectId) -> Result<Option<DerivedDomain>, RepositoryError>;

    /// Insert or replace a zone.
    async fn upsert_domain(&mut self, domain: DerivedDomain) -> Result<(), RepositoryError>;

    /// Delete a zone and, by cascade, its rows. Returns false if it did not exist.
    async fn delete_domain(&mut self, id: ObjectId) -> Result<bool, RepositoryError>;

    /// Make every mutation of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    /// Discard every mutation of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}
