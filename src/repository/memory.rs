// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory record store.
//!
//! Transactions take the store lock for their whole lifetime and work on a private
//! copy of the tables, which replaces the shared tables on commit. This gives
//! serializable isolation and all-or-nothing visibility per transaction.

use super::{
    DerivedDomain, DerivedRecord, NewRecord, RecordFilter, RecordKey, RecordPatch, RecordStore,
    RecordTransaction, RowId, Upserted,
};
use crate::dns_errors::RepositoryError;
use crate::inventory::ObjectId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    domains: BTreeMap<ObjectId, DerivedDomain>,
    records: BTreeMap<RowId, DerivedRecord>,
    next_row_id: RowId,
}

impl Tables {
    fn check_name(name: &str) -> Result<(), RepositoryError> {
        if name.to_lowercase() != name {
            return Err(RepositoryError::ConstraintViolation {
                reason: format!("name '{name}' must be lowercase"),
            });
        }
        Ok(())
    }

    fn check_record(&self, domain_id: ObjectId, name: &str) -> Result<(), RepositoryError> {
        if !self.domains.contains_key(&domain_id) {
            return Err(RepositoryError::ConstraintViolation {
                reason: format!("record '{name}' references unknown domain {domain_id}"),
            });
        }
        Self::check_name(name)
    }

    fn insert(&mut self, record: NewRecord) -> Result<DerivedRecord, RepositoryError> {
        self.check_record(record.domain_id, &record.name)?;

        self.next_row_id += 1;
        let row = DerivedRecord {
            id: self.next_row_id,
            domain_id: record.domain_id,
            object_id: record.object_id,
            record_id: record.record_id,
            name: record.name,
            record_type: record.record_type,
            content: record.content,
            ttl: record.ttl,
            change_date: record.change_date,
            disabled: false,
            ordername: None,
            auth: true,
        };
        self.records.insert(row.id, row.clone());
        Ok(row)
    }
}

/// Record store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows matching `filter`, ordered by row id.
    pub async fn records(&self, filter: &RecordFilter) -> Vec<DerivedRecord> {
        let tables = self.tables.lock().await;
        tables
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    /// Every committed row.
    pub async fn all_records(&self) -> Vec<DerivedRecord> {
        self.records(&RecordFilter::new()).await
    }

    /// Committed zone by id.
    pub async fn domain(&self, id: ObjectId) -> Option<DerivedDomain> {
        self.tables.lock().await.domains.get(&id).cloned()
    }

    /// Every committed zone.
    pub async fn domains(&self) -> Vec<DerivedDomain> {
        self.tables.lock().await.domains.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>, RepositoryError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = Tables::clone(&guard);
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }
}

/// Transaction of a [`MemoryRecordStore`].
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), RepositoryError> {
        if self.guard.is_none() {
            return Err(RepositoryError::TransactionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordTransaction for MemoryTransaction {
    async fn create(&mut self, record: NewRecord) -> Result<DerivedRecord, RepositoryError> {
        self.ensure_open()?;
        self.working.insert(record)
    }

    async fn upsert(
        &mut self,
        key: &RecordKey,
        fields: NewRecord,
    ) -> Result<Upserted, RepositoryError> {
        self.ensure_open()?;

        let filter = key.filter();
        let previous: Vec<DerivedRecord> = self
            .working
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        if previous.is_empty() {
            return self.working.insert(fields).map(Upserted::Created);
        }

        self.working.check_record(fields.domain_id, &fields.name)?;
        for row in &previous {
            if let Some(record) = self.working.records.get_mut(&row.id) {
                record.domain_id = fields.domain_id;
                record.name.clone_from(&fields.name);
                record.content.clone_from(&fields.content);
                record.ttl = fields.ttl;
                record.change_date = fields.change_date;
            }
        }
        Ok(Upserted::Updated(previous))
    }

    async fn update_where(
        &mut self,
        filter: &RecordFilter,
        patch: &RecordPatch,
    ) -> Result<usize, RepositoryError> {
        self.ensure_open()?;

        if let Some(domain_id) = patch.domain_id {
            if !self.working.domains.contains_key(&domain_id) {
                return Err(RepositoryError::ConstraintViolation {
                    reason: format!("update references unknown domain {domain_id}"),
                });
            }
        }
        if let Some(name) = &patch.name {
            Tables::check_name(name)?;
        }

        let mut changed = 0;
        for record in self.working.records.values_mut() {
            if filter.matches(record) {
                patch.apply(record);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_where(
        &mut self,
        filter: &RecordFilter,
    ) -> Result<Vec<DerivedRecord>, RepositoryError> {
        self.ensure_open()?;

        let ids: Vec<RowId> = self
            .working
            .records
            .values()
            .filter(|record| filter.matches(record))
            .map(|record| record.id)
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| self.working.records.remove(id))
            .collect())
    }

    async fn filter(
        &mut self,
        filter: &RecordFilter,
    ) -> Result<Vec<DerivedRecord>, RepositoryError> {
        self.ensure_open()?;
        Ok(self
            .working
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn domain(&mut self, id: ObjectId) -> Result<Option<DerivedDomain>, RepositoryError> {
        self.ensure_open()?;
        Ok(self.working.domains.get(&id).cloned())
    }

    async fn upsert_domain(&mut self, domain: DerivedDomain) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        Tables::check_name(&domain.name)?;

        if let Some(other) = self
            .working
            .domains
            .values()
            .find(|existing| existing.name == domain.name && existing.id != domain.id)
        {
            return Err(RepositoryError::ConstraintViolation {
                reason: format!(
                    "domain name '{}' already used by domain {}",
                    domain.name, other.id
                ),
            });
        }

        self.working.domains.insert(domain.id, domain);
        Ok(())
    }

    async fn delete_domain(&mut self, id: ObjectId) -> Result<bool, RepositoryError> {
        self.ensure_open()?;

        if self.working.domains.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.records.retain(|_, record| record.domain_id != id);
        Ok(true)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        let mut guard = self.guard.take().ok_or(RepositoryError::TransactionClosed)?;
        debug!(
            records = self.working.records.len(),
            domains = self.working.domains.len(),
            "committing record store transaction"
        );
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), RepositoryError> {
        self.guard
            .take()
            .map(drop)
            .ok_or(RepositoryError::TransactionClosed)
    }
}
