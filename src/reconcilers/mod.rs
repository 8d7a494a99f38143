// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change-event reconciliation.
//!
//! The [`Reconciler`] receives one [`ChangeEvent`] per inventory commit and keeps
//! the derived record store consistent with it.
//!
//! # Reconciliation Architecture
//!
//! 1. **Deduplicate** - Redelivered commits (same `commit_id`) are acknowledged
//!    without touching the store
//! 2. **Begin** - One record-store transaction is opened for the whole event
//! 3. **Create** - Zones of new domains, rows of new records, overrides of new
//!    relation holders ([`domains::create`], [`records::create()`])
//! 4. **Update** - Domain changes, then record and holder attribute diffs
//!    ([`domains::update`], [`records::update()`])
//! 5. **Delete** - Rows of deleted objects with restore of overridden records,
//!    then zones of deleted domains ([`records::delete()`], [`domains::delete`])
//! 6. **Commit** - All mutations become visible at once; any failure rolls the
//!    transaction back and is returned to the commit pipeline
//!
//! # Example
//!
//! ```rust
//! use pdns_sync::config::PowerDnsConfig;
//! use pdns_sync::inventory::memory::MemoryInventory;
//! use pdns_sync::reconcilers::Reconciler;
//! use pdns_sync::repository::memory::MemoryRecordStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mapping = PowerDnsConfig::default().validate()?;
//! let inventory = Arc::new(MemoryInventory::for_mapping(&mapping));
//! let store = Arc::new(MemoryRecordStore::new());
//!
//! let reconciler = Arc::new(Reconciler::new(mapping, inventory.clone(), store.clone()));
//! inventory.subscribe(reconciler).await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod domains;
pub mod ops;
pub mod records;

#[cfg(test)]
mod context_tests;
#[cfg(test)]
mod domains_tests;
#[cfg(test)]
mod ops_tests;

use crate::config::AttributeMapping;
use crate::constants::DEDUP_WINDOW_SIZE;
use crate::dns_errors::ReconcileError;
use crate::event::ChangeEvent;
use crate::inventory::{ChangeSubscriber, InventoryStore};
use crate::metrics;
use crate::repository::{RecordStore, RecordTransaction};
use async_trait::async_trait;
use chrono::Utc;
use context::EventContext;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

const PHASE_CREATE: &str = "create";
const PHASE_UPDATE: &str = "update";
const PHASE_DELETE: &str = "delete";
const PHASE_EVENT: &str = "event";

/// Bounded memory of successfully applied commit ids.
#[derive(Debug)]
struct AppliedCommits {
    capacity: usize,
    order: VecDeque<u64>,
    ids: HashSet<u64>,
}

impl AppliedCommits {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, commit_id: u64) -> bool {
        self.ids.contains(&commit_id)
    }

    fn insert(&mut self, commit_id: u64) {
        if self.capacity == 0 || !self.ids.insert(commit_id) {
            return;
        }
        self.order.push_back(commit_id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

/// Applies change events to the derived record store.
pub struct Reconciler {
    mapping: Arc<AttributeMapping>,
    inventory: Arc<dyn InventoryStore>,
    store: Arc<dyn RecordStore>,
    applied: Mutex<AppliedCommits>,
}

impl Reconciler {
    /// Create a reconciler from a validated mapping and its two collaborators.
    pub fn new(
        mapping: AttributeMapping,
        inventory: Arc<dyn InventoryStore>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            mapping: Arc::new(mapping),
            inventory,
            store,
            applied: Mutex::new(AppliedCommits::new(DEDUP_WINDOW_SIZE)),
        }
    }

    /// Remember at most `size` applied commit ids for redelivery detection.
    #[must_use]
    pub fn with_dedup_window(mut self, size: usize) -> Self {
        self.applied = Mutex::new(AppliedCommits::new(size));
        self
    }

    /// The attribute mapping this reconciler applies.
    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    /// Apply one change event atomically.
    ///
    /// Commit id 0 marks an event without identity; such events are never treated
    /// as redeliveries.
    ///
    /// Events are applied one at a time. A delivery that arrives while the same
    /// commit is being applied waits for it, then skips it if it succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the record-store transaction is rolled back and
    /// nothing of the event is visible.
    pub async fn reconcile(&self, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let commit_id = event.commit_id;
        let mut applied = self.applied.lock().await;
        if commit_id != 0 && applied.contains(commit_id) {
            info!(commit_id, "Change event already applied, skipping redelivery");
            metrics::record_deduplicated();
            return Ok(());
        }

        if event.is_empty() {
            debug!(commit_id, "Change event is empty");
            return Ok(());
        }

        let span = info_span!("reconcile", commit_id);
        self.apply(event).instrument(span).await?;

        if commit_id != 0 {
            applied.insert(commit_id);
        }
        Ok(())
    }

    async fn apply(&self, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let started = Instant::now();
        debug!(
            created = event.created.len(),
            changed = event.changed.len(),
            deleted = event.deleted.len(),
            "Reconciling change event"
        );

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(fail(e.into(), started)),
        };

        let mut ctx = EventContext::new(
            &self.mapping,
            self.inventory.as_ref(),
            event,
            Utc::now().timestamp(),
        );

        if let Err(e) = run_phases(&mut ctx, tx.as_mut(), event).await {
            if let Err(rollback) = tx.rollback().await {
                warn!("Failed to roll back record store transaction: {}", rollback);
            }
            return Err(fail(e, started));
        }

        if let Err(e) = tx.commit().await {
            return Err(fail(e.into(), started));
        }

        metrics::record_reconciliation_success(PHASE_EVENT, started.elapsed());
        info!(
            created = event.created.len(),
            changed = event.changed.len(),
            deleted = event.deleted.len(),
            duration_ms = started.elapsed().as_millis(),
            "Change event reconciled"
        );
        Ok(())
    }
}

fn fail(e: ReconcileError, started: Instant) -> ReconcileError {
    error!(reason = e.reason(), "Change event rejected, rolled back: {}", e);
    metrics::record_error(e.reason());
    metrics::record_reconciliation_error(PHASE_EVENT, started.elapsed());
    e
}

fn observe(phase: &str, started: Instant, result: &Result<(), ReconcileError>) {
    match result {
        Ok(()) => metrics::record_reconciliation_success(phase, started.elapsed()),
        Err(_) => metrics::record_reconciliation_error(phase, started.elapsed()),
    }
}

async fn create_phase(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    event: &ChangeEvent,
) -> Result<(), ReconcileError> {
    domains::create(ctx, tx, &event.created).await?;
    records::create(ctx, tx, &event.created).await
}

async fn update_phase(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    event: &ChangeEvent,
) -> Result<(), ReconcileError> {
    domains::update(ctx, tx, &event.changed).await?;
    records::update(ctx, tx, &event.changed).await
}

async fn delete_phase(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    event: &ChangeEvent,
) -> Result<(), ReconcileError> {
    records::delete(ctx, tx, &event.deleted).await?;
    domains::delete(tx, &event.deleted).await
}

/// Run created, changed and deleted handling in that order.
async fn run_phases(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    event: &ChangeEvent,
) -> Result<(), ReconcileError> {
    if !event.created.is_empty() {
        let started = Instant::now();
        let result = create_phase(ctx, tx, event).await;
        observe(PHASE_CREATE, started, &result);
        result?;
    }

    if !event.changed.is_empty() {
        let started = Instant::now();
        let result = update_phase(ctx, tx, event).await;
        observe(PHASE_UPDATE, started, &result);
        result?;
    }

    if !event.deleted.is_empty() {
        let started = Instant::now();
        let result = delete_phase(ctx, tx, event).await;
        observe(PHASE_DELETE, started, &result);
        result?;
    }

    Ok(())
}

#[async_trait]
impl ChangeSubscriber for Reconciler {
    async fn on_commit(&self, event: &ChangeEvent) -> Result<(), ReconcileError> {
        self.reconcile(event).await
    }
}
