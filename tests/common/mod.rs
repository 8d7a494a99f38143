// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use hickory_proto::rr::RecordType;
use pdns_sync::config::{AttributeMapping, PowerDnsConfig};
use pdns_sync::event::ChangeEvent;
use pdns_sync::inventory::memory::{Commit, CommitError, MemoryInventory};
use pdns_sync::inventory::{AttributeValue, InventoryObject, ObjectId};
use pdns_sync::reconcilers::Reconciler;
use pdns_sync::repository::memory::MemoryRecordStore;
use pdns_sync::repository::{DerivedRecord, RecordFilter};
use pdns_sync::reverse::reverse_pointer_str;
use std::sync::Arc;

pub const SOA: &str = "localhost admin@bar.com 1 900 3600 900 300";

/// Inventory, record store and reconciler wired together through the commit pipeline.
pub struct Harness {
    pub mapping: AttributeMapping,
    pub inventory: Arc<MemoryInventory>,
    pub store: MemoryRecordStore,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(PowerDnsConfig::default()).await
    }

    pub async fn with_config(config: PowerDnsConfig) -> Self {
        let _ = pdns_sync::telemetry::init_logging();

        let mapping = config.validate().expect("valid mapping");
        let inventory = Arc::new(MemoryInventory::for_mapping(&mapping));
        let store = MemoryRecordStore::new();
        let reconciler = Reconciler::new(
            mapping.clone(),
            inventory.clone(),
            Arc::new(store.clone()),
        );
        inventory.subscribe(Arc::new(reconciler)).await;

        Self {
            mapping,
            inventory,
            store,
        }
    }

    pub async fn commit(&self, commit: Commit) -> Result<ChangeEvent, CommitError> {
        self.inventory.commit(commit).await
    }

    /// Commit that must succeed.
    pub async fn apply(&self, commit: Commit) -> ChangeEvent {
        self.commit(commit).await.expect("commit succeeds")
    }

    pub async fn rows(&self, filter: RecordFilter) -> Vec<DerivedRecord> {
        self.store.records(&filter).await
    }

    /// (owner, content) of the rows of one type anchored at a record.
    pub async fn owned(
        &self,
        record_id: ObjectId,
        record_type: RecordType,
    ) -> Vec<(ObjectId, String)> {
        self.rows(RecordFilter::new().record(record_id).record_type(record_type))
            .await
            .into_iter()
            .map(|row| (row.object_id, row.content))
            .collect()
    }

    /// Every A/AAAA row has exactly one PTR and one SOA row at its reverse name,
    /// with the same owner and anchor.
    pub async fn assert_reverse_pairing(&self) {
        let all = self.store.all_records().await;
        for forward in all
            .iter()
            .filter(|row| matches!(row.record_type, RecordType::A | RecordType::AAAA))
        {
            let reverse = reverse_pointer_str(&forward.content).expect("stored address");
            let pair = |record_type: RecordType| -> Vec<&DerivedRecord> {
                all.iter()
                    .filter(|row| {
                        row.record_type == record_type
                            && row.name == reverse
                            && row.object_id == forward.object_id
                            && row.record_id == forward.record_id
                    })
                    .collect()
            };

            let ptr = pair(RecordType::PTR);
            assert_eq!(ptr.len(), 1, "one PTR for {}", forward.content);
            assert_eq!(ptr[0].content, forward.name);

            let zone_soa = all
                .iter()
                .find(|row| {
                    row.record_type == RecordType::SOA
                        && row.record_id == forward.domain_id
                        && row.domain_id == forward.domain_id
                })
                .map(|row| row.content.clone())
                .expect("zone SOA row");
            let soa = pair(RecordType::SOA);
            assert_eq!(soa.len(), 1, "one paired SOA for {}", forward.content);
            assert_eq!(soa[0].content, zone_soa);
            assert_eq!(soa[0].domain_id, forward.domain_id);
        }
    }
}

pub fn domain(object_id: ObjectId, hostname: &str) -> InventoryObject {
    InventoryObject::new(object_id, "domain", hostname).with("soa", SOA)
}

pub fn record(object_id: ObjectId, hostname: &str, domain: &str) -> InventoryObject {
    InventoryObject::new(object_id, "record", hostname).with("domain", domain)
}

pub fn container(object_id: ObjectId, hostname: &str, records: &[&str]) -> InventoryObject {
    InventoryObject::new(object_id, "container", hostname)
        .with("records", AttributeValue::multi(records.iter().copied()))
}
