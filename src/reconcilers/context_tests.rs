// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the per-event resolution context.

#[cfg(test)]
mod tests {
    use crate::config::{AttributeMapping, PowerDnsConfig};
    use crate::dns_errors::ResolutionError;
    use crate::event::{AttributeDiff, ChangeEvent, ObjectChanges};
    use crate::inventory::memory::MemoryInventory;
    use crate::inventory::{AttributeValue, InventoryObject, InventoryStore, ObjectId, Query};
    use crate::reconcilers::context::{Anchor, EventContext};
    use crate::reconcilers::Reconciler;
    use crate::repository::memory::MemoryRecordStore;
    use crate::repository::RecordFilter;
    use async_trait::async_trait;
    use hickory_proto::rr::RecordType;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    const SOA: &str = "ns1.example.com hostmaster.example.com 1 900 3600 900 300";

    fn mapping() -> AttributeMapping {
        PowerDnsConfig::default().validate().unwrap()
    }

    async fn inventory() -> MemoryInventory {
        let inventory = MemoryInventory::new();
        inventory
            .seed(InventoryObject::new(1, "domain", "example.com").with("soa", SOA))
            .await
            .unwrap();
        inventory
            .seed(InventoryObject::new(4, "domain", "example.org"))
            .await
            .unwrap();
        inventory
            .seed(
                InventoryObject::new(2, "record", "www.example.com")
                    .with("domain", "example.com")
                    .with("ttl", 300_i64)
                    .with("mx", "10 mail.example.com"),
            )
            .await
            .unwrap();
        inventory
            .seed(
                InventoryObject::new(3, "container", "c1.example.com")
                    .with("records", AttributeValue::multi(["www.example.com"]))
                    .with("mx", "20 mail.example.com"),
            )
            .await
            .unwrap();
        inventory
    }

    #[tokio::test]
    async fn test_anchor_resolves_zone_and_ttl() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 100);

        let record = ctx.object(2).await.unwrap();
        let anchor = ctx.anchor(&record).await.unwrap();
        assert_eq!(
            anchor,
            Anchor {
                record_id: 2,
                hostname: "www.example.com".to_string(),
                domain_id: 1,
                soa: SOA.to_string(),
                ttl: 300,
            }
        );
        assert_eq!(ctx.now(), 100);
    }

    #[tokio::test]
    async fn test_zone_without_soa_uses_default() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);

        let record =
            InventoryObject::new(9, "record", "www.example.org").with("domain", "example.org");
        let anchor = ctx.anchor(&record).await.unwrap();
        assert_eq!(anchor.domain_id, 4);
        assert_eq!(anchor.soa, mapping.default_soa());
        assert_eq!(anchor.ttl, mapping.default_ttl());
    }

    #[tokio::test]
    async fn test_anchor_errors() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);

        let no_domain = InventoryObject::new(9, "record", "a.example.com");
        assert_eq!(
            ctx.anchor(&no_domain).await.unwrap_err(),
            ResolutionError::MissingDomain {
                object_id: 9,
                attribute: "domain".to_string(),
            }
        );

        let unknown =
            InventoryObject::new(10, "record", "b.example.net").with("domain", "example.net");
        assert_eq!(
            ctx.anchor(&unknown).await.unwrap_err(),
            ResolutionError::DomainNotFound {
                hostname: "example.net".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_deleted_objects_are_never_fetched() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut event = ChangeEvent::new(1);
        event.deleted.insert(2);
        let mut ctx = EventContext::new(&mapping, &inventory, &event, 0);

        assert!(ctx.is_deleted(2));
        assert!(ctx.has_deletions());
        assert_eq!(
            ctx.object(2).await.unwrap_err(),
            ResolutionError::ObjectNotFound { object_id: 2 }
        );
    }

    #[tokio::test]
    async fn test_objects_are_projected() {
        let mapping = mapping();
        let inventory = inventory().await;
        inventory
            .seed(InventoryObject::new(7, "machine", "m.example.com").with("owner", "alice"))
            .await
            .unwrap();
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);

        ctx.prefetch([2, 7]).await.unwrap();
        let machine = ctx.object(7).await.unwrap();
        assert!(machine.get("owner").is_none());
        assert_eq!(
            ctx.object(2).await.unwrap().first_content("mx").as_deref(),
            Some("10 mail.example.com")
        );

        assert!(ctx.object(1).await.unwrap().get("soa").is_none());
        assert_eq!(
            ctx.domain(1).await.unwrap().first_content("soa").as_deref(),
            Some(SOA)
        );
    }

    #[tokio::test]
    async fn test_related_records() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);

        let holder = ctx.object(3).await.unwrap();
        let related = ctx.related_records(&holder).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].object_id, 2);

        let dangling = InventoryObject::new(8, "container", "c2.example.com")
            .with("records", AttributeValue::multi(["gone.example.com"]));
        assert!(matches!(
            ctx.related_records(&dangling).await,
            Err(ResolutionError::HostnameNotFound { hostname, .. })
                if hostname == "gone.example.com"
        ));
    }

    #[tokio::test]
    async fn test_find_record_ignores_other_servertypes() {
        let mapping = mapping();
        let inventory = inventory().await;
        let mut ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);

        assert!(ctx.find_record("c1.example.com").await.unwrap().is_none());
        assert_eq!(
            ctx.record("www.example.com").await.unwrap().object_id,
            2
        );
    }

    #[test]
    fn test_ttl_parsing() {
        let mapping = mapping();
        let inventory = MemoryInventory::new();
        let ctx = EventContext::new(&mapping, &inventory, &ChangeEvent::new(1), 0);
        let record = |value: AttributeValue| {
            InventoryObject::new(2, "record", "www.example.com").with("ttl", value)
        };

        assert_eq!(ctx.ttl(&record(60_i64.into())).unwrap(), 60);
        assert_eq!(ctx.ttl(&record(" 120 ".into())).unwrap(), 120);
        assert_eq!(ctx.ttl(&record("".into())).unwrap(), 3600);
        assert_eq!(
            ctx.ttl(&InventoryObject::new(2, "record", "www.example.com"))
                .unwrap(),
            3600
        );
        assert!(ctx.ttl(&record((-1_i64).into())).is_err());
        assert!(ctx.ttl(&record("soon".into())).is_err());
        assert!(ctx.ttl(&record(true.into())).is_err());
    }

    // ========== Tests for per-event query caching ==========

    /// Inventory that records every query it answers.
    struct CountingInventory {
        inner: MemoryInventory,
        queries: Mutex<Vec<Query>>,
    }

    impl CountingInventory {
        fn queries(&self) -> Vec<Query> {
            self.queries.lock().unwrap().clone()
        }

        fn reset(&self) {
            self.queries.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl InventoryStore for CountingInventory {
        async fn query(&self, query: &Query) -> Result<Vec<InventoryObject>, ResolutionError> {
            self.queries.lock().unwrap().push(query.clone());
            self.inner.query(query).await
        }
    }

    fn holder() -> InventoryObject {
        InventoryObject::new(3, "container", "c1.example.com").with(
            "records",
            AttributeValue::multi(["r1.example.com", "r2.example.com"]),
        )
    }

    fn related_objects() -> Vec<InventoryObject> {
        vec![
            InventoryObject::new(1, "domain", "example.com").with("soa", SOA),
            InventoryObject::new(10, "record", "r1.example.com").with("domain", "example.com"),
            InventoryObject::new(11, "record", "r2.example.com").with("domain", "example.com"),
        ]
    }

    /// Reconciler over a counting inventory whose holder already carries MX and TXT
    /// values, with the zone and both records applied.
    async fn counted_setup() -> (Reconciler, Arc<CountingInventory>, MemoryRecordStore) {
        let inner = MemoryInventory::new();
        for object in related_objects() {
            inner.seed(object).await.unwrap();
        }
        inner
            .seed(
                holder()
                    .with("mx", "20 mail.example.com")
                    .with("txt", AttributeValue::multi(["v=1"])),
            )
            .await
            .unwrap();
        let inventory = Arc::new(CountingInventory {
            inner,
            queries: Mutex::new(Vec::new()),
        });
        let store = MemoryRecordStore::new();
        let reconciler = Reconciler::new(mapping(), inventory.clone(), Arc::new(store.clone()));

        let mut created = ChangeEvent::new(1);
        created.created = related_objects();
        created.created.push(holder());
        reconciler.reconcile(&created).await.unwrap();
        inventory.reset();

        (reconciler, inventory, store)
    }

    #[tokio::test]
    async fn test_holder_changes_resolve_related_records_once() {
        // Arrange
        let (reconciler, inventory, store) = counted_setup().await;
        let changes = ObjectChanges::from([
            (
                "mx".to_string(),
                AttributeDiff::update(None, Some("20 mail.example.com".into())),
            ),
            (
                "txt".to_string(),
                AttributeDiff::multi(["v=1"], Vec::<&str>::new()),
            ),
        ]);
        let mut event = ChangeEvent::new(2);
        event.changed = BTreeMap::from([(3 as ObjectId, changes)]);

        // Act
        reconciler.reconcile(&event).await.unwrap();

        // Assert: holder by id, both records in one hostname lookup, the zone once
        let queries = inventory.queries();
        assert_eq!(queries.len(), 3, "queries: {queries:?}");
        for record_id in [10, 11] {
            for record_type in [RecordType::MX, RecordType::TXT] {
                let rows = store
                    .records(
                        &RecordFilter::new()
                            .record(record_id)
                            .record_type(record_type),
                    )
                    .await;
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].object_id, 3);
            }
        }
    }

    #[tokio::test]
    async fn test_queries_restrict_to_the_servertype_attributes() {
        let (reconciler, inventory, _store) = counted_setup().await;
        let mapping = mapping();
        let mut event = ChangeEvent::new(2);
        event.changed = BTreeMap::from([(
            3 as ObjectId,
            ObjectChanges::from([(
                "mx".to_string(),
                AttributeDiff::update(None, Some("20 mail.example.com".into())),
            )]),
        )]);

        reconciler.reconcile(&event).await.unwrap();

        let record_attributes = mapping.record_attributes();
        let soa_only = vec![mapping.domain_soa_attribute().to_string()];
        for query in inventory.queries() {
            assert!(
                query.restrict == record_attributes || query.restrict == soa_only,
                "unexpected restriction: {query:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_domain_changes_fetch_domain_attributes_only() {
        let (reconciler, inventory, _store) = counted_setup().await;
        let mapping = mapping();
        let mut event = ChangeEvent::new(2);
        event.changed = BTreeMap::from([(
            1 as ObjectId,
            ObjectChanges::from([(
                "type".to_string(),
                AttributeDiff::update(None, Some("MASTER".into())),
            )]),
        )]);

        reconciler.reconcile(&event).await.unwrap();

        let queries = inventory.queries();
        assert_eq!(queries.len(), 1, "queries: {queries:?}");
        assert_eq!(queries[0].restrict, mapping.domain_attributes());
    }
}
