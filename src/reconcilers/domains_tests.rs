// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for domain lifecycle reconciliation.

#[cfg(test)]
mod tests {
    use crate::config::{AttributeMapping, PowerDnsConfig};
    use crate::dns_errors::ReconcileError;
    use crate::event::{AttributeDiff, ChangeEvent, ObjectChanges};
    use crate::inventory::memory::MemoryInventory;
    use crate::inventory::{AttributeValue, InventoryObject, ObjectId, Scalar};
    use crate::reconcilers::context::EventContext;
    use crate::reconcilers::{domains, records};
    use crate::repository::memory::MemoryRecordStore;
    use crate::repository::{RecordFilter, RecordStore};
    use hickory_proto::rr::RecordType;
    use std::collections::{BTreeMap, BTreeSet};

    const SOA: &str = "ns1.example.com hostmaster.example.com 1 900 3600 900 300";
    const NEW_SOA: &str = "ns1.example.com hostmaster.example.com 2 900 3600 900 300";

    fn mapping() -> AttributeMapping {
        PowerDnsConfig::default().validate().unwrap()
    }

    fn domain() -> InventoryObject {
        InventoryObject::new(1, "domain", "example.com")
            .with("soa", SOA)
            .with(
                "ns",
                AttributeValue::multi(["ns1.example.com", "ns2.example.com"]),
            )
    }

    fn record() -> InventoryObject {
        InventoryObject::new(2, "record", "www.example.com")
            .with("domain", "example.com")
            .with("intern_ip", "10.0.0.1")
    }

    async fn inventory_of(objects: &[InventoryObject]) -> MemoryInventory {
        let inventory = MemoryInventory::new();
        for object in objects {
            inventory.seed(object.clone()).await.unwrap();
        }
        inventory
    }

    async fn created_with(
        mapping: &AttributeMapping,
        objects: Vec<InventoryObject>,
    ) -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        let inventory = inventory_of(&objects).await;
        let mut event = ChangeEvent::new(1);
        event.created = objects;

        let mut ctx = EventContext::new(mapping, &inventory, &event, 10);
        let mut tx = store.begin().await.unwrap();
        domains::create(&mut ctx, tx.as_mut(), &event.created)
            .await
            .unwrap();
        records::create(&mut ctx, tx.as_mut(), &event.created)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        store
    }

    async fn created(objects: Vec<InventoryObject>) -> MemoryRecordStore {
        created_with(&mapping(), objects).await
    }

    async fn updated(
        store: &MemoryRecordStore,
        after: &[InventoryObject],
        changes: ObjectChanges,
    ) -> Result<(), ReconcileError> {
        let mapping = mapping();
        let inventory = inventory_of(after).await;
        let mut event = ChangeEvent::new(2);
        event.changed = BTreeMap::from([(1, changes)]);

        let mut ctx = EventContext::new(&mapping, &inventory, &event, 20);
        let mut tx = store.begin().await?;
        domains::update(&mut ctx, tx.as_mut(), &event.changed).await?;
        tx.commit().await?;
        Ok(())
    }

    fn diff(attribute: &str, old: Option<&str>, new: Option<&str>) -> ObjectChanges {
        ObjectChanges::from([(
            attribute.to_string(),
            AttributeDiff::update(old.map(Scalar::from), new.map(Scalar::from)),
        )])
    }

    async fn apex(store: &MemoryRecordStore, record_type: RecordType) -> Vec<String> {
        store
            .records(&RecordFilter::new().record(1).record_type(record_type))
            .await
            .into_iter()
            .map(|row| row.content)
            .collect()
    }

    #[tokio::test]
    async fn test_create_zone_with_apex_rows() {
        let store = created(vec![domain().with("type", "MASTER")]).await;

        let zone = store.domain(1).await.expect("zone created");
        assert_eq!(zone.name, "example.com");
        assert_eq!(zone.kind, "MASTER");

        assert_eq!(apex(&store, RecordType::SOA).await, vec![SOA]);
        assert_eq!(
            apex(&store, RecordType::NS).await,
            vec!["ns1.example.com", "ns2.example.com"]
        );
        let rows = store.records(&RecordFilter::new().record(1)).await;
        assert!(rows
            .iter()
            .all(|row| row.name == "example.com" && row.object_id == 1 && row.domain_id == 1));
    }

    #[tokio::test]
    async fn test_create_zone_with_defaults() {
        let mut config = PowerDnsConfig::default();
        config.domain.default_ns = vec!["ns.example.net".to_string()];
        let mapping = config.validate().unwrap();

        let store = created_with(
            &mapping,
            vec![InventoryObject::new(1, "domain", "example.com")],
        )
        .await;

        assert_eq!(store.domain(1).await.unwrap().kind, "NATIVE");
        assert_eq!(
            apex(&store, RecordType::SOA).await,
            vec![mapping.default_soa().to_string()]
        );
        assert_eq!(apex(&store, RecordType::NS).await, vec!["ns.example.net"]);
    }

    #[tokio::test]
    async fn test_rename_zone() {
        let store = created(vec![domain(), record()]).await;
        let mut renamed = domain();
        renamed.hostname = "example.net".to_string();

        updated(
            &store,
            &[renamed, record().with("domain", "example.net")],
            diff("hostname", Some("example.com"), Some("example.net")),
        )
        .await
        .unwrap();

        assert_eq!(store.domain(1).await.unwrap().name, "example.net");
        let apex_rows = store.records(&RecordFilter::new().record(1)).await;
        assert_eq!(apex_rows.len(), 3);
        assert!(apex_rows.iter().all(|row| row.name == "example.net"));

        let zone_rows = store.records(&RecordFilter::new().domain(1)).await;
        assert!(zone_rows.iter().all(|row| row.change_date == 20));
        let www = store
            .records(&RecordFilter::new().record(2).record_type(RecordType::A))
            .await;
        assert_eq!(www[0].name, "www.example.com");
    }

    #[tokio::test]
    async fn test_type_change_updates_zone_kind() {
        let store = created(vec![domain()]).await;

        updated(
            &store,
            &[domain().with("type", "SLAVE")],
            diff("type", None, Some("SLAVE")),
        )
        .await
        .unwrap();

        let zone = store.domain(1).await.unwrap();
        assert_eq!((zone.name.as_str(), zone.kind.as_str()), ("example.com", "SLAVE"));
    }

    #[tokio::test]
    async fn test_soa_change_propagates_to_paired_rows() {
        let store = created(vec![domain(), record()]).await;

        updated(
            &store,
            &[domain().with("soa", NEW_SOA), record()],
            diff("soa", Some(SOA), Some(NEW_SOA)),
        )
        .await
        .unwrap();

        let soa = store
            .records(&RecordFilter::new().domain(1).record_type(RecordType::SOA))
            .await;
        assert_eq!(soa.len(), 2);
        assert!(soa.iter().all(|row| row.content == NEW_SOA));
        assert_eq!(apex(&store, RecordType::SOA).await, vec![NEW_SOA]);
    }

    #[tokio::test]
    async fn test_nameserver_sync() {
        let store = created(vec![domain()]).await;

        let mut changes = ObjectChanges::new();
        changes.insert(
            "ns".to_string(),
            AttributeDiff::multi(["ns3.example.com"], ["ns1.example.com"]),
        );
        updated(
            &store,
            &[domain().with(
                "ns",
                AttributeValue::multi(["ns2.example.com", "ns3.example.com"]),
            )],
            changes,
        )
        .await
        .unwrap();

        assert_eq!(
            apex(&store, RecordType::NS).await,
            vec!["ns2.example.com", "ns3.example.com"]
        );
    }

    #[tokio::test]
    async fn test_changed_domain_without_zone_is_created() {
        let store = MemoryRecordStore::new();

        updated(&store, &[domain()], diff("soa", None, Some(SOA)))
            .await
            .unwrap();

        assert!(store.domain(1).await.is_some());
        assert_eq!(apex(&store, RecordType::SOA).await, vec![SOA]);
    }

    #[tokio::test]
    async fn test_delete_zone_cascades() {
        let store = created(vec![domain(), record()]).await;

        let mut tx = store.begin().await.unwrap();
        domains::delete(tx.as_mut(), &BTreeSet::from([1, 99]))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store.domains().await.is_empty());
        assert!(store.all_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_domain_changes_are_ignored() {
        let store = created(vec![domain(), record()]).await;
        let before = store.all_records().await;

        let mapping = mapping();
        let inventory = inventory_of(&[domain(), record().with("intern_ip", "10.0.0.2")]).await;
        let mut event = ChangeEvent::new(2);
        event.changed = BTreeMap::from([(
            2 as ObjectId,
            diff("intern_ip", Some("10.0.0.1"), Some("10.0.0.2")),
        )]);
        let mut ctx = EventContext::new(&mapping, &inventory, &event, 20);
        let mut tx = store.begin().await.unwrap();
        domains::update(&mut ctx, tx.as_mut(), &event.changed)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.all_records().await, before);
    }
}
