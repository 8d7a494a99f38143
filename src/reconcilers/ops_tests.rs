// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for row-level operations.

#[cfg(test)]
mod tests {
    use crate::dns_errors::{ReconcileError, ResolutionError};
    use crate::reconcilers::context::Anchor;
    use crate::reconcilers::ops::*;
    use crate::repository::memory::MemoryRecordStore;
    use crate::repository::{
        DerivedDomain, DerivedRecord, RecordFilter, RecordStore, RecordTransaction,
    };
    use hickory_proto::rr::RecordType;

    const SOA: &str = "ns1.example.com hostmaster.example.com 1 900 3600 900 300";

    fn anchor() -> Anchor {
        Anchor {
            record_id: 2,
            hostname: "www.example.com".to_string(),
            domain_id: 1,
            soa: SOA.to_string(),
            ttl: 300,
        }
    }

    async fn open() -> (MemoryRecordStore, Box<dyn RecordTransaction>) {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_domain(DerivedDomain {
            id: 1,
            name: "example.com".to_string(),
            kind: "NATIVE".to_string(),
        })
        .await
        .unwrap();
        (store, tx)
    }

    async fn rows(tx: &mut dyn RecordTransaction, record_type: RecordType) -> Vec<DerivedRecord> {
        tx.filter(&RecordFilter::new().record_type(record_type))
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address(2, "intern_ip", RecordType::A, "10.0.0.1").unwrap(),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(
            parse_address(2, "mx", RecordType::MX, "10 mail.example.com").unwrap(),
            None
        );
        assert!(matches!(
            parse_address(2, "intern_ip", RecordType::A, "::1"),
            Err(ResolutionError::InvalidAttribute { reason, .. }) if reason.contains("IPv4")
        ));
        assert!(parse_address(2, "ipv6", RecordType::AAAA, "10.0.0.1").is_err());
        assert!(parse_address(2, "intern_ip", RecordType::A, "nope").is_err());
    }

    #[tokio::test]
    async fn test_create_forward_writes_reverse_pair() {
        let (_store, mut tx) = open().await;

        let written = create_forward(
            tx.as_mut(),
            &anchor(),
            2,
            "intern_ip",
            RecordType::A,
            "10.0.0.1",
            100,
        )
        .await
        .unwrap();
        assert!(written);

        let a = rows(tx.as_mut(), RecordType::A).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].name, "www.example.com");
        assert_eq!(a[0].ttl, 300);

        let ptr = rows(tx.as_mut(), RecordType::PTR).await;
        assert_eq!(ptr.len(), 1);
        assert_eq!(ptr[0].name, "1.0.0.10.in-addr.arpa");
        assert_eq!(ptr[0].content, "www.example.com");
        assert_eq!((ptr[0].object_id, ptr[0].record_id, ptr[0].domain_id), (2, 2, 1));

        let soa = rows(tx.as_mut(), RecordType::SOA).await;
        assert_eq!(soa.len(), 1);
        assert_eq!(soa[0].name, "1.0.0.10.in-addr.arpa");
        assert_eq!(soa[0].content, SOA);
        assert_eq!(soa[0].ttl, 300);
    }

    #[tokio::test]
    async fn test_create_forward_is_idempotent() {
        let (_store, mut tx) = open().await;
        let anchor = anchor();

        for _ in 0..2 {
            create_forward(tx.as_mut(), &anchor, 2, "ipv6", RecordType::AAAA, "2001:db8::1", 0)
                .await
                .unwrap();
        }
        let again = create_forward(
            tx.as_mut(),
            &anchor,
            2,
            "ipv6",
            RecordType::AAAA,
            "2001:db8::1",
            0,
        )
        .await
        .unwrap();

        assert!(!again);
        assert_eq!(tx.filter(&RecordFilter::new()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_address_writes_nothing() {
        let (_store, mut tx) = open().await;

        let result = create_forward(
            tx.as_mut(),
            &anchor(),
            2,
            "intern_ip",
            RecordType::A,
            "not-an-ip",
            0,
        )
        .await;
        assert!(matches!(
            result,
            Err(ReconcileError::Resolution(ResolutionError::InvalidAttribute { .. }))
        ));
        assert!(tx.filter(&RecordFilter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_forward_removes_pair() {
        let (_store, mut tx) = open().await;
        let anchor = anchor();
        create_forward(tx.as_mut(), &anchor, 2, "intern_ip", RecordType::A, "10.0.0.1", 0)
            .await
            .unwrap();
        create_forward(tx.as_mut(), &anchor, 2, "mx", RecordType::MX, "10 mail.example.com", 0)
            .await
            .unwrap();

        let deleted = delete_forward(
            tx.as_mut(),
            &RecordFilter::new().record(2).record_type(RecordType::A),
        )
        .await
        .unwrap();
        assert_eq!(deleted, 1);

        let remaining = tx.filter(&RecordFilter::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_type, RecordType::MX);
    }

    #[tokio::test]
    async fn test_upsert_forward_moves_reverse_pair() {
        let (_store, mut tx) = open().await;
        let anchor = anchor();
        upsert_forward(tx.as_mut(), &anchor, 2, "intern_ip", RecordType::A, "10.0.0.1", 0)
            .await
            .unwrap();
        upsert_forward(tx.as_mut(), &anchor, 2, "intern_ip", RecordType::A, "10.0.0.2", 50)
            .await
            .unwrap();

        let a = rows(tx.as_mut(), RecordType::A).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "10.0.0.2");

        let pair = tx
            .filter(&RecordFilter::new().record_types([RecordType::PTR, RecordType::SOA]))
            .await
            .unwrap();
        assert_eq!(pair.len(), 2);
        assert!(pair
            .iter()
            .all(|row| row.name == "2.0.0.10.in-addr.arpa" && row.change_date == 50));
    }

    #[tokio::test]
    async fn test_override_bookkeeping() {
        let (_store, mut tx) = open().await;
        let anchor = anchor();
        create_forward(tx.as_mut(), &anchor, 2, "mx", RecordType::MX, "10 mail.example.com", 0)
            .await
            .unwrap();
        assert!(!override_active(tx.as_mut(), 2, RecordType::MX).await.unwrap());

        create_forward(tx.as_mut(), &anchor, 3, "mx", RecordType::MX, "20 mail.example.com", 0)
            .await
            .unwrap();
        assert!(override_active(tx.as_mut(), 2, RecordType::MX).await.unwrap());

        let suppressed = suppress_baseline(tx.as_mut(), 2, RecordType::MX).await.unwrap();
        assert_eq!(suppressed, 1);

        let mx = rows(tx.as_mut(), RecordType::MX).await;
        assert_eq!(mx.len(), 1);
        assert_eq!(mx[0].object_id, 3);
        assert_eq!(mx[0].content, "20 mail.example.com");
    }
}
