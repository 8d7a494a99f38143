// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Row-level operations shared by the record and domain reconcilers.
//!
//! Forward rows of type A and AAAA are always written together with their reverse
//! pair: one PTR row (content = the anchor's hostname) and one SOA row (content =
//! the zone's SOA), both named by the reverse-DNS name of the address and sharing
//! the forward row's `object_id` and `record_id`. Every helper here keeps that
//! pairing intact.

use super::context::{Anchor, EventContext};
use crate::dns_errors::{ReconcileError, ResolutionError};
use crate::inventory::{InventoryObject, ObjectId};
use crate::metrics;
use crate::repository::{NewRecord, RecordFilter, RecordPatch, RecordTransaction, Upserted};
use crate::reverse::reverse_pointer;
use hickory_proto::rr::RecordType;
use std::net::IpAddr;
use tracing::debug;

/// True for record types whose content is an address with a reverse pair.
pub fn is_address(record_type: RecordType) -> bool {
    matches!(record_type, RecordType::A | RecordType::AAAA)
}

/// Parse the content of an address row.
///
/// Returns `None` for record types without a reverse pair.
///
/// # Errors
///
/// Returns [`ResolutionError::InvalidAttribute`] if an A value is not IPv4 or an
/// AAAA value is not IPv6.
pub fn parse_address(
    object_id: ObjectId,
    attribute: &str,
    record_type: RecordType,
    content: &str,
) -> Result<Option<IpAddr>, ResolutionError> {
    if !is_address(record_type) {
        return Ok(None);
    }

    let invalid = |reason: &str| ResolutionError::InvalidAttribute {
        object_id,
        attribute: attribute.to_string(),
        value: content.to_string(),
        reason: reason.to_string(),
    };

    let addr: IpAddr = content
        .trim()
        .parse()
        .map_err(|_| invalid("not an IP address"))?;
    match (record_type, addr) {
        (RecordType::A, IpAddr::V4(_)) | (RecordType::AAAA, IpAddr::V6(_)) => Ok(Some(addr)),
        (RecordType::A, _) => Err(invalid("A records need an IPv4 address")),
        _ => Err(invalid("AAAA records need an IPv6 address")),
    }
}

/// Reverse name of a stored address row, or `None` if it holds no address.
fn stored_reverse(record_type: RecordType, content: &str) -> Option<String> {
    if !is_address(record_type) {
        return None;
    }
    content.trim().parse::<IpAddr>().ok().map(reverse_pointer)
}

fn pair_filter(object_id: ObjectId, record_id: ObjectId, reverse: &str) -> RecordFilter {
    RecordFilter::new()
        .object(object_id)
        .record(record_id)
        .record_types([RecordType::PTR, RecordType::SOA])
        .name(reverse)
}

fn new_row(
    anchor: &Anchor,
    owner: ObjectId,
    name: &str,
    record_type: RecordType,
    content: &str,
    now: i64,
) -> NewRecord {
    NewRecord {
        domain_id: anchor.domain_id,
        object_id: owner,
        record_id: anchor.record_id,
        name: name.to_string(),
        record_type,
        content: content.to_string(),
        ttl: anchor.ttl,
        change_date: now,
    }
}

async fn create_pair(
    tx: &mut dyn RecordTransaction,
    anchor: &Anchor,
    owner: ObjectId,
    addr: IpAddr,
    now: i64,
) -> Result<(), ReconcileError> {
    let reverse = reverse_pointer(addr);
    tx.create(new_row(anchor, owner, &reverse, RecordType::PTR, &anchor.hostname, now))
        .await?;
    tx.create(new_row(anchor, owner, &reverse, RecordType::SOA, &anchor.soa, now))
        .await?;
    metrics::record_mutation("PTR", "create", 1);
    metrics::record_mutation("SOA", "create", 1);
    Ok(())
}

/// Create one forward row (and its reverse pair) unless an identical one exists.
///
/// Returns true if a row was written.
///
/// # Errors
///
/// Returns an error for malformed address content or a rejected mutation.
pub async fn create_forward(
    tx: &mut dyn RecordTransaction,
    anchor: &Anchor,
    owner: ObjectId,
    attribute: &str,
    record_type: RecordType,
    content: &str,
    now: i64,
) -> Result<bool, ReconcileError> {
    let addr = parse_address(owner, attribute, record_type, content)?;

    let existing = RecordFilter::new()
        .object(owner)
        .record(anchor.record_id)
        .record_type(record_type)
        .content(content);
    if !tx.filter(&existing).await?.is_empty() {
        debug!(owner, record_id = anchor.record_id, %record_type, content, "Row already present");
        return Ok(false);
    }

    tx.create(new_row(anchor, owner, &anchor.hostname, record_type, content, now))
        .await?;
    metrics::record_mutation(&record_type.to_string(), "create", 1);
    debug!(owner, record_id = anchor.record_id, %record_type, content, "Created row");

    if let Some(addr) = addr {
        create_pair(tx, anchor, owner, addr, now).await?;
    }
    Ok(true)
}

/// Delete matching forward rows together with the reverse pairs of address rows.
///
/// Returns the number of forward rows deleted.
///
/// # Errors
///
/// Returns an error if the store rejects a deletion.
pub async fn delete_forward(
    tx: &mut dyn RecordTransaction,
    filter: &RecordFilter,
) -> Result<usize, ReconcileError> {
    let deleted = tx.delete_where(filter).await?;

    for row in &deleted {
        metrics::record_mutation(&row.record_type.to_string(), "delete", 1);
        if let Some(reverse) = stored_reverse(row.record_type, &row.content) {
            let pairs = tx
                .delete_where(&pair_filter(row.object_id, row.record_id, &reverse))
                .await?;
            for pair in &pairs {
                metrics::record_mutation(&pair.record_type.to_string(), "delete", 1);
            }
        }
        debug!(
            owner = row.object_id,
            record_id = row.record_id,
            record_type = %row.record_type,
            content = %row.content,
            "Deleted row"
        );
    }
    Ok(deleted.len())
}

/// Create or update the single row of (`owner`, anchor record, `record_type`).
///
/// When an address changes, the reverse pair is renamed to the new reverse name.
///
/// # Errors
///
/// Returns an error for malformed address content or a rejected mutation.
pub async fn upsert_forward(
    tx: &mut dyn RecordTransaction,
    anchor: &Anchor,
    owner: ObjectId,
    attribute: &str,
    record_type: RecordType,
    content: &str,
    now: i64,
) -> Result<(), ReconcileError> {
    let addr = parse_address(owner, attribute, record_type, content)?;
    let row = new_row(anchor, owner, &anchor.hostname, record_type, content, now);

    match tx.upsert(&row.key(), row).await? {
        Upserted::Created(_) => {
            metrics::record_mutation(&record_type.to_string(), "create", 1);
            if let Some(addr) = addr {
                create_pair(tx, anchor, owner, addr, now).await?;
            }
        }
        Upserted::Updated(previous) => {
            metrics::record_mutation(&record_type.to_string(), "update", previous.len());
            let Some(addr) = addr else {
                return Ok(());
            };

            let reverse = reverse_pointer(addr);
            let mut renamed = 0;
            for old in &previous {
                if let Some(old_reverse) = stored_reverse(old.record_type, &old.content) {
                    let patch = RecordPatch::touched(now)
                        .name(reverse.clone())
                        .ttl(anchor.ttl);
                    renamed += tx
                        .update_where(&pair_filter(owner, anchor.record_id, &old_reverse), &patch)
                        .await?;
                }
            }
            if renamed == 0 {
                create_pair(tx, anchor, owner, addr, now).await?;
            } else {
                metrics::record_mutation("PTR", "update", renamed / 2);
                metrics::record_mutation("SOA", "update", renamed - renamed / 2);
            }
        }
    }
    debug!(owner, record_id = anchor.record_id, %record_type, content, "Upserted row");
    Ok(())
}

/// True if an object other than the record itself owns rows of `record_type`
/// anchored at `record_id`.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn override_active(
    tx: &mut dyn RecordTransaction,
    record_id: ObjectId,
    record_type: RecordType,
) -> Result<bool, ReconcileError> {
    let rows = tx
        .filter(&RecordFilter::new().record(record_id).record_type(record_type))
        .await?;
    Ok(rows.iter().any(|row| row.object_id != record_id))
}

/// Delete the record-owned rows of `record_type` that an override supersedes.
///
/// # Errors
///
/// Returns an error if the store rejects a deletion.
pub async fn suppress_baseline(
    tx: &mut dyn RecordTransaction,
    record_id: ObjectId,
    record_type: RecordType,
) -> Result<usize, ReconcileError> {
    let filter = RecordFilter::new()
        .object(record_id)
        .record(record_id)
        .record_type(record_type);
    delete_forward(tx, &filter).await
}

/// Write the record object's own rows of one mapped type, unless an override is
/// active for that type.
///
/// # Errors
///
/// Returns an error if the record cannot be anchored or a mutation is rejected.
pub async fn restore_baseline(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    record: &InventoryObject,
    record_type: RecordType,
    attribute: &str,
) -> Result<(), ReconcileError> {
    let contents = record.contents(attribute);
    if contents.is_empty() || override_active(tx, record.object_id, record_type).await? {
        return Ok(());
    }

    let anchor = ctx.anchor(record).await?;
    let now = ctx.now();
    for content in &contents {
        create_forward(
            tx,
            &anchor,
            record.object_id,
            attribute,
            record_type,
            content,
            now,
        )
        .await?;
    }
    Ok(())
}

/// Write every mapped row the record object owns, skipping overridden types.
///
/// # Errors
///
/// Returns an error if the record cannot be anchored or a mutation is rejected.
pub async fn materialize_record(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    record: &InventoryObject,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    for (record_type, attribute) in mapping.mapped() {
        restore_baseline(ctx, tx, record, *record_type, attribute)
            .await
            .map_err(|e| e.with_context(record.object_id, attribute))?;
    }
    Ok(())
}

/// Write a relation holder's own mapped values for one related record,
/// superseding the record's rows for every type the holder sets.
///
/// # Errors
///
/// Returns an error if the record cannot be anchored or a mutation is rejected.
pub async fn attach_holder(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    holder: &InventoryObject,
    record: &InventoryObject,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let anchor = ctx.anchor(record).await?;
    let now = ctx.now();

    for (record_type, attribute) in mapping.mapped() {
        let contents = holder.contents(attribute);
        if contents.is_empty() {
            continue;
        }
        override_with(tx, &anchor, holder.object_id, attribute, *record_type, &contents, now)
            .await
            .map_err(|e| e.with_context(holder.object_id, attribute))?;
    }
    Ok(())
}

async fn override_with(
    tx: &mut dyn RecordTransaction,
    anchor: &Anchor,
    holder_id: ObjectId,
    attribute: &str,
    record_type: RecordType,
    contents: &[String],
    now: i64,
) -> Result<(), ReconcileError> {
    suppress_baseline(tx, anchor.record_id, record_type).await?;
    for content in contents {
        create_forward(tx, anchor, holder_id, attribute, record_type, content, now).await?;
    }
    Ok(())
}
