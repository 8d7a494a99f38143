// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Changed phase of record reconciliation.
//!
//! For every changed object the structural columns are handled first (hostname,
//! TTL and domain of record objects, relation changes of holders), then every
//! changed mapped attribute is applied as one unit against each affected anchor.

use crate::constants::ATTR_HOSTNAME;
use crate::dns_errors::{ReconcileError, ResolutionError};
use crate::event::{AttributeDiff, ObjectChanges};
use crate::inventory::{InventoryObject, ObjectId, Scalar};
use crate::reconcilers::context::{Anchor, EventContext};
use crate::reconcilers::ops::{
    attach_holder, create_forward, delete_forward, materialize_record, override_active,
    restore_baseline, suppress_baseline, upsert_forward,
};
use crate::repository::{RecordFilter, RecordPatch, RecordTransaction};
use hickory_proto::rr::RecordType;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// The anchor a diff is applied against, and who owns the resulting rows.
struct Target<'o> {
    anchor: Anchor,
    owner: &'o InventoryObject,
    /// The related record when `owner` is a relation holder
    record: Option<&'o InventoryObject>,
}

/// Apply the attribute diffs of one commit.
///
/// # Errors
///
/// Returns an error if a changed or related object cannot be resolved, or if the
/// store rejects a mutation. Errors name the object and attribute being applied.
pub async fn update(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    changed: &BTreeMap<ObjectId, ObjectChanges>,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    ctx.prefetch(
        changed
            .iter()
            .filter(|(_, changes)| mapping.affects_records(changes))
            .map(|(object_id, _)| *object_id),
    )
    .await?;

    for (object_id, changes) in changed {
        if ctx.is_deleted(*object_id) {
            debug!(object_id, "Skipping changes of an object deleted in the same commit");
            continue;
        }
        if !mapping.affects_records(changes) {
            continue;
        }

        let object = ctx.object(*object_id).await?;
        if object.servertype == mapping.domain_servertype() {
            continue;
        }

        let mut attached = BTreeSet::new();
        if object.servertype == mapping.record_servertype() {
            update_record_columns(ctx, tx, &object, changes).await?;
        } else if let Some(diff) = changes.get(mapping.relation_attribute()) {
            attached = apply_relation(ctx, tx, &object, diff)
                .await
                .map_err(|e| e.with_context(*object_id, mapping.relation_attribute()))?;
        }

        for (attribute, diff) in changes {
            let Some(record_type) = mapping.record_type_for(attribute) else {
                continue;
            };
            apply_mapped(ctx, tx, &object, record_type, attribute, diff, &attached)
                .await
                .map_err(|e| e.with_context(*object_id, attribute))?;
        }
    }

    Ok(())
}

/// Hostname, TTL and domain changes of a record object.
async fn update_record_columns(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    record: &InventoryObject,
    changes: &ObjectChanges,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let now = ctx.now();
    let record_id = record.object_id;

    if changes.contains_key(ATTR_HOSTNAME) {
        let forward = tx
            .update_where(
                &RecordFilter::new()
                    .record(record_id)
                    .excluding([RecordType::SOA, RecordType::PTR]),
                &RecordPatch::touched(now).name(record.hostname.clone()),
            )
            .await?;
        let pointers = tx
            .update_where(
                &RecordFilter::new().record(record_id).record_type(RecordType::PTR),
                &RecordPatch::touched(now).content(record.hostname.clone()),
            )
            .await?;
        info!(
            record_id,
            hostname = %record.hostname,
            forward,
            pointers,
            "Renamed record rows"
        );
    }

    let ttl_attribute = mapping.ttl_attribute();
    if changes.contains_key(ttl_attribute) {
        let ttl = ctx
            .ttl(record)
            .map_err(|e| ReconcileError::from(e).with_context(record_id, ttl_attribute))?;
        let updated = tx
            .update_where(
                &RecordFilter::new().record(record_id),
                &RecordPatch::touched(now).ttl(ttl),
            )
            .await?;
        debug!(record_id, ttl, updated, "Updated record TTL");
    }

    let domain_attribute = mapping.domain_relation_attribute();
    if changes.contains_key(domain_attribute) {
        move_record(ctx, tx, record)
            .await
            .map_err(|e| e.with_context(record_id, domain_attribute))?;
    }

    Ok(())
}

/// Move every row anchored at `record` into its current zone.
async fn move_record(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    record: &InventoryObject,
) -> Result<(), ReconcileError> {
    let anchor = ctx.anchor(record).await?;
    let now = ctx.now();

    let moved = tx
        .update_where(
            &RecordFilter::new().record(anchor.record_id),
            &RecordPatch::touched(now).domain(anchor.domain_id),
        )
        .await?;

    // Reverse-paired SOA rows carry the zone's SOA and are named by reverse names.
    let paired: BTreeSet<String> = tx
        .filter(
            &RecordFilter::new()
                .record(anchor.record_id)
                .record_type(RecordType::SOA),
        )
        .await?
        .into_iter()
        .map(|row| row.name)
        .filter(|name| *name != anchor.hostname)
        .collect();
    for name in paired {
        tx.update_where(
            &RecordFilter::new()
                .record(anchor.record_id)
                .record_type(RecordType::SOA)
                .name(name),
            &RecordPatch::touched(now).content(anchor.soa.clone()),
        )
        .await?;
    }

    info!(
        record_id = anchor.record_id,
        domain_id = anchor.domain_id,
        moved,
        "Moved record rows to new zone"
    );
    Ok(())
}

fn values(scalars: &BTreeSet<Scalar>) -> Vec<String> {
    scalars
        .iter()
        .map(ToString::to_string)
        .filter(|value| !value.is_empty())
        .collect()
}

/// Apply a relation change of a holder. Returns the ids of newly related records.
async fn apply_relation(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    holder: &InventoryObject,
    diff: &AttributeDiff,
) -> Result<BTreeSet<ObjectId>, ReconcileError> {
    let (added, removed) = match diff {
        AttributeDiff::Multi { add, remove } => (values(add), values(remove)),
        AttributeDiff::Update { old, new } => (
            new.iter().map(ToString::to_string).collect(),
            old.iter().map(ToString::to_string).collect(),
        ),
    };

    for hostname in &removed {
        match ctx.find_record(hostname).await? {
            Some(record) => {
                let deleted = delete_forward(
                    tx,
                    &RecordFilter::new()
                        .object(holder.object_id)
                        .record(record.object_id),
                )
                .await?;
                debug!(
                    object_id = holder.object_id,
                    record_id = record.object_id,
                    deleted,
                    "Detached object from record"
                );
                materialize_record(ctx, tx, &record).await?;
            }
            // Rows of a record deleted by this commit are removed by the delete phase.
            None if ctx.has_deletions() => {
                debug!(hostname = %hostname, "Removed relation names a deleted record");
            }
            None => {
                return Err(ResolutionError::HostnameNotFound {
                    hostname: hostname.clone(),
                    servertype: ctx.mapping().record_servertype().to_string(),
                }
                .into())
            }
        }
    }

    let mut attached = BTreeSet::new();
    for hostname in &added {
        let record = ctx.record(hostname).await?;
        debug!(
            object_id = holder.object_id,
            record_id = record.object_id,
            "Attaching object to record"
        );
        attach_holder(ctx, tx, holder, &record).await?;
        attached.insert(record.object_id);
    }
    Ok(attached)
}

/// Apply one mapped attribute diff of a record object or a relation holder.
async fn apply_mapped(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    object: &InventoryObject,
    record_type: RecordType,
    attribute: &str,
    diff: &AttributeDiff,
    attached: &BTreeSet<ObjectId>,
) -> Result<(), ReconcileError> {
    if object.servertype == ctx.mapping().record_servertype() {
        if override_active(tx, object.object_id, record_type).await? {
            debug!(
                record_id = object.object_id,
                %record_type,
                "Record value superseded by an override, nothing to write"
            );
            return Ok(());
        }
        let target = Target {
            anchor: ctx.anchor(object).await?,
            owner: object,
            record: None,
        };
        return apply_diff(ctx, tx, &target, record_type, attribute, diff).await;
    }

    let related = ctx.related_records(object).await?;
    for record in related
        .iter()
        .filter(|record| !attached.contains(&record.object_id))
    {
        let target = Target {
            anchor: ctx.anchor(record).await?,
            owner: object,
            record: Some(record),
        };
        apply_diff(ctx, tx, &target, record_type, attribute, diff).await?;
    }
    Ok(())
}

async fn apply_diff(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    target: &Target<'_>,
    record_type: RecordType,
    attribute: &str,
    diff: &AttributeDiff,
) -> Result<(), ReconcileError> {
    let now = ctx.now();
    let owner_id = target.owner.object_id;
    let record_id = target.anchor.record_id;
    let key = RecordFilter::new()
        .object(owner_id)
        .record(record_id)
        .record_type(record_type);

    match diff {
        AttributeDiff::Update { new, .. } => {
            let content = new
                .as_ref()
                .map(ToString::to_string)
                .filter(|value| !value.is_empty());
            match content {
                None => {
                    let deleted = delete_forward(tx, &key).await?;
                    debug!(owner_id, record_id, %record_type, deleted, "Cleared value");
                    if let Some(record) = target.record {
                        restore_baseline(ctx, tx, record, record_type, attribute).await?;
                    }
                }
                Some(content) => {
                    upsert_forward(
                        tx,
                        &target.anchor,
                        owner_id,
                        attribute,
                        record_type,
                        &content,
                        now,
                    )
                    .await?;
                    if target.record.is_some() {
                        suppress_baseline(tx, record_id, record_type).await?;
                    }
                }
            }
        }
        AttributeDiff::Multi { add, remove } => {
            for content in values(remove) {
                delete_forward(tx, &key.clone().content(content)).await?;
            }
            for content in values(add) {
                create_forward(
                    tx,
                    &target.anchor,
                    owner_id,
                    attribute,
                    record_type,
                    &content,
                    now,
                )
                .await?;
            }

            if let Some(record) = target.record {
                if target.owner.has_values(attribute) {
                    suppress_baseline(tx, record_id, record_type).await?;
                } else {
                    restore_baseline(ctx, tx, record, record_type, attribute).await?;
                }
            }
        }
    }

    Ok(())
}
