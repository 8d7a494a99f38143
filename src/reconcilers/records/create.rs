// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Create phase of record reconciliation.

use crate::dns_errors::ReconcileError;
use crate::inventory::InventoryObject;
use crate::reconcilers::context::EventContext;
use crate::reconcilers::ops::{attach_holder, materialize_record};
use crate::repository::RecordTransaction;
use tracing::debug;

/// Apply the objects created by one commit.
///
/// Record objects are anchored first so holders created in the same commit can
/// relate to them. A holder created with a relation writes its own mapped values
/// for every related record, superseding the record's rows of those types.
///
/// # Errors
///
/// Returns an error if a related record or a domain cannot be resolved, or if the
/// store rejects a mutation.
pub async fn create(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    created: &[InventoryObject],
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    ctx.remember_all(created);

    for record in created
        .iter()
        .filter(|object| object.servertype == mapping.record_servertype())
    {
        debug!(object_id = record.object_id, hostname = %record.hostname, "Anchoring new record");
        materialize_record(ctx, tx, record).await?;
    }

    for holder in created.iter().filter(|object| {
        object.servertype != mapping.record_servertype()
            && object.servertype != mapping.domain_servertype()
            && object.has_values(mapping.relation_attribute())
    }) {
        let related = ctx.related_records(holder).await.map_err(|e| {
            ReconcileError::from(e).with_context(holder.object_id, mapping.relation_attribute())
        })?;
        for record in &related {
            debug!(
                object_id = holder.object_id,
                record_id = record.object_id,
                "Attaching new object to record"
            );
            attach_holder(ctx, tx, holder, record).await?;
        }
    }

    Ok(())
}
