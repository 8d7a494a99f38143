// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Delete phase of record reconciliation.

use crate::dns_errors::ReconcileError;
use crate::inventory::ObjectId;
use crate::metrics;
use crate::reconcilers::context::EventContext;
use crate::reconcilers::ops::materialize_record;
use crate::repository::{RecordFilter, RecordTransaction};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Remove every row owned or anchored by a deleted object.
///
/// Records that lost an override because its holder was deleted get their own
/// rows back once the holder's rows are gone.
///
/// # Errors
///
/// Returns an error if a surviving record cannot be re-anchored or the store
/// rejects a mutation.
pub async fn delete(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    deleted: &BTreeSet<ObjectId>,
) -> Result<(), ReconcileError> {
    if deleted.is_empty() {
        return Ok(());
    }

    let rows = tx
        .delete_where(&RecordFilter::new().involving(deleted.iter().copied()))
        .await?;
    for row in &rows {
        metrics::record_mutation(&row.record_type.to_string(), "delete", 1);
    }

    let restore: BTreeSet<ObjectId> = rows
        .iter()
        .filter(|row| row.is_override() && !deleted.contains(&row.record_id))
        .map(|row| row.record_id)
        .collect();

    info!(
        objects = deleted.len(),
        rows = rows.len(),
        restored = restore.len(),
        "Removed rows of deleted objects"
    );

    for record_id in restore {
        let record = ctx.object(record_id).await?;
        debug!(record_id, "Restoring record rows after override removal");
        materialize_record(ctx, tx, &record).await?;
    }

    Ok(())
}
