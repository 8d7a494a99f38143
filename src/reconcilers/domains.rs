// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain lifecycle reconciliation.
//!
//! A domain object owns one zone row and the zone's apex rows: one SOA row and one
//! NS row per nameserver, all with `object_id = record_id = domain_id` = the domain
//! object's id. Hostname renames fan out to every row of the zone, SOA changes
//! propagate to the PTR-paired SOA rows of the zone.

use super::context::{Anchor, EventContext};
use super::ops::{create_forward, delete_forward, upsert_forward};
use crate::constants::ATTR_HOSTNAME;
use crate::dns_errors::ReconcileError;
use crate::event::ObjectChanges;
use crate::inventory::{InventoryObject, ObjectId};
use crate::repository::{DerivedDomain, RecordFilter, RecordPatch, RecordTransaction};
use hickory_proto::rr::RecordType;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

fn apex_anchor(ctx: &EventContext<'_>, domain: &InventoryObject) -> Anchor {
    let mapping = ctx.mapping();
    Anchor {
        record_id: domain.object_id,
        hostname: domain.hostname.clone(),
        domain_id: domain.object_id,
        soa: domain
            .first_content(mapping.domain_soa_attribute())
            .unwrap_or_else(|| mapping.default_soa().to_string()),
        ttl: mapping.default_ttl(),
    }
}

fn zone_kind(ctx: &EventContext<'_>, domain: &InventoryObject) -> String {
    let mapping = ctx.mapping();
    domain
        .first_content(mapping.domain_type_attribute())
        .unwrap_or_else(|| mapping.default_domain_kind().to_string())
}

fn nameservers(ctx: &EventContext<'_>, domain: &InventoryObject) -> Vec<String> {
    let mapping = ctx.mapping();
    let values = domain.contents(mapping.domain_ns_attribute());
    if values.is_empty() {
        mapping.default_ns().to_vec()
    } else {
        values
    }
}

/// Create the zone row and apex rows of a domain.
async fn create_zone(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    domain: &InventoryObject,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let now = ctx.now();
    let anchor = apex_anchor(ctx, domain);

    tx.upsert_domain(DerivedDomain {
        id: domain.object_id,
        name: domain.hostname.clone(),
        kind: zone_kind(ctx, domain),
    })
    .await?;

    create_forward(
        tx,
        &anchor,
        domain.object_id,
        mapping.domain_soa_attribute(),
        RecordType::SOA,
        &anchor.soa,
        now,
    )
    .await
    .map_err(|e| e.with_context(domain.object_id, mapping.domain_soa_attribute()))?;

    for ns in nameservers(ctx, domain) {
        create_forward(
            tx,
            &anchor,
            domain.object_id,
            mapping.domain_ns_attribute(),
            RecordType::NS,
            &ns,
            now,
        )
        .await
        .map_err(|e| e.with_context(domain.object_id, mapping.domain_ns_attribute()))?;
    }

    info!(
        domain_id = domain.object_id,
        name = %domain.hostname,
        "Created zone"
    );
    Ok(())
}

/// Create zones for the domain objects of a commit.
///
/// # Errors
///
/// Returns an error if the store rejects the zone or one of its rows.
pub async fn create(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    created: &[InventoryObject],
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    for domain in created
        .iter()
        .filter(|object| object.servertype == mapping.domain_servertype())
    {
        create_zone(ctx, tx, domain).await?;
    }
    Ok(())
}

/// Apply hostname, zone type, SOA and NS changes of domain objects.
///
/// # Errors
///
/// Returns an error if a domain cannot be resolved or the store rejects a mutation.
pub async fn update(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    changed: &BTreeMap<ObjectId, ObjectChanges>,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let relevant: BTreeMap<ObjectId, &ObjectChanges> = changed
        .iter()
        .filter(|(object_id, changes)| {
            !ctx.is_deleted(**object_id) && mapping.affects_domains(changes)
        })
        .map(|(object_id, changes)| (*object_id, changes))
        .collect();
    ctx.prefetch_domains(relevant.keys().copied()).await?;

    for (object_id, changes) in relevant {
        let domain = ctx.domain(object_id).await?;
        if domain.servertype != mapping.domain_servertype() {
            continue;
        }

        let Some(zone) = tx.domain(domain.object_id).await? else {
            warn!(
                domain_id = domain.object_id,
                name = %domain.hostname,
                "Changed domain has no zone, creating it"
            );
            create_zone(ctx, tx, &domain).await?;
            continue;
        };

        if changes.contains_key(ATTR_HOSTNAME)
            || changes.contains_key(mapping.domain_type_attribute())
        {
            update_zone(ctx, tx, &domain, zone).await?;
        }

        if changes.contains_key(mapping.domain_soa_attribute()) {
            update_soa(ctx, tx, &domain)
                .await
                .map_err(|e| e.with_context(domain.object_id, mapping.domain_soa_attribute()))?;
        }

        if changes.contains_key(mapping.domain_ns_attribute()) {
            sync_nameservers(ctx, tx, &domain)
                .await
                .map_err(|e| e.with_context(domain.object_id, mapping.domain_ns_attribute()))?;
        }
    }
    Ok(())
}

/// Bring the zone row in line with the domain's hostname and type.
///
/// A rename also renames every row of the zone named after the old zone name and
/// refreshes the change timestamp of every row of the zone.
async fn update_zone(
    ctx: &EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    domain: &InventoryObject,
    zone: DerivedDomain,
) -> Result<(), ReconcileError> {
    let now = ctx.now();
    let old_name = zone.name.clone();
    let updated = DerivedDomain {
        name: domain.hostname.clone(),
        kind: zone_kind(ctx, domain),
        ..zone
    };
    tx.upsert_domain(updated).await?;

    if old_name == domain.hostname {
        return Ok(());
    }

    let renamed = tx
        .update_where(
            &RecordFilter::new().domain(domain.object_id).name(old_name.clone()),
            &RecordPatch::touched(now).name(domain.hostname.clone()),
        )
        .await?;
    let touched = tx
        .update_where(
            &RecordFilter::new().domain(domain.object_id),
            &RecordPatch::touched(now),
        )
        .await?;
    info!(
        domain_id = domain.object_id,
        old = %old_name,
        new = %domain.hostname,
        renamed,
        touched,
        "Renamed zone"
    );
    Ok(())
}

/// Write the domain's SOA to its apex row and every SOA row of the zone.
async fn update_soa(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    domain: &InventoryObject,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let now = ctx.now();
    let anchor = apex_anchor(ctx, domain);

    upsert_forward(
        tx,
        &anchor,
        domain.object_id,
        mapping.domain_soa_attribute(),
        RecordType::SOA,
        &anchor.soa,
        now,
    )
    .await?;

    let propagated = tx
        .update_where(
            &RecordFilter::new()
                .domain(domain.object_id)
                .record_type(RecordType::SOA),
            &RecordPatch::touched(now).content(anchor.soa.clone()),
        )
        .await?;
    debug!(domain_id = domain.object_id, propagated, "Updated zone SOA");
    Ok(())
}

/// Make the apex NS rows match the domain's nameservers (or the defaults).
async fn sync_nameservers(
    ctx: &mut EventContext<'_>,
    tx: &mut dyn RecordTransaction,
    domain: &InventoryObject,
) -> Result<(), ReconcileError> {
    let mapping = ctx.mapping();
    let now = ctx.now();
    let anchor = apex_anchor(ctx, domain);
    let desired: BTreeSet<String> = nameservers(ctx, domain).into_iter().collect();

    let apex = RecordFilter::new()
        .object(domain.object_id)
        .record(domain.object_id)
        .record_type(RecordType::NS);
    let existing: BTreeSet<String> = tx
        .filter(&apex)
        .await?
        .into_iter()
        .map(|row| row.content)
        .collect();

    for stale in existing.difference(&desired) {
        delete_forward(tx, &apex.clone().content(stale.clone())).await?;
    }
    for ns in desired.difference(&existing) {
        create_forward(
            tx,
            &anchor,
            domain.object_id,
            mapping.domain_ns_attribute(),
            RecordType::NS,
            ns,
            now,
        )
        .await?;
    }
    Ok(())
}

/// Remove the zones of deleted domains; their rows go with them.
///
/// Ids that do not name a zone are ignored.
///
/// # Errors
///
/// Returns an error if the store rejects a deletion.
pub async fn delete(
    tx: &mut dyn RecordTransaction,
    deleted: &BTreeSet<ObjectId>,
) -> Result<(), ReconcileError> {
    for domain_id in deleted {
        if tx.delete_domain(*domain_id).await? {
            info!(domain_id, "Deleted zone");
        }
    }
    Ok(())
}
