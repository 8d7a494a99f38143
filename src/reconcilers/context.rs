// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-event resolution context.
//!
//! Every inventory lookup an event needs goes through [`EventContext`], which
//! caches object snapshots, related-record sets and resolved anchors for the
//! lifetime of one event. Record objects and relation holders are fetched with
//! the record attribute set, domain objects with the domain attribute set, and
//! nothing is fetched by an id the event reports as deleted.

use crate::config::AttributeMapping;
use crate::dns_errors::ResolutionError;
use crate::event::ChangeEvent;
use crate::inventory::{AttributeValue, InventoryObject, InventoryStore, ObjectId, Query, Scalar};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Where the rows of one record object live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// The record object
    pub record_id: ObjectId,
    /// DNS name of the rows (the record object's hostname)
    pub hostname: String,
    /// Owning zone
    pub domain_id: ObjectId,
    /// SOA content of the owning zone, used for PTR-paired SOA rows
    pub soa: String,
    /// TTL of every row anchored here
    pub ttl: u32,
}

#[derive(Debug, Clone)]
struct Zone {
    id: ObjectId,
    soa: String,
}

/// Caches and resolution helpers shared by all phases of one event.
pub struct EventContext<'a> {
    mapping: &'a AttributeMapping,
    inventory: &'a dyn InventoryStore,
    now: i64,
    deleted: BTreeSet<ObjectId>,
    objects: HashMap<ObjectId, InventoryObject>,
    domains: HashMap<ObjectId, InventoryObject>,
    records_by_hostname: HashMap<String, ObjectId>,
    zones: HashMap<String, Zone>,
    related: HashMap<ObjectId, Vec<ObjectId>>,
    anchors: HashMap<ObjectId, Anchor>,
}

impl<'a> EventContext<'a> {
    /// Fresh context for `event`; `now` is the change timestamp of every row touched.
    pub fn new(
        mapping: &'a AttributeMapping,
        inventory: &'a dyn InventoryStore,
        event: &ChangeEvent,
        now: i64,
    ) -> Self {
        Self {
            mapping,
            inventory,
            now,
            deleted: event.deleted.clone(),
            objects: HashMap::new(),
            domains: HashMap::new(),
            records_by_hostname: HashMap::new(),
            zones: HashMap::new(),
            related: HashMap::new(),
            anchors: HashMap::new(),
        }
    }

    /// The attribute mapping.
    pub fn mapping(&self) -> &'a AttributeMapping {
        self.mapping
    }

    /// Change timestamp for rows written by this event.
    pub fn now(&self) -> i64 {
        self.now
    }

    /// True if the event deletes `object_id`.
    pub fn is_deleted(&self, object_id: ObjectId) -> bool {
        self.deleted.contains(&object_id)
    }

    /// True if the event deletes anything.
    pub fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }

    fn remember(&mut self, object: InventoryObject) {
        if object.servertype == self.mapping.record_servertype() {
            self.records_by_hostname
                .insert(object.hostname.clone(), object.object_id);
        }
        self.objects.insert(object.object_id, object);
    }

    /// Seed the caches with snapshots carried by the event itself.
    pub fn remember_all(&mut self, objects: &[InventoryObject]) {
        for object in objects {
            if object.servertype == self.mapping.domain_servertype() {
                self.domains.insert(object.object_id, object.clone());
            }
            self.remember(object.clone());
        }
    }

    fn missing(
        &self,
        ids: impl IntoIterator<Item = ObjectId>,
        cache: &HashMap<ObjectId, InventoryObject>,
    ) -> BTreeSet<ObjectId> {
        ids.into_iter()
            .filter(|id| !cache.contains_key(id) && !self.is_deleted(*id))
            .collect()
    }

    /// Fetch every uncached object of `ids` with one query, projected onto the
    /// record attribute set.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::QueryFailed`] if the inventory cannot answer.
    pub async fn prefetch(
        &mut self,
        ids: impl IntoIterator<Item = ObjectId>,
    ) -> Result<(), ResolutionError> {
        let missing = self.missing(ids, &self.objects);
        if missing.is_empty() {
            return Ok(());
        }

        debug!(count = missing.len(), "Fetching changed objects from inventory");
        let query = Query::by_ids(missing, self.mapping.record_attributes());
        for object in self.inventory.query(&query).await? {
            self.remember(object);
        }
        Ok(())
    }

    /// Like [`EventContext::prefetch`], projected onto the domain attribute set.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::QueryFailed`] if the inventory cannot answer.
    pub async fn prefetch_domains(
        &mut self,
        ids: impl IntoIterator<Item = ObjectId>,
    ) -> Result<(), ResolutionError> {
        let missing = self.missing(ids, &self.domains);
        if missing.is_empty() {
            return Ok(());
        }

        debug!(count = missing.len(), "Fetching changed domains from inventory");
        let query = Query::by_ids(missing, self.mapping.domain_attributes());
        for object in self.inventory.query(&query).await? {
            self.domains.insert(object.object_id, object);
        }
        Ok(())
    }

    /// Current snapshot of an object with its domain attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::ObjectNotFound`] if the inventory does not know the
    /// id or the event deletes it.
    pub async fn domain(
        &mut self,
        object_id: ObjectId,
    ) -> Result<InventoryObject, ResolutionError> {
        self.prefetch_domains([object_id]).await?;
        self.domains
            .get(&object_id)
            .cloned()
            .ok_or(ResolutionError::ObjectNotFound { object_id })
    }

    /// Current snapshot of an object with its record attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::ObjectNotFound`] if the inventory does not know the
    /// id or the event deletes it.
    pub async fn object(
        &mut self,
        object_id: ObjectId,
    ) -> Result<InventoryObject, ResolutionError> {
        self.prefetch([object_id]).await?;
        self.objects
            .get(&object_id)
            .cloned()
            .ok_or(ResolutionError::ObjectNotFound { object_id })
    }

    /// Record object with a hostname, or `None` if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::QueryFailed`] if the inventory cannot answer.
    pub async fn find_record(
        &mut self,
        hostname: &str,
    ) -> Result<Option<InventoryObject>, ResolutionError> {
        if let Some(id) = self.records_by_hostname.get(hostname) {
            return Ok(self.objects.get(id).cloned());
        }

        let query = Query::by_hostnames(
            self.mapping.record_servertype(),
            [hostname],
            self.mapping.record_attributes(),
        );
        let found = self.inventory.query(&query).await?.into_iter().next();
        if let Some(object) = &found {
            self.remember(object.clone());
        }
        Ok(found)
    }

    /// Record object with a hostname.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::HostnameNotFound`] if no record object has it.
    pub async fn record(&mut self, hostname: &str) -> Result<InventoryObject, ResolutionError> {
        self.find_record(hostname)
            .await?
            .ok_or_else(|| ResolutionError::HostnameNotFound {
                hostname: hostname.to_string(),
                servertype: self.mapping.record_servertype().to_string(),
            })
    }

    /// Record objects currently related by `holder`, resolved once per event.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::HostnameNotFound`] if a related hostname does not
    /// name a record object.
    pub async fn related_records(
        &mut self,
        holder: &InventoryObject,
    ) -> Result<Vec<InventoryObject>, ResolutionError> {
        if let Some(ids) = self.related.get(&holder.object_id) {
            return Ok(ids
                .iter()
                .filter_map(|id| self.objects.get(id).cloned())
                .collect());
        }

        let hostnames = holder.contents(self.mapping.relation_attribute());
        let uncached: BTreeSet<&String> = hostnames
            .iter()
            .filter(|hostname| !self.records_by_hostname.contains_key(*hostname))
            .collect();
        if !uncached.is_empty() {
            let query = Query::by_hostnames(
                self.mapping.record_servertype(),
                uncached.into_iter().cloned(),
                self.mapping.record_attributes(),
            );
            for object in self.inventory.query(&query).await? {
                self.remember(object);
            }
        }

        let mut records = Vec::with_capacity(hostnames.len());
        for hostname in &hostnames {
            records.push(self.record(hostname).await?);
        }
        self.related.insert(
            holder.object_id,
            records.iter().map(|record| record.object_id).collect(),
        );
        Ok(records)
    }

    async fn zone(&mut self, hostname: &str) -> Result<Zone, ResolutionError> {
        if let Some(zone) = self.zones.get(hostname) {
            return Ok(zone.clone());
        }

        let query = Query::by_hostnames(
            self.mapping.domain_servertype(),
            [hostname],
            vec![self.mapping.domain_soa_attribute().to_string()],
        );
        let domain = self
            .inventory
            .query(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::DomainNotFound {
                hostname: hostname.to_string(),
            })?;

        let zone = Zone {
            id: domain.object_id,
            soa: domain
                .first_content(self.mapping.domain_soa_attribute())
                .unwrap_or_else(|| self.mapping.default_soa().to_string()),
        };
        self.zones.insert(hostname.to_string(), zone.clone());
        Ok(zone)
    }

    /// Resolve the zone, name and TTL of a record object's rows.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::MissingDomain`] or [`ResolutionError::DomainNotFound`]
    /// if the record's domain cannot be resolved, and
    /// [`ResolutionError::InvalidAttribute`] for a malformed TTL.
    pub async fn anchor(&mut self, record: &InventoryObject) -> Result<Anchor, ResolutionError> {
        if let Some(anchor) = self.anchors.get(&record.object_id) {
            return Ok(anchor.clone());
        }

        let attribute = self.mapping.domain_relation_attribute();
        let domain = record
            .first_content(attribute)
            .ok_or_else(|| ResolutionError::MissingDomain {
                object_id: record.object_id,
                attribute: attribute.to_string(),
            })?;
        let zone = self.zone(&domain).await?;

        let anchor = Anchor {
            record_id: record.object_id,
            hostname: record.hostname.clone(),
            domain_id: zone.id,
            soa: zone.soa,
            ttl: self.ttl(record)?,
        };
        self.anchors.insert(record.object_id, anchor.clone());
        Ok(anchor)
    }

    /// TTL of a record object, or the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidAttribute`] unless the value is a
    /// non-negative integer that fits 32 bits.
    pub fn ttl(&self, record: &InventoryObject) -> Result<u32, ResolutionError> {
        let attribute = self.mapping.ttl_attribute();
        let invalid = |value: String| ResolutionError::InvalidAttribute {
            object_id: record.object_id,
            attribute: attribute.to_string(),
            value,
            reason: "TTL must be a non-negative 32-bit integer".to_string(),
        };

        match record.get(attribute) {
            None => Ok(self.mapping.default_ttl()),
            Some(AttributeValue::Single(Scalar::Integer(value))) => {
                u32::try_from(*value).map_err(|_| invalid(value.to_string()))
            }
            Some(AttributeValue::Single(Scalar::Text(value))) if value.trim().is_empty() => {
                Ok(self.mapping.default_ttl())
            }
            Some(AttributeValue::Single(Scalar::Text(value))) => {
                value.trim().parse::<u32>().map_err(|_| invalid(value.clone()))
            }
            Some(other) => Err(invalid(other.contents().join(","))),
        }
    }
}
