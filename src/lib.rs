// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # pdns-sync - PowerDNS records derived from an attribute inventory
//!
//! pdns-sync keeps a PowerDNS-compatible record store consistent with a canonical,
//! attribute-based inventory of machines, services, DNS records and domains.
//!
//! ## Overview
//!
//! Every inventory commit produces one [`event::ChangeEvent`]. The
//! [`reconcilers::Reconciler`] turns it into the minimal set of record-store
//! mutations and applies them in a single transaction:
//!
//! - Mapped attributes (e.g. `intern_ip` → `A`, `mx` → `MX`) become forward rows
//! - Every A/AAAA row is paired with a PTR row and a SOA row at its reverse name
//! - Objects relating to a record override the record's own values, which are
//!   restored once the override goes away
//! - Domain objects own their zone, SOA and NS rows
//!
//! ## Modules
//!
//! - [`config`] - Attribute mapping configuration
//! - [`event`] - Change notification data model
//! - [`inventory`] - Inventory Store interface and in-memory inventory
//! - [`repository`] - Derived record store interface and in-memory store
//! - [`reconcilers`] - Record and domain reconciliation
//! - [`reverse`] - Reverse-DNS names
//! - [`dns_errors`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`telemetry`] - Logging setup
//!
//! ## Example
//!
//! ```rust
//! use pdns_sync::config::PowerDnsConfig;
//! use pdns_sync::inventory::InventoryObject;
//! use pdns_sync::inventory::memory::{Commit, MemoryInventory};
//! use pdns_sync::reconcilers::Reconciler;
//! use pdns_sync::repository::memory::MemoryRecordStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let mapping = PowerDnsConfig::default().validate()?;
//! let inventory = Arc::new(MemoryInventory::for_mapping(&mapping));
//! let store = Arc::new(MemoryRecordStore::new());
//! inventory
//!     .subscribe(Arc::new(Reconciler::new(mapping, inventory.clone(), store.clone())))
//!     .await;
//!
//! inventory
//!     .commit(
//!         Commit::new()
//!             .create(InventoryObject::new(1, "domain", "example.com"))
//!             .create(
//!                 InventoryObject::new(2, "record", "www.example.com")
//!                     .with("domain", "example.com")
//!                     .with("intern_ip", "10.0.0.1"),
//!             ),
//!     )
//!     .await?;
//!
//! let names: Vec<String> = store.all_records().await.into_iter().map(|r| r.name).collect();
//! assert!(names.contains(&"1.0.0.10.in-addr.arpa".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dns_errors;
pub mod event;
pub mod inventory;
pub mod metrics;
pub mod reconcilers;
pub mod repository;
pub mod reverse;
pub mod telemetry;

#[cfg(test)]
mod event_tests;
#[cfg(test)]
mod reverse_tests;
#[cfg(test)]
mod telemetry_tests;
