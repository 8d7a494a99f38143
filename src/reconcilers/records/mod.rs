// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record reconciliation.
//!
//! Derives forward, PTR and SOA rows from record objects and from the objects that
//! relate to them. A relation holder's own value for a mapped attribute overrides
//! the record object's value: the rows are then owned by the holder
//! (`object_id` = holder) and the record-owned rows of that type are removed until
//! the override goes away.
//!
//! The three phases run in the order [`create()`], [`update()`], [`delete()`].

pub mod create;
pub mod delete;
pub mod update;

pub use create::create;
pub use delete::delete;
pub use update::update;
