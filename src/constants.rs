// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for pdns-sync.
//!
//! This module contains the numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Inventory Constants
// ============================================================================

/// Attribute every inventory object carries as its stable identity
pub const ATTR_OBJECT_ID: &str = "object_id";

/// Attribute every inventory object carries as its DNS name
pub const ATTR_HOSTNAME: &str = "hostname";

/// Attribute every inventory object carries to select its schema
pub const ATTR_SERVERTYPE: &str = "servertype";

// ============================================================================
// Record Mapping Defaults
// ============================================================================

/// Default servertype of objects anchoring DNS names
pub const DEFAULT_RECORD_SERVERTYPE: &str = "record";

/// Default attribute holding a record's TTL
pub const DEFAULT_TTL_ATTRIBUTE: &str = "ttl";

/// Default multi-valued attribute linking dependent objects to records
pub const DEFAULT_RELATION_ATTRIBUTE: &str = "records";

/// Default attribute on a record naming its domain
pub const DEFAULT_DOMAIN_RELATION_ATTRIBUTE: &str = "domain";

/// Default TTL for records whose record object has no TTL (1 hour)
pub const DEFAULT_RECORD_TTL_SECS: u32 = 3600;

// ============================================================================
// Domain Mapping Defaults
// ============================================================================

/// Default servertype of zone objects
pub const DEFAULT_DOMAIN_SERVERTYPE: &str = "domain";

/// Default attribute holding the PowerDNS zone type
pub const DEFAULT_DOMAIN_TYPE_ATTRIBUTE: &str = "type";

/// Default attribute holding the zone SOA content
pub const DEFAULT_DOMAIN_SOA_ATTRIBUTE: &str = "soa";

/// Default attribute holding the zone nameservers
pub const DEFAULT_DOMAIN_NS_ATTRIBUTE: &str = "ns";

/// PowerDNS zone type used when a domain does not set one
pub const DEFAULT_DOMAIN_KIND: &str = "NATIVE";

/// SOA content used when a domain does not set one
pub const DEFAULT_SOA_CONTENT: &str = "localhost hostmaster.localhost 1 10800 3600 604800 3600";

// ============================================================================
// Reconciler Constants
// ============================================================================

/// Number of applied commit ids remembered for redelivery detection
pub const DEDUP_WINDOW_SIZE: usize = 1024;

/// Namespace prefix for all pdns-sync metrics (prometheus-safe)
pub const METRICS_NAMESPACE: &str = "pdns_sync";
