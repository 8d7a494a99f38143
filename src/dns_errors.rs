// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for record reconciliation.
//!
//! This module provides specialized error types for:
//! - Malformed attribute mapping configuration (startup only)
//! - Objects that cannot be resolved in the inventory while an event is applied
//! - Mutations rejected by the derived record store
//!
//! Every failure aborts the event's record-store transaction. The composite
//! [`ReconcileError`] is what the commit pipeline receives and turns into a
//! rejected commit.

use crate::inventory::ObjectId;
use thiserror::Error;

/// Errors detected while validating the attribute mapping configuration.
///
/// These are only ever produced at process start, before the first event is handled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingConfigError {
    /// A mapping key is not a DNS record type
    #[error("Unknown record type '{record_type}' in attribute mapping")]
    UnknownRecordType {
        /// The offending mapping key
        record_type: String,
    },

    /// A mapping key names a record type that is maintained internally
    #[error("Record type '{record_type}' is synthesized and cannot be mapped to an attribute")]
    ReservedRecordType {
        /// The offending record type
        record_type: String,
    },

    /// Two mapping keys resolve to the same record type (e.g. "mx" and "MX")
    #[error("Record type '{record_type}' is mapped more than once")]
    DuplicateRecordType {
        /// The record type mapped twice
        record_type: String,
    },

    /// One attribute is mapped onto two record types
    #[error("Attribute '{attribute}' is mapped to both {first} and {second}")]
    DuplicateAttribute {
        /// The attribute used twice
        attribute: String,
        /// First record type using it
        first: String,
        /// Second record type using it
        second: String,
    },

    /// An attribute name is empty
    #[error("Attribute name for '{setting}' must not be empty")]
    EmptyAttributeName {
        /// The configuration setting left empty
        setting: String,
    },

    /// A mapped attribute collides with one of the structural attributes
    #[error("Mapped attribute '{attribute}' collides with the {setting} attribute")]
    AttributeCollision {
        /// The attribute name used twice
        attribute: String,
        /// The structural setting it collides with
        setting: String,
    },

    /// The configuration document could not be parsed
    #[error("Failed to parse mapping configuration: {reason}")]
    Parse {
        /// Parser message
        reason: String,
    },
}

/// Errors resolving inventory objects referenced by a change event.
///
/// A referenced object that cannot be found indicates a race or an integrity
/// violation upstream, so these errors are fatal for the event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// An object id from the event is not known to the inventory
    #[error("Object {object_id} referenced by the change could not be found")]
    ObjectNotFound {
        /// The missing object id
        object_id: ObjectId,
    },

    /// A related object named by hostname is not known to the inventory
    #[error("No {servertype} object with hostname '{hostname}' exists")]
    HostnameNotFound {
        /// The hostname that was looked up
        hostname: String,
        /// The servertype that was expected
        servertype: String,
    },

    /// A record object does not name a domain
    #[error("Object {object_id} has no value for domain attribute '{attribute}'")]
    MissingDomain {
        /// The record object lacking a domain
        object_id: ObjectId,
        /// The domain relation attribute
        attribute: String,
    },

    /// The domain named by a record does not exist
    #[error("Domain '{hostname}' could not be found")]
    DomainNotFound {
        /// The domain hostname
        hostname: String,
    },

    /// An attribute value cannot be turned into record data
    #[error("Invalid value '{value}' for attribute '{attribute}' of object {object_id}: {reason}")]
    InvalidAttribute {
        /// The object holding the value
        object_id: ObjectId,
        /// The attribute name
        attribute: String,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The inventory could not answer a query
    #[error("Inventory query failed: {reason}")]
    QueryFailed {
        /// Underlying failure
        reason: String,
    },
}

/// Errors returned by the derived record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A mutation violated a store constraint
    #[error("Record store constraint violated: {reason}")]
    ConstraintViolation {
        /// Description of the violated constraint
        reason: String,
    },

    /// The store could not be reached
    #[error("Record store unavailable: {reason}")]
    Unavailable {
        /// Underlying failure
        reason: String,
    },

    /// The transaction was already committed or rolled back
    #[error("Record store transaction is closed")]
    TransactionClosed,
}

/// Composite error returned by the reconciler for one change event.
///
/// Any variant means the event's record-store transaction was rolled back and the
/// originating inventory commit must be failed as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Mapping configuration is invalid
    #[error(transparent)]
    MappingConfig(#[from] MappingConfigError),

    /// A referenced object could not be resolved
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The record store rejected a mutation
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Failure while applying a specific object's attribute
    #[error("Failed to apply attribute '{attribute}' of object {object_id}: {source}")]
    Attribute {
        /// The object being applied
        object_id: ObjectId,
        /// The attribute being applied
        attribute: String,
        /// The underlying failure
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Wrap this error with the object and attribute that were being applied.
    ///
    /// Already-wrapped errors are returned unchanged so the innermost location wins.
    #[must_use]
    pub fn with_context(self, object_id: ObjectId, attribute: &str) -> Self {
        match self {
            Self::Attribute { .. } => self,
            other => Self::Attribute {
                object_id,
                attribute: attribute.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, skipping attribute context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Attribute { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns a stable reason code for this error.
    ///
    /// Used as a metrics label and in commit rejection messages.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self.root() {
            Self::MappingConfig(_) => "MappingConfigInvalid",

            Self::Resolution(ResolutionError::ObjectNotFound { .. }) => "ObjectNotFound",
            Self::Resolution(ResolutionError::HostnameNotFound { .. }) => "HostnameNotFound",
            Self::Resolution(ResolutionError::MissingDomain { .. }) => "MissingDomain",
            Self::Resolution(ResolutionError::DomainNotFound { .. }) => "DomainNotFound",
            Self::Resolution(ResolutionError::InvalidAttribute { .. }) => "InvalidAttribute",
            Self::Resolution(ResolutionError::QueryFailed { .. }) => "InventoryQueryFailed",

            Self::Repository(RepositoryError::ConstraintViolation { .. }) => "ConstraintViolation",
            Self::Repository(RepositoryError::Unavailable { .. }) => "RecordStoreUnavailable",
            Self::Repository(RepositoryError::TransactionClosed) => "TransactionClosed",

            Self::Attribute { .. } => "ReconcileFailed",
        }
    }
}
