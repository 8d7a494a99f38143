// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Inventory Store interface.
//!
//! The inventory is the canonical, attribute-based object database. The reconciler
//! only ever reads from it: it receives a [`ChangeEvent`](crate::event::ChangeEvent)
//! for every commit and queries back for the objects it needs.
//!
//! - [`InventoryObject`] - an object snapshot (id, servertype, hostname, attributes)
//! - [`Query`] - a filter plus the minimal list of attributes to return
//! - [`InventoryStore`] - the query capability
//! - [`ChangeSubscriber`] - the commit pipeline notification hook
//!
//! [`memory::MemoryInventory`] is an in-process implementation with a commit
//! pipeline, used by the integration tests and by embedders that keep their
//! inventory in memory.

pub mod memory;


use crate::dns_errors::{ReconcileError, ResolutionError};
use crate::event::ChangeEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

/// Stable integer identity of an inventory object.
pub type ObjectId = i64;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean value
    Bool(bool),
    /// Integer value (TTLs, ids)
    Integer(i64),
    /// Text value (hostnames, IP addresses, record payloads)
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<IpAddr> for Scalar {
    fn from(value: IpAddr) -> Self {
        Self::Text(value.to_string())
    }
}

/// An attribute value: either single-valued or a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Multi-valued attribute
    Multi(BTreeSet<Scalar>),
    /// Single-valued attribute
    Single(Scalar),
}

impl AttributeValue {
    /// Build a multi-valued attribute from any collection of values.
    pub fn multi<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self::Multi(values.into_iter().map(Into::into).collect())
    }

    /// True for multi-valued attributes.
    #[must_use]
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// Distinct values as record content strings, in stable order.
    ///
    /// Empty strings are treated as "no value".
    #[must_use]
    pub fn contents(&self) -> Vec<String> {
        let set: BTreeSet<String> = match self {
            Self::Multi(values) => values.iter().map(ToString::to_string).collect(),
            Self::Single(value) => std::iter::once(value.to_string()).collect(),
        };
        set.into_iter().filter(|value| !value.is_empty()).collect()
    }
}

macro_rules! single_value_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for AttributeValue {
                fn from(value: $source) -> Self {
                    Self::Single(value.into())
                }
            }
        )*
    };
}

single_value_from!(Scalar, &str, String, i64, bool, IpAddr);

/// Snapshot of an inventory object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryObject {
    /// Stable identity
    pub object_id: ObjectId,
    /// Schema tag
    pub servertype: String,
    /// DNS name of the object
    pub hostname: String,
    /// Attribute name to value; absent attributes have no value
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl InventoryObject {
    /// Create an object without attributes.
    pub fn new(
        object_id: ObjectId,
        servertype: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            object_id,
            servertype: servertype.into(),
            hostname: hostname.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    /// Raw attribute value.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    /// Non-empty values of an attribute as record content strings.
    #[must_use]
    pub fn contents(&self, attribute: &str) -> Vec<String> {
        self.get(attribute)
            .map(AttributeValue::contents)
            .unwrap_or_default()
    }

    /// First non-empty value of an attribute.
    #[must_use]
    pub fn first_content(&self, attribute: &str) -> Option<String> {
        self.contents(attribute).into_iter().next()
    }

    /// True if the attribute holds at least one non-empty value.
    #[must_use]
    pub fn has_values(&self, attribute: &str) -> bool {
        !self.contents(attribute).is_empty()
    }

    /// Copy of this object keeping only the listed attributes.
    #[must_use]
    pub fn project(&self, restrict: &[String]) -> Self {
        Self {
            object_id: self.object_id,
            servertype: self.servertype.clone(),
            hostname: self.hostname.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| restrict.iter().any(|wanted| wanted == *name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Object selection of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectFilter {
    /// Objects with any of these ids
    ObjectIds(BTreeSet<ObjectId>),
    /// Objects of a servertype with any of these hostnames
    Hostnames {
        /// Required servertype
        servertype: String,
        /// Accepted hostnames
        hostnames: BTreeSet<String>,
    },
}

/// An inventory query: which objects, and which attributes of them.
///
/// `object_id`, `servertype` and `hostname` are always returned; `restrict` names
/// every other attribute the caller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Object selection
    pub filter: ObjectFilter,
    /// Attributes to return
    pub restrict: Vec<String>,
}

impl Query {
    /// Select objects by id.
    pub fn by_ids(ids: impl IntoIterator<Item = ObjectId>, restrict: Vec<String>) -> Self {
        Self {
            filter: ObjectFilter::ObjectIds(ids.into_iter().collect()),
            restrict,
        }
    }

    /// Select objects of one servertype by hostname.
    pub fn by_hostnames<I, S>(servertype: &str, hostnames: I, restrict: Vec<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: ObjectFilter::Hostnames {
                servertype: servertype.to_string(),
                hostnames: hostnames.into_iter().map(Into::into).collect(),
            },
            restrict,
        }
    }

    /// True if the object is selected by this query.
    #[must_use]
    pub fn matches(&self, object: &InventoryObject) -> bool {
        match &self.filter {
            ObjectFilter::ObjectIds(ids) => ids.contains(&object.object_id),
            ObjectFilter::Hostnames {
                servertype,
                hostnames,
            } => object.servertype == *servertype && hostnames.contains(&object.hostname),
        }
    }
}

/// Query capability of the Inventory Store.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Return the objects selected by `query`, ordered by object id, projected
    /// onto `query.restrict`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::QueryFailed`] if the inventory cannot answer.
    async fn query(&self, query: &Query) -> Result<Vec<InventoryObject>, ResolutionError>;
}

/// Commit pipeline notification hook.
///
/// Called exactly once per commit, after the commit is otherwise durable and
/// before it is reported successful. An error fails the whole commit.
#[async_trait]
pub trait ChangeSubscriber: Send + Sync {
    /// Apply one committed change.
    ///
    /// # Errors
    ///
    /// Returns the reconciliation failure that must reject the commit.
    async fn on_commit(&self, event: &ChangeEvent) -> Result<(), ReconcileError>;
}
