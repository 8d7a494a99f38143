// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Attribute mapping configuration.
//!
//! The configuration tells the reconciler which inventory attributes become which
//! DNS record types, which attribute carries the TTL, which attribute links a
//! dependent object to its record objects, and where a domain keeps its SOA, NS
//! and zone type values.
//!
//! [`PowerDnsConfig`] is the serde document (usually YAML). It is validated once at
//! process start into an immutable [`AttributeMapping`], which is what the
//! reconciler is constructed with.
//!
//! # Example
//!
//! ```rust
//! use pdns_sync::config::PowerDnsConfig;
//!
//! let yaml = r#"
//! record:
//!   attributes:
//!     A: intern_ip
//!     MX: mx
//! "#;
//!
//! let mapping = PowerDnsConfig::from_yaml_str(yaml)
//!     .and_then(|config| config.validate())
//!     .expect("valid mapping");
//! assert_eq!(mapping.attribute_for(hickory_proto::rr::RecordType::MX), Some("mx"));
//! ```

use crate::constants::{
    ATTR_HOSTNAME, DEFAULT_DOMAIN_KIND, DEFAULT_DOMAIN_NS_ATTRIBUTE,
    DEFAULT_DOMAIN_RELATION_ATTRIBUTE, DEFAULT_DOMAIN_SERVERTYPE, DEFAULT_DOMAIN_SOA_ATTRIBUTE,
    DEFAULT_DOMAIN_TYPE_ATTRIBUTE, DEFAULT_RECORD_SERVERTYPE, DEFAULT_RECORD_TTL_SECS,
    DEFAULT_RELATION_ATTRIBUTE, DEFAULT_SOA_CONTENT, DEFAULT_TTL_ATTRIBUTE,
};
use crate::dns_errors::MappingConfigError;
use crate::event::ObjectChanges;
use anyhow::{Context, Result};
use hickory_proto::rr::RecordType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

/// Record types an inventory attribute may be mapped onto.
const MAPPABLE_RECORD_TYPES: &[RecordType] = &[
    RecordType::A,
    RecordType::AAAA,
    RecordType::CAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::NS,
    RecordType::SOA,
    RecordType::SRV,
    RecordType::TXT,
];

/// Top-level mapping configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerDnsConfig {
    /// How record objects and their dependents map onto records.
    #[serde(default)]
    pub record: RecordConfig,

    /// How domain objects map onto zones.
    #[serde(default)]
    pub domain: DomainConfig,
}

/// Record mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Servertype of the objects anchoring DNS names.
    #[serde(default = "default_record_servertype")]
    pub servertype: String,

    /// Attribute of a record object holding its TTL.
    #[serde(default = "default_ttl_attribute")]
    pub ttl: String,

    /// Multi-valued attribute on dependent objects naming their record objects.
    #[serde(default = "default_relation_attribute")]
    pub related_by: String,

    /// TTL used when a record object has none.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// Record type to attribute name (e.g. `A: intern_ip`).
    #[serde(default = "default_record_attributes")]
    pub attributes: BTreeMap<String, String>,
}

/// Domain mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Servertype of zone objects.
    #[serde(default = "default_domain_servertype")]
    pub servertype: String,

    /// Attribute holding the PowerDNS zone type (NATIVE, MASTER, SLAVE).
    #[serde(default = "default_domain_type_attribute", rename = "type")]
    pub type_attribute: String,

    /// Attribute on a record object naming its domain.
    #[serde(default = "default_domain_relation_attribute")]
    pub related_by: String,

    /// Attribute holding the zone SOA content.
    #[serde(default = "default_domain_soa_attribute")]
    pub soa: String,

    /// Attribute holding the zone nameservers.
    #[serde(default = "default_domain_ns_attribute")]
    pub ns: String,

    /// Zone type used when a domain sets none.
    #[serde(default = "default_domain_kind")]
    pub default_type: String,

    /// SOA content used when a domain sets none.
    #[serde(default = "default_soa")]
    pub default_soa: String,

    /// Nameservers used when a domain sets none.
    #[serde(default)]
    pub default_ns: Vec<String>,
}

fn default_record_servertype() -> String {
    DEFAULT_RECORD_SERVERTYPE.to_string()
}

fn default_ttl_attribute() -> String {
    DEFAULT_TTL_ATTRIBUTE.to_string()
}

fn default_relation_attribute() -> String {
    DEFAULT_RELATION_ATTRIBUTE.to_string()
}

fn default_ttl() -> u32 {
    DEFAULT_RECORD_TTL_SECS
}

fn default_record_attributes() -> BTreeMap<String, String> {
    [
        ("A", "intern_ip"),
        ("AAAA", "ipv6"),
        ("MX", "mx"),
        ("TXT", "txt"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_domain_servertype() -> String {
    DEFAULT_DOMAIN_SERVERTYPE.to_string()
}

fn default_domain_type_attribute() -> String {
    DEFAULT_DOMAIN_TYPE_ATTRIBUTE.to_string()
}

fn default_domain_relation_attribute() -> String {
    DEFAULT_DOMAIN_RELATION_ATTRIBUTE.to_string()
}

fn default_domain_soa_attribute() -> String {
    DEFAULT_DOMAIN_SOA_ATTRIBUTE.to_string()
}

fn default_domain_ns_attribute() -> String {
    DEFAULT_DOMAIN_NS_ATTRIBUTE.to_string()
}

fn default_domain_kind() -> String {
    DEFAULT_DOMAIN_KIND.to_string()
}

fn default_soa() -> String {
    DEFAULT_SOA_CONTENT.to_string()
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            servertype: default_record_servertype(),
            ttl: default_ttl_attribute(),
            related_by: default_relation_attribute(),
            default_ttl: default_ttl(),
            attributes: default_record_attributes(),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            servertype: default_domain_servertype(),
            type_attribute: default_domain_type_attribute(),
            related_by: default_domain_relation_attribute(),
            soa: default_domain_soa_attribute(),
            ns: default_domain_ns_attribute(),
            default_type: default_domain_kind(),
            default_soa: default_soa(),
            default_ns: Vec::new(),
        }
    }
}

impl PowerDnsConfig {
    /// Parse a configuration document from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`MappingConfigError::Parse`] if the document is not valid YAML or
    /// does not match the configuration schema.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MappingConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| MappingConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Load a configuration document from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping configuration {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid mapping configuration in {}", path.display()))
    }

    /// Validate the document and build the immutable mapping.
    ///
    /// Every record type must map to exactly one attribute and no attribute may be
    /// used twice.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<AttributeMapping, MappingConfigError> {
        let record = &self.record;
        let domain = &self.domain;

        for (setting, value) in [
            ("record.servertype", &record.servertype),
            ("record.ttl", &record.ttl),
            ("record.related_by", &record.related_by),
            ("domain.servertype", &domain.servertype),
            ("domain.type", &domain.type_attribute),
            ("domain.related_by", &domain.related_by),
            ("domain.soa", &domain.soa),
            ("domain.ns", &domain.ns),
        ] {
            if value.trim().is_empty() {
                return Err(MappingConfigError::EmptyAttributeName {
                    setting: setting.to_string(),
                });
            }
        }

        if domain.soa == domain.ns {
            return Err(MappingConfigError::AttributeCollision {
                attribute: domain.ns.clone(),
                setting: "domain.soa".to_string(),
            });
        }

        let structural = [
            (ATTR_HOSTNAME, "hostname"),
            (record.ttl.as_str(), "record.ttl"),
            (record.related_by.as_str(), "record.related_by"),
            (domain.related_by.as_str(), "domain.related_by"),
        ];

        let mut attributes: Vec<(RecordType, String)> = Vec::with_capacity(record.attributes.len());
        let mut by_attribute: HashMap<String, RecordType> = HashMap::new();

        for (key, attribute) in &record.attributes {
            let record_type = parse_record_type(key)?;

            if attribute.trim().is_empty() {
                return Err(MappingConfigError::EmptyAttributeName {
                    setting: format!("record.attributes.{key}"),
                });
            }

            if attributes.iter().any(|(existing, _)| *existing == record_type) {
                return Err(MappingConfigError::DuplicateRecordType {
                    record_type: record_type.to_string(),
                });
            }

            if let Some(first) = by_attribute.get(attribute) {
                return Err(MappingConfigError::DuplicateAttribute {
                    attribute: attribute.clone(),
                    first: first.to_string(),
                    second: record_type.to_string(),
                });
            }

            if let Some((_, setting)) = structural
                .iter()
                .find(|(name, _)| *name == attribute.as_str())
            {
                return Err(MappingConfigError::AttributeCollision {
                    attribute: attribute.clone(),
                    setting: (*setting).to_string(),
                });
            }

            by_attribute.insert(attribute.clone(), record_type);
            attributes.push((record_type, attribute.clone()));
        }

        Ok(AttributeMapping {
            record_servertype: record.servertype.clone(),
            ttl_attribute: record.ttl.clone(),
            relation_attribute: record.related_by.clone(),
            default_ttl: record.default_ttl,
            attributes,
            by_attribute,
            domain_servertype: domain.servertype.clone(),
            domain_relation_attribute: domain.related_by.clone(),
            domain_type_attribute: domain.type_attribute.clone(),
            domain_soa_attribute: domain.soa.clone(),
            domain_ns_attribute: domain.ns.clone(),
            default_domain_kind: domain.default_type.clone(),
            default_soa: domain.default_soa.clone(),
            default_ns: domain.default_ns.clone(),
        })
    }
}

fn parse_record_type(key: &str) -> Result<RecordType, MappingConfigError> {
    let upper = key.trim().to_ascii_uppercase();
    let record_type =
        RecordType::from_str(&upper).map_err(|_| MappingConfigError::UnknownRecordType {
            record_type: key.to_string(),
        })?;

    if record_type == RecordType::PTR {
        return Err(MappingConfigError::ReservedRecordType {
            record_type: upper,
        });
    }

    if !MAPPABLE_RECORD_TYPES.contains(&record_type) {
        return Err(MappingConfigError::UnknownRecordType {
            record_type: key.to_string(),
        });
    }

    Ok(record_type)
}

/// Validated, immutable attribute mapping.
///
/// Built by [`PowerDnsConfig::validate`] and shared (behind an `Arc`) by the
/// reconciler for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    record_servertype: String,
    ttl_attribute: String,
    relation_attribute: String,
    default_ttl: u32,
    attributes: Vec<(RecordType, String)>,
    by_attribute: HashMap<String, RecordType>,
    domain_servertype: String,
    domain_relation_attribute: String,
    domain_type_attribute: String,
    domain_soa_attribute: String,
    domain_ns_attribute: String,
    default_domain_kind: String,
    default_soa: String,
    default_ns: Vec<String>,
}

impl AttributeMapping {
    /// Servertype of record objects.
    #[must_use]
    pub fn record_servertype(&self) -> &str {
        &self.record_servertype
    }

    /// Attribute holding a record's TTL.
    #[must_use]
    pub fn ttl_attribute(&self) -> &str {
        &self.ttl_attribute
    }

    /// Attribute linking dependent objects to record objects.
    #[must_use]
    pub fn relation_attribute(&self) -> &str {
        &self.relation_attribute
    }

    /// TTL for records whose record object has none.
    #[must_use]
    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    /// All mapped (record type, attribute) pairs.
    #[must_use]
    pub fn mapped(&self) -> &[(RecordType, String)] {
        &self.attributes
    }

    /// Record type produced by an attribute, if it is mapped.
    #[must_use]
    pub fn record_type_for(&self, attribute: &str) -> Option<RecordType> {
        self.by_attribute.get(attribute).copied()
    }

    /// Attribute producing a record type, if it is mapped.
    #[must_use]
    pub fn attribute_for(&self, record_type: RecordType) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(mapped, _)| *mapped == record_type)
            .map(|(_, attribute)| attribute.as_str())
    }

    /// Servertype of domain objects.
    #[must_use]
    pub fn domain_servertype(&self) -> &str {
        &self.domain_servertype
    }

    /// Attribute on a record object naming its domain.
    #[must_use]
    pub fn domain_relation_attribute(&self) -> &str {
        &self.domain_relation_attribute
    }

    /// Attribute holding the zone type.
    #[must_use]
    pub fn domain_type_attribute(&self) -> &str {
        &self.domain_type_attribute
    }

    /// Attribute holding the zone SOA.
    #[must_use]
    pub fn domain_soa_attribute(&self) -> &str {
        &self.domain_soa_attribute
    }

    /// Attribute holding the zone nameservers.
    #[must_use]
    pub fn domain_ns_attribute(&self) -> &str {
        &self.domain_ns_attribute
    }

    /// Zone type for domains that set none.
    #[must_use]
    pub fn default_domain_kind(&self) -> &str {
        &self.default_domain_kind
    }

    /// SOA content for domains that set none.
    #[must_use]
    pub fn default_soa(&self) -> &str {
        &self.default_soa
    }

    /// Nameservers for domains that set none.
    #[must_use]
    pub fn default_ns(&self) -> &[String] {
        &self.default_ns
    }

    /// Attributes needed to reconcile a record object or a relation holder.
    ///
    /// Used as the restriction list of inventory queries so only the minimal
    /// attribute set is fetched.
    #[must_use]
    pub fn record_attributes(&self) -> Vec<String> {
        let mut restrict = vec![
            self.ttl_attribute.clone(),
            self.relation_attribute.clone(),
            self.domain_relation_attribute.clone(),
        ];
        restrict.extend(self.attributes.iter().map(|(_, attribute)| attribute.clone()));
        restrict
    }

    /// Attributes needed to reconcile a domain object.
    #[must_use]
    pub fn domain_attributes(&self) -> Vec<String> {
        vec![
            self.domain_type_attribute.clone(),
            self.domain_soa_attribute.clone(),
            self.domain_ns_attribute.clone(),
        ]
    }

    /// True if a diff map names the hostname or a record attribute.
    #[must_use]
    pub fn affects_records(&self, changes: &ObjectChanges) -> bool {
        let relevant = self.record_attributes();
        changes
            .keys()
            .any(|attribute| attribute == ATTR_HOSTNAME || relevant.contains(attribute))
    }

    /// True if a diff map names the hostname or a domain attribute.
    #[must_use]
    pub fn affects_domains(&self, changes: &ObjectChanges) -> bool {
        let relevant = self.domain_attributes();
        changes
            .keys()
            .any(|attribute| attribute == ATTR_HOSTNAME || relevant.contains(attribute))
    }
}
