#![forbid(unsafe_code)]

//! A source-vocabulary-agnostic facade over annotated knowledge-graph
//! documents: a `Document` holds `Node`s indexed by `@id`; each `Node`
//! holds properties that are either bare values or `AnnotatedValue`s
//! carrying confidence/provenance/temporal metadata.
//!
//! Downstream crates (merge, temporal, inference) walk this facade and
//! never see a `@`-prefixed string outside of (de)serialization — the
//! annotation vocabulary is named generically via [`AnnotationKey`].

use std::collections::BTreeMap;

use ca_types::Opinion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FacadeError {
    #[error("node {node_id:?} has no property named {property:?}")]
    PropertyNotFound { node_id: Option<String>, property: String },
    #[error("node id {0:?} is not present in the document")]
    NodeNotFound(String),
    #[error("cannot traverse property {property:?}: value is not a node")]
    NotTraversable { property: String },
}

/// Generic naming for annotation-vocabulary keys — these never leak as
/// raw `@`-prefixed strings beyond the serde boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKey {
    Confidence,
    Source,
    ExtractedAt,
    Method,
    HumanVerified,
    DerivedFrom,
    ValidFrom,
    ValidUntil,
    AsOf,
    PersonalDataCategory,
    LegalBasis,
    ProcessingPurpose,
    DataController,
    DataProcessor,
    DataSubject,
    RetentionUntil,
    Jurisdiction,
    AccessLevel,
    Consent,
    ErasureRequested,
    ErasureRequestedAt,
    RestrictProcessing,
    RestrictionReason,
}

/// A leaf value carrying the jsonld-ex annotation vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedValue {
    #[serde(rename = "@value")]
    pub value: serde_json::Value,

    #[serde(rename = "@confidence", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(rename = "@source", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(rename = "@extractedAt", skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<String>,

    #[serde(rename = "@method", skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(rename = "@humanVerified", skip_serializing_if = "Option::is_none")]
    pub human_verified: Option<bool>,

    #[serde(rename = "@derivedFrom", skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<Vec<serde_json::Value>>,

    #[serde(rename = "@validFrom", skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,

    #[serde(rename = "@validUntil", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,

    #[serde(rename = "@asOf", skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,

    #[serde(rename = "@opinion", skip_serializing_if = "Option::is_none")]
    pub opinion: Option<Opinion>,

    #[serde(rename = "@personalDataCategory", skip_serializing_if = "Option::is_none")]
    pub personal_data_category: Option<String>,

    #[serde(rename = "@legalBasis", skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<String>,

    #[serde(rename = "@processingPurpose", skip_serializing_if = "Option::is_none")]
    pub processing_purpose: Option<String>,

    #[serde(rename = "@dataController", skip_serializing_if = "Option::is_none")]
    pub data_controller: Option<String>,

    #[serde(rename = "@dataProcessor", skip_serializing_if = "Option::is_none")]
    pub data_processor: Option<String>,

    #[serde(rename = "@dataSubject", skip_serializing_if = "Option::is_none")]
    pub data_subject: Option<String>,

    #[serde(rename = "@retentionUntil", skip_serializing_if = "Option::is_none")]
    pub retention_until: Option<String>,

    #[serde(rename = "@jurisdiction", skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,

    #[serde(rename = "@accessLevel", skip_serializing_if = "Option::is_none")]
    pub access_level: Option<String>,

    #[serde(rename = "@consent", skip_serializing_if = "Option::is_none")]
    pub consent: Option<String>,

    #[serde(rename = "@erasureRequested", skip_serializing_if = "Option::is_none")]
    pub erasure_requested: Option<bool>,

    #[serde(rename = "@erasureRequestedAt", skip_serializing_if = "Option::is_none")]
    pub erasure_requested_at: Option<String>,

    #[serde(rename = "@restrictProcessing", skip_serializing_if = "Option::is_none")]
    pub restrict_processing: Option<bool>,

    #[serde(rename = "@restrictionReason", skip_serializing_if = "Option::is_none")]
    pub restriction_reason: Option<String>,
}

impl AnnotatedValue {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn get(&self, key: AnnotationKey) -> Option<&str> {
        match key {
            AnnotationKey::Source => self.source.as_deref(),
            AnnotationKey::ExtractedAt => self.extracted_at.as_deref(),
            AnnotationKey::Method => self.method.as_deref(),
            AnnotationKey::ValidFrom => self.valid_from.as_deref(),
            AnnotationKey::ValidUntil => self.valid_until.as_deref(),
            AnnotationKey::AsOf => self.as_of.as_deref(),
            AnnotationKey::PersonalDataCategory => self.personal_data_category.as_deref(),
            AnnotationKey::LegalBasis => self.legal_basis.as_deref(),
            AnnotationKey::ProcessingPurpose => self.processing_purpose.as_deref(),
            AnnotationKey::DataController => self.data_controller.as_deref(),
            AnnotationKey::DataProcessor => self.data_processor.as_deref(),
            AnnotationKey::DataSubject => self.data_subject.as_deref(),
            AnnotationKey::RetentionUntil => self.retention_until.as_deref(),
            AnnotationKey::Jurisdiction => self.jurisdiction.as_deref(),
            AnnotationKey::AccessLevel => self.access_level.as_deref(),
            AnnotationKey::Consent => self.consent.as_deref(),
            AnnotationKey::ErasureRequestedAt => self.erasure_requested_at.as_deref(),
            AnnotationKey::RestrictionReason => self.restriction_reason.as_deref(),
            AnnotationKey::Confidence
            | AnnotationKey::HumanVerified
            | AnnotationKey::DerivedFrom
            | AnnotationKey::ErasureRequested
            | AnnotationKey::RestrictProcessing => None,
        }
    }

    /// Whether an erasure (GDPR Article 17) request is recorded against
    /// this value, regardless of whether it has been acted on yet.
    #[must_use]
    pub fn erasure_requested(&self) -> bool {
        self.erasure_requested.unwrap_or(false)
    }

    /// Whether processing of this value is currently under an Article 18
    /// restriction.
    #[must_use]
    pub fn processing_restricted(&self) -> bool {
        self.restrict_processing.unwrap_or(false)
    }

    /// Whether this value carries any temporal qualifier at all.
    #[must_use]
    pub fn has_temporal_bounds(&self) -> bool {
        self.valid_from.is_some() || self.valid_until.is_some()
    }
}

/// A property value: a bare JSON value, a single annotated value, or a
/// set of either (JSON-LD's implicit array-valued properties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Many(Vec<PropertyValue>),
    Annotated(AnnotatedValue),
    Bare(serde_json::Value),
}

impl PropertyValue {
    /// Strip annotation metadata, returning the bare data value for
    /// agreement/conflict comparison.
    #[must_use]
    pub fn bare(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bare(v) => v.clone(),
            PropertyValue::Annotated(a) => a.value.clone(),
            PropertyValue::Many(items) => {
                serde_json::Value::Array(items.iter().map(PropertyValue::bare).collect())
            }
        }
    }

    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        match self {
            PropertyValue::Annotated(a) => a.confidence,
            _ => None,
        }
    }

    #[must_use]
    pub fn as_annotated(&self) -> Option<&AnnotatedValue> {
        match self {
            PropertyValue::Annotated(a) => Some(a),
            _ => None,
        }
    }
}

/// A graph node: identity (`@id`/`@type`) plus a property map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub id: Option<String>,
    pub types: Vec<String>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            types: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, property: impl Into<String>, value: PropertyValue) {
        self.properties.insert(property.into(), value);
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }
}

/// A document: an optional `@context` plus a flat `@graph` of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub context: Option<serde_json::Value>,
    pub nodes: Vec<Node>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_deref() == Some(id))
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id.as_deref() == Some(id))
    }

    /// Walk every `(node_id, property_key, annotated_value)` triple in
    /// the document, skipping bare (unannotated) properties.
    pub fn walk(&self) -> impl Iterator<Item = (Option<&str>, &str, &AnnotatedValue)> {
        self.nodes.iter().flat_map(|node| {
            node.properties.iter().filter_map(move |(key, value)| {
                value
                    .as_annotated()
                    .map(|annotated| (node.id.as_deref(), key.as_str(), annotated))
            })
        })
    }
}
