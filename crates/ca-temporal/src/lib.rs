#![forbid(unsafe_code)]

//! Point-in-time queries and diffs over temporally-qualified annotated
//! values. An [`ca_facade::AnnotatedValue`] may carry `validFrom`/
//! `validUntil` bounds (inclusive); [`query_at_time`] filters a document
//! down to the data valid at an instant, and [`temporal_diff`] compares
//! two such snapshots.

use std::collections::BTreeMap;

use ca_facade::{AnnotatedValue, Document, Node, PropertyValue};
use ca_merge::GraphDiff;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemporalError {
    #[error("unparseable ISO-8601 timestamp: {0:?}")]
    Parse(String),
    #[error("validFrom {valid_from:?} is after validUntil {valid_until:?}")]
    InvalidRange { valid_from: String, valid_until: String },
    #[error("add_temporal requires at least one of validFrom/validUntil/asOf")]
    MissingQualifier,
}

/// Parse a strict ISO-8601 date or date-time. Accepts `YYYY-MM-DD`,
/// `YYYY-MM-DDThh:mm:ss[.fff]`, with optional `Z` or `±hh:mm` offset; a
/// timestamp with no offset is treated as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TemporalError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(TemporalError::Parse(raw.to_owned()))
}

/// Attach (or extend) temporal qualifiers on an annotated value, validating
/// that all supplied timestamps parse and that `validFrom <= validUntil`.
pub fn add_temporal(
    mut value: AnnotatedValue,
    valid_from: Option<&str>,
    valid_until: Option<&str>,
    as_of: Option<&str>,
) -> Result<AnnotatedValue, TemporalError> {
    if valid_from.is_none() && valid_until.is_none() && as_of.is_none() {
        return Err(TemporalError::MissingQualifier);
    }

    if let Some(s) = valid_from {
        parse_timestamp(s)?;
    }
    if let Some(s) = valid_until {
        parse_timestamp(s)?;
    }
    if let Some(s) = as_of {
        parse_timestamp(s)?;
    }
    if let (Some(vf), Some(vu)) = (valid_from, valid_until) {
        if parse_timestamp(vf)? > parse_timestamp(vu)? {
            return Err(TemporalError::InvalidRange {
                valid_from: vf.to_owned(),
                valid_until: vu.to_owned(),
            });
        }
    }

    if let Some(s) = valid_from {
        value.valid_from = Some(s.to_owned());
    }
    if let Some(s) = valid_until {
        value.valid_until = Some(s.to_owned());
    }
    if let Some(s) = as_of {
        value.as_of = Some(s.to_owned());
    }
    Ok(value)
}

fn is_valid_at(value: &AnnotatedValue, t: DateTime<Utc>) -> Result<bool, TemporalError> {
    let after_from = match &value.valid_from {
        Some(vf) => parse_timestamp(vf)? <= t,
        None => true,
    };
    let before_until = match &value.valid_until {
        Some(vu) => t <= parse_timestamp(vu)?,
        None => true,
    };
    Ok(after_from && before_until)
}

/// Filter a single property value (recursing element-wise through `Many`)
/// to only what's valid at `t`. Returns `None` if nothing survives.
fn filter_property(value: &PropertyValue, t: DateTime<Utc>) -> Result<Option<PropertyValue>, TemporalError> {
    match value {
        PropertyValue::Many(items) => {
            let mut kept = Vec::new();
            for item in items {
                if let Some(filtered) = filter_property(item, t)? {
                    kept.push(filtered);
                }
            }
            Ok(if kept.is_empty() { None } else { Some(PropertyValue::Many(kept)) })
        }
        PropertyValue::Annotated(av) => {
            Ok(if is_valid_at(av, t)? { Some(value.clone()) } else { None })
        }
        PropertyValue::Bare(_) => Ok(Some(value.clone())),
    }
}

/// Return the nodes of `graph` with at least one surviving property at
/// instant `t`. If `property_name` is given, only that property is
/// time-filtered; every other property passes through unconditionally —
/// so a node can survive purely on its untargeted properties even when
/// the targeted one has no valid value at `t`. This is intentional
/// (matches the reference behavior), not an oversight.
pub fn query_at_time(
    graph: &Document,
    t: &str,
    property_name: Option<&str>,
) -> Result<Vec<Node>, TemporalError> {
    let instant = parse_timestamp(t)?;
    let mut out = Vec::new();

    for node in &graph.nodes {
        let mut filtered = Node {
            id: node.id.clone(),
            types: node.types.clone(),
            properties: BTreeMap::new(),
        };

        for (key, value) in &node.properties {
            let kept = match property_name {
                Some(target) if target != key => Some(value.clone()),
                _ => filter_property(value, instant)?,
            };
            if let Some(v) = kept {
                filtered.properties.insert(key.clone(), v);
            }
        }

        if !filtered.properties.is_empty() {
            out.push(filtered);
        }
    }

    Ok(out)
}

/// Diff two point-in-time snapshots of the same document.
pub fn temporal_diff(graph: &Document, t1: &str, t2: &str) -> Result<GraphDiff, TemporalError> {
    let nodes1 = query_at_time(graph, t1, None)?;
    let nodes2 = query_at_time(graph, t2, None)?;

    let snapshot1 = Document {
        context: graph.context.clone(),
        nodes: nodes1,
    };
    let snapshot2 = Document {
        context: graph.context.clone(),
        nodes: nodes2,
    };

    Ok(ca_merge::diff(&snapshot1, &snapshot2))
}
