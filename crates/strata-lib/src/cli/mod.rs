//! Command-line definitions and argument helpers for the `strata` binary

pub mod commands;

use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError};
use crate::node::PropertyValue;
use crate::path::VersionSpec;

/// Read a property value from its command-line spelling. Booleans,
/// integers, floats, `null` and RFC 3339 timestamps are recognized;
/// anything else is text.
pub fn parse_property_value(raw: &str) -> PropertyValue {
    match raw {
        "null" => return PropertyValue::Null,
        "true" => return PropertyValue::Bool(true),
        "false" => return PropertyValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return PropertyValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return PropertyValue::Float(f);
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return PropertyValue::Date(date.with_timezone(&Utc));
    }
    PropertyValue::Text(raw.to_string())
}

/// `--at N` means committed version N; no flag or `--at -1` means head.
pub fn version_arg(at: Option<i64>) -> Result<VersionSpec> {
    at.map(VersionSpec::from_i64).unwrap_or(Ok(VersionSpec::Head))
}

pub fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::invalid(format!("bad time {:?}: {}", raw, e)))
}
