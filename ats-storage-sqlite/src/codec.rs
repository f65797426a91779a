//! Row <-> domain-type conversions shared by every `storage::*` module.
//!
//! Facets (`subjects`, `predicates`, `contexts`, `actors`) are stored as
//! JSON text arrays so the `LIKE '%"value"%'` fragments built by
//! `ats_core::query::builder` can match membership without a join table.
//! Timestamps are stored as Unix-second integers, matching the `Int`
//! variant `ats_core::query::QueryParam` uses for temporal bounds.

use ats_core::query::QueryParam;
use ats_core::Error;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub(crate) fn encode_facet(values: &[String]) -> ats_core::Result<String> {
    serde_json::to_string(values).map_err(|source| Error::Codec {
        field: "facet".to_string(),
        attestation_id: None,
        source,
    })
}

pub(crate) fn decode_facet(json: &str, field: &str, attestation_id: Option<&str>) -> ats_core::Result<Vec<String>> {
    serde_json::from_str(json).map_err(|source| Error::Codec {
        field: field.to_string(),
        attestation_id: attestation_id.map(str::to_string),
        source,
    })
}

pub(crate) fn encode_attributes(attributes: &Option<HashMap<String, Value>>) -> ats_core::Result<Option<String>> {
    attributes
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| Error::Codec {
            field: "attributes".to_string(),
            attestation_id: None,
            source,
        })
}

pub(crate) fn decode_attributes(
    json: Option<String>,
    attestation_id: Option<&str>,
) -> ats_core::Result<Option<HashMap<String, Value>>> {
    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|source| Error::Codec {
            field: "attributes".to_string(),
            attestation_id: attestation_id.map(str::to_string),
            source,
        })
}

pub(crate) fn to_unix_seconds(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

pub(crate) fn from_unix_seconds(secs: i64, field: &str) -> ats_core::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| Error::backend("timestamp_decode", format!("invalid unix timestamp {secs} for field `{field}`")))
}

/// Convert an `ats_core` backend-agnostic query parameter to a libsql value.
pub(crate) fn query_param_to_value(param: &QueryParam) -> libsql::Value {
    match param {
        QueryParam::Text(s) => libsql::Value::Text(s.clone()),
        QueryParam::Real(r) => libsql::Value::Real(*r),
        QueryParam::Int(i) => libsql::Value::Integer(*i),
    }
}

pub(crate) fn query_params_to_values(params: &[QueryParam]) -> Vec<libsql::Value> {
    params.iter().map(query_param_to_value).collect()
}
