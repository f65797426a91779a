//! (De)serialization of facet arrays and attribute maps (§4.1).
//!
//! Facets (`subjects`, `predicates`, `contexts`, `actors`) are always
//! marshalled as JSON arrays, even when empty, and element order is
//! preserved on round-trip. The attribute map tolerates a missing, empty, or
//! `null` source and always decodes to an empty map rather than an error.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Encode a facet sequence to its persisted JSON-array text form.
///
/// # Errors
/// Returns [`Error::Codec`] if any element fails to serialize (this cannot
/// happen for `&str`/`String` elements, but the signature matches the
/// decode side and surfaces the attestation ID on failure).
pub fn encode_facet(field: &str, values: &[String], attestation_id: Option<&str>) -> Result<String> {
    serde_json::to_string(values).map_err(|source| Error::Codec {
        field: field.to_string(),
        attestation_id: attestation_id.map(str::to_string),
        source,
    })
}

/// Decode a persisted facet column back into an ordered sequence of strings.
///
/// # Errors
/// Returns [`Error::Codec`] if the stored text is not a valid JSON array of
/// strings.
pub fn decode_facet(field: &str, raw: &str, attestation_id: Option<&str>) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|source| Error::Codec {
        field: field.to_string(),
        attestation_id: attestation_id.map(str::to_string),
        source,
    })
}

/// Encode an attribute map to its persisted JSON-object text form. A `None`
/// map persists as an empty string, which [`decode_attributes`] treats the
/// same as JSON `null`.
///
/// # Errors
/// Returns [`Error::Codec`] if the map fails to serialize.
pub fn encode_attributes(
    attributes: Option<&HashMap<String, Value>>,
    attestation_id: Option<&str>,
) -> Result<Option<String>> {
    match attributes {
        None => Ok(None),
        Some(map) => serde_json::to_string(map)
            .map(Some)
            .map_err(|source| Error::Codec {
                field: "attributes".to_string(),
                attestation_id: attestation_id.map(str::to_string),
                source,
            }),
    }
}

/// Decode a persisted attribute column. A missing, empty, or `null` source
/// yields an empty map rather than an error.
///
/// # Errors
/// Returns [`Error::Codec`] if the stored text is non-empty and not a valid
/// JSON object.
pub fn decode_attributes(
    raw: Option<&str>,
    attestation_id: Option<&str>,
) -> Result<HashMap<String, Value>> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(HashMap::new());
    }
    serde_json::from_str(trimmed).map_err(|source| Error::Codec {
        field: "attributes".to_string(),
        attestation_id: attestation_id.map(str::to_string),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn facet_round_trips_preserving_order() {
        let values = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let encoded = encode_facet("subjects", &values, None).unwrap();
        let decoded = decode_facet("subjects", &encoded, None).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn empty_facet_round_trips_as_empty_array() {
        let encoded = encode_facet("actors", &[], None).unwrap();
        assert_eq!(encoded, "[]");
        assert_eq!(decode_facet("actors", &encoded, None).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn missing_attributes_decode_to_empty_map() {
        assert_eq!(decode_attributes(None, None).unwrap(), HashMap::new());
    }

    #[test]
    fn null_attributes_decode_to_empty_map() {
        assert_eq!(decode_attributes(Some("null"), None).unwrap(), HashMap::new());
    }

    #[test]
    fn empty_string_attributes_decode_to_empty_map() {
        assert_eq!(decode_attributes(Some(""), None).unwrap(), HashMap::new());
    }

    #[test]
    fn attributes_round_trip() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), json!(42));
        let encoded = encode_attributes(Some(&map), None).unwrap().unwrap();
        let decoded = decode_attributes(Some(&encoded), None).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn invalid_json_surfaces_codec_error_with_field() {
        let err = decode_facet("subjects", "{not valid", Some("AS-1")).unwrap_err();
        match err {
            Error::Codec { field, attestation_id, .. } => {
                assert_eq!(field, "subjects");
                assert_eq!(attestation_id.as_deref(), Some("AS-1"));
            }
            _ => panic!("expected codec error"),
        }
    }
}
