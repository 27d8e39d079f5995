//! Effective-payload extraction from a REQ frame's argument bytes.

use ciborium::value::Value as Cbor;

use capkey::CapKey;

use crate::errors::RuntimeError;

/// Extracts the bytes a handler should actually see, given a REQ frame's
/// `content_type` and its joined argument payload.
///
/// If `content_type` isn't `application/cbor`, the payload is returned
/// verbatim. Otherwise it must decode to an array of `{media_urn, value}`
/// maps; the entry whose `media_urn` matches the capability's declared
/// `in` tag is selected.
pub fn extract_effective_payload(
    content_type: Option<&str>,
    payload: &[u8],
    cap_urn: &str,
) -> Result<Vec<u8>, RuntimeError> {
    if content_type != Some("application/cbor") {
        return Ok(payload.to_vec());
    }

    let cap = CapKey::parse(cap_urn).map_err(|source| RuntimeError::InvalidCapUrn {
        urn: cap_urn.to_string(),
        source,
    })?;
    let wanted_media = cap
        .tag("in")
        .ok_or_else(|| RuntimeError::InvalidCapUrn {
            urn: cap_urn.to_string(),
            source: capkey::CapKeyError::InvalidFormat,
        })?
        .to_string();

    let value: Cbor = ciborium::de::from_reader(payload).map_err(|e| RuntimeError::MalformedPayload {
        message: e.to_string(),
    })?;

    let entries = match value {
        Cbor::Array(entries) => entries,
        _ => return Err(RuntimeError::PayloadNotArray),
    };

    for entry in entries {
        let Cbor::Map(fields) = entry else {
            return Err(RuntimeError::PayloadNotArray);
        };
        let media_urn = fields
            .iter()
            .find(|(k, _)| k.as_text() == Some("media_urn"))
            .and_then(|(_, v)| v.as_text());
        let bytes = fields
            .iter()
            .find(|(k, _)| k.as_text() == Some("value"))
            .and_then(|(_, v)| v.as_bytes());

        if let (Some(media_urn), Some(bytes)) = (media_urn, bytes) {
            if media_urn == wanted_media {
                return Ok(bytes.to_vec());
            }
        }
    }

    Err(RuntimeError::NoMatchingMediaType { media_urn: wanted_media })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbor_array_payload(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let value = Cbor::Array(
            entries
                .iter()
                .map(|(media_urn, bytes)| {
                    Cbor::Map(vec![
                        (Cbor::Text("media_urn".to_string()), Cbor::Text(media_urn.to_string())),
                        (Cbor::Text("value".to_string()), Cbor::Bytes(bytes.to_vec())),
                    ])
                })
                .collect(),
        );
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn non_cbor_content_type_passes_through_verbatim() {
        let out = extract_effective_payload(Some("text/plain"), b"hello", "action=x;in=text").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn absent_content_type_passes_through_verbatim() {
        let out = extract_effective_payload(None, b"raw", "action=x;in=text").unwrap();
        assert_eq!(out, b"raw");
    }

    #[test]
    fn cbor_array_selects_matching_media_urn() {
        let payload = cbor_array_payload(&[
            ("text/plain", b"plain bytes"),
            ("application/json", b"{}"),
        ]);
        let out = extract_effective_payload(
            Some("application/cbor"),
            &payload,
            "action=x;in=application/json",
        )
        .unwrap();
        assert_eq!(out, b"{}");
    }

    #[test]
    fn cbor_array_with_no_match_is_an_error() {
        let payload = cbor_array_payload(&[("text/plain", b"plain")]);
        let err = extract_effective_payload(
            Some("application/cbor"),
            &payload,
            "action=x;in=application/json",
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::NoMatchingMediaType { .. }));
    }

    #[test]
    fn non_array_cbor_top_level_is_rejected() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Cbor::Integer(1.into()), &mut buf).unwrap();
        let err = extract_effective_payload(Some("application/cbor"), &buf, "action=x;in=text").unwrap_err();
        assert!(matches!(err, RuntimeError::PayloadNotArray));
    }

    #[test]
    fn cap_urn_without_in_tag_is_rejected() {
        let payload = cbor_array_payload(&[("text/plain", b"x")]);
        let err = extract_effective_payload(Some("application/cbor"), &payload, "action=x").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCapUrn { .. }));
    }
}
