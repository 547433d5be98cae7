use actix_web::http::header::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_ID_HEADER: &str = "svix-id";
const ENVELOPE_TIMESTAMP_HEADER: &str = "svix-timestamp";
const ENVELOPE_SIGNATURE_HEADER: &str = "svix-signature";
const ENVELOPE_SECRET_PREFIX: &str = "whsec_";
const ENVELOPE_TOLERANCE_SECS: i64 = 300;

const LEGACY_SIGNATURE_HEADERS: [&str; 2] = ["resend-signature", "x-resend-signature"];
const LEGACY_TIMESTAMP_HEADERS: [&str; 2] = ["resend-timestamp", "x-resend-timestamp"];

/// Checks the authenticity of an inbound webhook delivery against the shared
/// secret. The provider migrated from a plain HMAC header pair to envelope
/// signatures; deliveries carrying the envelope header triple are verified
/// with the envelope algorithm, everything else falls back to the legacy
/// scheme. Fails closed: any missing header, parse failure or mismatch is a
/// plain `false`, never an error.
pub fn verify_signature(raw_body: &[u8], headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let envelope_id = header_value(headers, ENVELOPE_ID_HEADER);
    let envelope_timestamp = header_value(headers, ENVELOPE_TIMESTAMP_HEADER);
    let envelope_signatures = header_value(headers, ENVELOPE_SIGNATURE_HEADER);

    if let (Some(id), Some(timestamp), Some(signatures)) =
        (envelope_id, envelope_timestamp, envelope_signatures)
    {
        return verify_envelope_signature(raw_body, id, timestamp, signatures, secret);
    }

    verify_legacy_signature(raw_body, headers, secret)
}

/// Envelope scheme: HMAC-SHA256 keyed with the base64-decoded secret (the
/// `whsec_` prefix is not part of the key) over `{id}.{timestamp}.{body}`.
/// The signature header carries a whitespace-separated list of
/// `{version},{base64}` entries; any matching `v1` entry authenticates the
/// delivery. Stale timestamps are rejected.
fn verify_envelope_signature(
    raw_body: &[u8],
    id: &str,
    timestamp: &str,
    signatures: &str,
    secret: &str,
) -> bool {
    let encoded_key = secret
        .strip_prefix(ENVELOPE_SECRET_PREFIX)
        .unwrap_or(secret);
    let key = match BASE64_STANDARD.decode(encoded_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let issued_at = match timestamp.parse::<i64>() {
        Ok(issued_at) => issued_at,
        Err(_) => return false,
    };
    if (Utc::now().timestamp() - issued_at).abs() > ENVELOPE_TOLERANCE_SECS {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(&key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    signatures
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .filter_map(|(_, encoded)| BASE64_STANDARD.decode(encoded).ok())
        .any(|candidate| safe_eq(&candidate, &expected))
}

/// Legacy scheme: lowercase-hex HMAC-SHA256 keyed with the raw secret string
/// over `{timestamp}.{body}`.
fn verify_legacy_signature(raw_body: &[u8], headers: &HeaderMap, secret: &str) -> bool {
    let signature_header = first_header_value(headers, &LEGACY_SIGNATURE_HEADERS);
    let timestamp = first_header_value(headers, &LEGACY_TIMESTAMP_HEADERS);

    let (signature_header, timestamp) = match (signature_header, timestamp) {
        (Some(signature_header), Some(timestamp)) => (signature_header, timestamp),
        _ => return false,
    };

    let signature = parse_legacy_signature(signature_header);
    if signature.is_empty() {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let expected = hex::encode(mac.finalize().into_bytes());

    safe_eq(signature.as_bytes(), expected.as_bytes())
}

/// The legacy header is either a comma-separated list of `key=value` pairs,
/// in which case the `v1` value is the signature, or a single bare token.
fn parse_legacy_signature(header: &str) -> &str {
    let entries: Vec<&str> = header
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    for entry in &entries {
        if let Some((key, value)) = entry.split_once('=') {
            if key == "v1" && !value.is_empty() {
                return value;
            }
        }
    }

    if entries.len() == 1 && !entries[0].contains('=') {
        return entries[0];
    }

    ""
}

/// Differing lengths are rejected up front; equal lengths are compared in
/// constant time.
fn safe_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.ct_eq(right).into()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn first_header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| header_value(headers, name))
}
