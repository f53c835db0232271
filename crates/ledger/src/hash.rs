//! Canonical hash encoding for audit events
//!
//! `hash = hex(SHA-256(encoding))`, where `encoding` is, in order:
//!
//! | # | field | framing |
//! |---|-------|---------|
//! | 1 | domain tag `trustcore.audit.v1` | field |
//! | 2 | `id` | 8 bytes big-endian |
//! | 3 | `timestamp` (RFC 3339, UTC, 6 fractional digits, `Z`) | field |
//! | 4 | `prev_hash` | field |
//! | 5 | `actor_id` | field |
//! | 6 | `actor_role` | field |
//! | 7 | `event_type` | field |
//! | 8 | `subject_application_id` | optional field |
//! | 9 | `subject_decision_id` | optional field |
//! | 10 | `session_id` | optional field |
//! | 11 | `payload` (compact JSON, object keys sorted) | field |
//!
//! A *field* is `u64 big-endian length ‖ UTF-8 bytes`. An *optional field* is
//! `0x00` when absent, or `0x01 ‖ field` when present. Any implementation that
//! follows this table reproduces the same bytes.

use crate::event::AuditEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// `prev_hash` of the event with id 0
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Versioned domain separator, first field of every encoding
pub const HASH_DOMAIN: &str = "trustcore.audit.v1";

/// Calculate SHA-256 hash of event content (excluding the hash field itself)
pub fn calculate_event_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(event));
    hex::encode(hasher.finalize())
}

/// Byte encoding fed to the hash function
pub fn canonical_bytes(event: &AuditEvent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    put_field(&mut buf, HASH_DOMAIN);
    buf.extend_from_slice(&event.id.to_be_bytes());
    put_field(&mut buf, &canonical_timestamp(&event.timestamp));
    put_field(&mut buf, &event.prev_hash);
    put_field(&mut buf, &event.actor_id);
    put_field(&mut buf, &event.actor_role);
    put_field(&mut buf, &event.event_type);
    put_optional(&mut buf, event.subject_application_id.as_deref());
    put_optional(&mut buf, event.subject_decision_id.as_deref());
    put_optional(&mut buf, event.session_id.as_deref());
    put_field(&mut buf, &canonical_json(&event.payload));

    buf
}

/// RFC 3339 with exactly microsecond precision, e.g. `2024-01-02T03:04:05.000006Z`
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compact JSON with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_json(value, &mut out);
    out
}

fn write_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // Sorted here rather than relying on the map type
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_json(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn put_field(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

fn put_optional(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(v) => {
            buf.push(0x01);
            put_field(buf, v);
        }
        None => buf.push(0x00),
    }
}
