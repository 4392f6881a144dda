//! Route handlers
//!
//! One function per endpoint in the spec's table, plus the small bits of
//! request parsing (query strings, percent-decoding path segments) tiny_http
//! doesn't do for you.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response};

use crate::engine::Engine;
use crate::error::AtlasError;
use crate::replication::ReplicationStatusProvider;

type HttpResponse = Response<Cursor<Vec<u8>>>;

#[derive(Deserialize)]
struct PutBody {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct BatchEntry {
    key: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct BatchPutBody {
    #[serde(default)]
    entries: Option<Vec<BatchEntry>>,
    #[serde(default)]
    keys: Option<Vec<String>>,
    #[serde(default)]
    values: Option<Vec<String>>,
}

pub(super) fn dispatch(
    engine: &Arc<Engine>,
    replication: &Arc<ReplicationStatusProvider>,
    request: &mut Request,
) -> HttpResponse {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(percent_decode)
        .collect();
    let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();

    let mut body = String::new();
    if matches!(method, Method::Post) {
        let _ = request.as_reader().read_to_string(&mut body);
    }

    match (&method, segment_refs.as_slice()) {
        (Method::Get, ["health"]) => json_response(200, json!({"status": "ok", "timestamp": now_ms()})),
        (Method::Post, ["put"]) => handle_put(engine, &body),
        (Method::Post, ["batch-put"]) => handle_batch_put(engine, &body),
        (Method::Get, ["get", key]) => handle_get(engine, key),
        (Method::Delete, ["delete", key]) => handle_delete(engine, key),
        (Method::Get, ["range"]) => handle_range(engine, query),
        (Method::Get, ["replication", "status"]) => handle_replication_status(replication),
        _ => json_response(404, json!({"error": "not found"})),
    }
}

fn handle_put(engine: &Engine, body: &str) -> HttpResponse {
    match serde_json::from_str::<PutBody>(body) {
        Ok(PutBody { key, value }) => match engine.put(key.as_bytes(), value.as_bytes()) {
            Ok(()) => json_response(200, json!({"success": true})),
            Err(e) => error_response(&e),
        },
        Err(_) => json_response(400, json!({"error": "expected body {key, value}"})),
    }
}

fn handle_batch_put(engine: &Engine, body: &str) -> HttpResponse {
    let parsed = serde_json::from_str::<BatchPutBody>(body).unwrap_or_default();

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = if let Some(entries) = parsed.entries {
        entries
            .into_iter()
            .map(|e| (e.key.into_bytes(), e.value.into_bytes()))
            .collect()
    } else if let (Some(keys), Some(values)) = (parsed.keys, parsed.values) {
        if keys.len() != values.len() {
            return json_response(400, json!({"error": "keys and values must be the same length"}));
        }
        keys.into_iter()
            .zip(values)
            .map(|(k, v)| (k.into_bytes(), v.into_bytes()))
            .collect()
    } else {
        Vec::new()
    };

    let count = pairs.len();
    match engine.batch_put(pairs) {
        Ok(()) => json_response(200, json!({"success": true, "count": count})),
        Err(e) => error_response(&e),
    }
}

fn handle_get(engine: &Engine, key: &str) -> HttpResponse {
    match engine.get(key.as_bytes()) {
        Ok(Some(value)) => json_response(
            200,
            json!({"key": key, "value": String::from_utf8_lossy(&value)}),
        ),
        Ok(None) => json_response(404, json!({"error": "not found"})),
        Err(e) => error_response(&e),
    }
}

fn handle_delete(engine: &Engine, key: &str) -> HttpResponse {
    match engine.delete(key.as_bytes()) {
        Ok(()) => json_response(200, json!({"success": true})),
        Err(e) => error_response(&e),
    }
}

fn handle_range(engine: &Engine, query: &str) -> HttpResponse {
    let params = parse_query(query);
    let start = params.get("start").cloned().unwrap_or_default();
    let end = params.get("end").cloned().unwrap_or_default();
    let limit = params.get("limit").and_then(|s| s.parse::<usize>().ok());

    match engine.read_key_range(start.as_bytes(), end.as_bytes(), limit) {
        Ok(results) => {
            let results: Vec<Value> = results
                .into_iter()
                .map(|(k, v)| {
                    json!({
                        "key": String::from_utf8_lossy(&k),
                        "value": String::from_utf8_lossy(&v),
                    })
                })
                .collect();
            json_response(200, json!({"count": results.len(), "results": results}))
        }
        Err(e) => error_response(&e),
    }
}

fn handle_replication_status(replication: &ReplicationStatusProvider) -> HttpResponse {
    let status = replication.status();
    json_response(
        200,
        json!({
            "enabled": status.enabled,
            "state": status.role,
            "metrics": {
                "connected": status.connected,
                "last_sent_seq": status.last_sent_seq,
                "last_acked_seq": status.last_acked_seq,
                "pending_count": status.pending_count,
                "ops_sent": status.ops_sent,
                "ops_acked": status.ops_acked,
                "reconnect_count": status.reconnect_count,
                "last_applied_seq": status.last_applied_seq,
                "ops_applied": status.ops_applied,
                "ops_skipped": status.ops_skipped,
            },
        }),
    )
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header is always valid");
    Response::from_data(bytes)
        .with_status_code(status)
        .with_header(header)
}

fn error_response(e: &AtlasError) -> HttpResponse {
    let status = match e {
        AtlasError::Validation(_) => 400,
        AtlasError::KeyNotFound => 404,
        _ => 500,
    };
    json_response(status, json!({"error": e.to_string()}))
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url, ""),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect()
}

/// Minimal `application/x-www-form-urlencoded`-style percent-decoder: `+`
/// becomes a space, `%XX` becomes the byte it encodes. Good enough for path
/// segments and query values; invalid escapes pass through unchanged.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
