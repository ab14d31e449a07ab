// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook source (spec §4.3 "Webhook").
//!
//! Mounts `POST /hooks/*path` on an externally owned [`axum::Router`].
//! The raw body is read as [`Bytes`] and HMAC-verified *before* any JSON
//! decoding happens, so a malformed or oversized payload never reaches
//! `serde_json` ahead of signature verification.

use crate::error::BusError;
use crate::source::{EmitFn, Source};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use halo_core::{Clock, HaloEvent};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const MAX_BODY_BYTES: usize = 256 * 1024;

const SIGNATURE_HEADERS: [&str; 3] = ["x-hub-signature-256", "x-signature-256", "x-webhook-signature"];

/// Resolves a per-path HMAC secret; `None` means the path is unauthenticated.
pub trait SecretResolver: Send + Sync {
    fn secret_for(&self, path: &str) -> Option<Vec<u8>>;
}

/// A resolver with no secrets configured: every path is open.
pub struct NoSecrets;

impl SecretResolver for NoSecrets {
    fn secret_for(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Webhook source: a `Source` whose `start` stashes the emit callback,
/// later invoked by the axum handler mounted via [`WebhookSource::router`].
pub struct WebhookSource {
    id: String,
    emit: Mutex<Option<EmitFn>>,
    secrets: Arc<dyn SecretResolver>,
}

impl WebhookSource {
    pub fn new(id: impl Into<String>, secrets: Arc<dyn SecretResolver>) -> Arc<Self> {
        Arc::new(Self { id: id.into(), emit: Mutex::new(None), secrets })
    }

    /// Builds the `POST /hooks/*path` router, to be merged into the
    /// daemon's externally owned `axum::Router`.
    pub fn router<C: Clock>(self: &Arc<Self>, clock: C) -> Router {
        let state = Arc::new(WebhookState { source: self.clone(), clock });
        Router::new()
            .route("/hooks/*path", post(handle_webhook::<C>))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(state)
    }
}

impl Source for WebhookSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "webhook"
    }

    fn start(&self, emit: EmitFn) -> Result<(), BusError> {
        *self.emit.lock() = Some(emit);
        Ok(())
    }

    fn stop(&self) {
        self.emit.lock().take();
    }
}

struct WebhookState<C: Clock> {
    source: Arc<WebhookSource>,
    clock: C,
}

async fn handle_webhook<C: Clock>(
    State(state): State<Arc<WebhookState<C>>>,
    AxumPath(path): AxumPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> StatusCode {
    if body.len() > MAX_BODY_BYTES {
        return StatusCode::PAYLOAD_TOO_LARGE;
    }

    if let Some(secret) = state.source.secrets.secret_for(&path) {
        let provided = SIGNATURE_HEADERS.iter().find_map(|name| headers.get(*name)).and_then(|v| v.to_str().ok());
        let Some(provided) = provided else {
            return StatusCode::BAD_REQUEST;
        };
        if !verify_signature(&secret, &body, provided) {
            return StatusCode::UNAUTHORIZED;
        }
    }

    let body_json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let dedup_key = body_json
        .get("dedupKey")
        .and_then(|v| v.as_str())
        .map(|k| format!("wh:{k}"))
        .unwrap_or_else(|| format!("wh:{path}:{}", short_body_hash(&body)));

    let headers_map: HashMap<String, String> =
        headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string()))).collect();
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default();

    let payload = json!({
        "path": path,
        "body": body_json,
        "headers": headers_map,
        "query": query,
        "method": "POST",
        "ip": ip,
    });

    let event = HaloEvent::new("webhook.received", "webhook", payload, state.clock.epoch_ms()).with_dedup_key(dedup_key);

    if let Some(emit) = state.source.emit.lock().clone() {
        emit(event);
    }

    StatusCode::OK
}

fn short_body_hash(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(digest)[..16].to_string()
}

fn verify_signature(secret: &[u8], body: &[u8], provided: &str) -> bool {
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(provided_bytes) = hex::decode(provided) else { return false };

    type HmacSha256 = Hmac<Sha256>;
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else { return false };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(&provided_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_signature_verifies() {
        type HmacSha256 = Hmac<Sha256>;
        let secret = b"shh";
        let body = b"{\"hello\":\"world\"}";
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_signature(secret, body, &format!("sha256={sig}")));
        assert!(verify_signature(secret, body, &sig));
    }

    #[test]
    fn wrong_signature_fails() {
        assert!(!verify_signature(b"shh", b"body", "sha256=deadbeef"));
    }

    #[test]
    fn short_body_hash_is_sixteen_hex_chars() {
        let h = short_body_hash(b"hello");
        assert_eq!(h.len(), 16);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
