use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::constants::WEBHOOK_SIGNATURE_HEADER;
use crate::crypto::webhook::WebhookVerifier;
use crate::error::{AppError, Result};
use crate::events::{EventKind, WebhookEnvelope};
use crate::models::HookAck;

use super::AppState;

// ==================== HOOK INGRESS ====================
//
// Each on-chain event type gets its own route so the mirror provider can be
// pointed at one URL per subscription. Every handler runs the same pipeline:
// authenticate the raw body, parse the envelope, then apply the mutation for
// the event kind this route is pinned to.

/// POST /api/v1/hooks/mint
pub async fn mint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::Mint, &headers, &body).await
}

/// POST /api/v1/hooks/transfer
pub async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::Transfer, &headers, &body).await
}

/// POST /api/v1/hooks/race-created
pub async fn race_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::RaceCreated, &headers, &body).await
}

/// POST /api/v1/hooks/racer-entered
pub async fn racer_entered(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::RacerEntered, &headers, &body).await
}

/// POST /api/v1/hooks/race-cancelled
pub async fn race_cancelled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::RaceCancelled, &headers, &body).await
}

/// POST /api/v1/hooks/race-finished
pub async fn race_finished(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HookAck>> {
    handle_hook(state, EventKind::RaceFinished, &headers, &body).await
}

async fn handle_hook(
    state: AppState,
    kind: EventKind,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<HookAck>> {
    let envelope = verify_and_parse(state.config.webhook_secret.as_deref(), headers, body)?;

    let ack = state.processor.process(kind, &envelope).await?;

    Ok(Json(ack))
}

/// Authentication happens against the raw request bytes, before any JSON
/// parsing, so a forged or corrupted delivery is rejected without touching
/// the database.
fn verify_and_parse(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookEnvelope> {
    let secret = secret
        .ok_or_else(|| AppError::Config("WEBHOOK_SECRET is not configured".to_string()))?;

    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .ok_or(AppError::MissingSignature)?
        .to_str()
        .map_err(|_| AppError::InvalidSignature)?;

    WebhookVerifier::verify(secret, body, signature)?;

    WebhookEnvelope::parse(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-webhook-secret";

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = WebhookVerifier::sign(SECRET, body);
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_correctly_signed_body() {
        let body = br#"{"event_name":"Mint","parameters":{}}"#;
        let headers = signed_headers(body);

        let envelope = verify_and_parse(Some(SECRET), &headers, body).unwrap();
        assert_eq!(envelope.event_name, "Mint");
    }

    #[test]
    fn rejects_when_secret_is_not_configured() {
        let body = br#"{"event_name":"Mint"}"#;
        let headers = signed_headers(body);

        let err = verify_and_parse(None, &headers, body).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn rejects_missing_signature_header() {
        let body = br#"{"event_name":"Mint"}"#;
        let headers = HeaderMap::new();

        let err = verify_and_parse(Some(SECRET), &headers, body).unwrap_err();
        assert!(matches!(err, AppError::MissingSignature));
    }

    #[test]
    fn rejects_tampered_body() {
        // Tanda tangan dihitung dari body asli, lalu satu byte diubah
        let body = br#"{"event_name":"Mint","parameters":{"token_id":1}}"#;
        let headers = signed_headers(body);

        let mut tampered = body.to_vec();
        tampered[30] ^= 0x01;

        let err = verify_and_parse(Some(SECRET), &headers, &tampered).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
    }

    #[test]
    fn rejects_signature_from_other_secret() {
        let body = br#"{"event_name":"Transfer"}"#;
        let mut headers = HeaderMap::new();
        let signature = WebhookVerifier::sign("other-secret", body);
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).unwrap(),
        );

        let err = verify_and_parse(Some(SECRET), &headers, body).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
    }

    #[test]
    fn malformed_json_fails_after_signature_passes() {
        let body = b"not json at all";
        let headers = signed_headers(body);

        let err = verify_and_parse(Some(SECRET), &headers, body).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
