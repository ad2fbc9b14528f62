//! Authentication (spec §4.4.1)
//!
//! A single static credential pair is configured; a matching POST to the
//! auth endpoint returns an opaque bearer token signed HS256. Grounded on
//! the teacher's `router/middleware/auth.rs` (bearer-token extraction +
//! `jsonwebtoken` HS256 decode), generalised from a fixed node token to an
//! issued, expiring one.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GatewayError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

pub fn issue_token(subject: &str, secret: &str, ttl_seconds: i64) -> Result<String, GatewayError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        subject: subject.to_string(),
        issued_at: now,
        expires_at: now + ttl_seconds,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| GatewayError::Internal(format!("token signing failed: {e}")))
}

/// Missing, malformed, wrong-scheme, expired, or signature-invalid tokens
/// all collapse to the same `Unauthorized` (spec §4.4.1) — the auth
/// subsystem never leaks which failure mode occurred.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, GatewayError> {
    // `jsonwebtoken`'s default `Validation` already rejects an expired
    // `exp` claim, but our claim is named `expires_at`, not `exp`, so
    // disable that built-in check and do it ourselves below.
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| GatewayError::Unauthorized("invalid token".to_string()))?;

    if data.claims.expires_at < Utc::now().timestamp() {
        return Err(GatewayError::Unauthorized("token expired".to_string()));
    }

    Ok(data.claims)
}

#[derive(Clone)]
pub struct AuthState {
    pub username: String,
    pub password: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct AuthParametersBody {
    #[serde(rename = "USERNAME")]
    pub username: String,
    #[serde(rename = "PASSWORD")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(rename = "AuthParameters")]
    pub auth_parameters: AuthParametersBody,
}

/// `POST <auth_path> {"AuthParameters":{"USERNAME","PASSWORD"}}` (spec
/// §6.1). On match, `200 {"AuthenticationResult":{"IdToken": "<opaque>"}}`.
pub async fn handle_auth(State(auth): State<AuthState>, Json(req): Json<AuthRequest>) -> Response {
    if req.auth_parameters.username != auth.username || req.auth_parameters.password != auth.password {
        return GatewayError::Unauthorized("invalid credentials".to_string()).into_response();
    }

    match issue_token(&req.auth_parameters.username, &auth.jwt_secret, auth.token_ttl_seconds) {
        Ok(token) => {
            Json(json!({ "AuthenticationResult": { "IdToken": token } })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Subject carried by a validated bearer token, attached to the request
/// context so the event builder can populate the `authorizer` block.
#[derive(Clone, Debug)]
pub struct AuthenticatedSubject(pub String);

pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header = request.headers().get("Authorization").and_then(|h| h.to_str().ok());

    let token = match header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => {
            return GatewayError::Unauthorized("missing or invalid authorization header".to_string())
                .into_response();
        }
    };

    match validate_token(token, &auth.jwt_secret) {
        Ok(claims) => {
            request
                .extensions_mut()
                .insert(AuthenticatedSubject(claims.subject));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

