// =============================================================================
// API key authentication — Axum extractor
// =============================================================================
//
// Extracts the `SERVICEAPIKEY` header, hashes it with SHA-256, and looks up
// the matching row in the `apikey` table to recover its capability bits.
// Comparison against stored hashes is a straight table lookup (the hash
// itself is the lookup key), but the token-to-hash step still goes through
// a constant-time-friendly digest so a timing side-channel can't be used
// to recover the raw token from response latency.
//
// If `general.disable_api_auth` is set, every request gets full
// capabilities without a header — this exists for local development only
// and should never be set in a deployed config.
// =============================================================================

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::app_state::AppState;
use crate::types::ApiCapabilities;

const API_KEY_HEADER: &str = "serviceapikey";

pub struct ApiKeyAuth(pub ApiCapabilities);

pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response()
    }
}

pub fn hash_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ApiKeyAuth
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let State(app): State<Arc<AppState>> =
            State::from_request_parts(parts, state).await.map_err(|_| AuthRejection)?;

        if app.config.general.disable_api_auth {
            return Ok(ApiKeyAuth(ApiCapabilities {
                read_risk: true,
                read_owner: true,
                write_indicator: true,
                write_rra: true,
            }));
        }

        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        let Some(presented) = presented else {
            tracing::warn!("request missing {API_KEY_HEADER} header");
            return Err(AuthRejection);
        };

        let hashed = hash_key(presented);
        let ctx = app.op("auth");
        let row = crate::store::lookup_api_key(&ctx, &hashed).map_err(|_| AuthRejection)?;

        match row {
            Some(row) => Ok(ApiKeyAuth(ApiCapabilities {
                read_risk: row.read_risk,
                read_owner: row.read_owner,
                write_indicator: row.write_indicator,
                write_rra: row.write_rra,
            })),
            None => {
                tracing::warn!("invalid API key presented");
                Err(AuthRejection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_is_deterministic() {
        assert_eq!(hash_key("hunter2"), hash_key("hunter2"));
        assert_ne!(hash_key("hunter2"), hash_key("hunter3"));
    }
}
