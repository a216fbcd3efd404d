//! HTTP endpoint handlers for key distribution.
//!
//! | Verb   | Path                 | Semantics                                   |
//! |--------|----------------------|---------------------------------------------|
//! | POST   | `/prekey/:id`        | Verify signature against id, upsert          |
//! | POST   | `/onetime/:id`       | Verify bundle signature, insert 64 atomically|
//! | GET    | `/onetime/count/:id` | Count outstanding one-time keys              |
//! | POST   | `/session/:id`       | Dispense pre-key + burned one-time key       |
//! | GET    | `/rtc/:id`           | Upgrade to the duplex message stream         |
//!
//! Identities in path parameters are URL-safe base64. Malformed input maps
//! to 400, store failures to 500, an exhausted one-time pool to 410.

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use nuntius_core::crypto::bundle::BundlePub;
use nuntius_core::error::{Error, ErrorKind};
use nuntius_core::protocol::{CountOnetimeResponse, PrekeyRequest, SendBundleRequest, SessionResponse};
use nuntius_core::IdentityPub;

use crate::handler::handle_stream;
use crate::state::RelayState;

/// A handler failure, rendered as a status code plus a diagnostic body.
pub struct ApiError(StatusCode, String);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match error.kind() {
            ErrorKind::Crypto | ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

fn parse_identity(id: &str) -> Result<IdentityPub, ApiError> {
    IdentityPub::from_base64(id).map_err(ApiError::from)
}

/// `POST /prekey/:id` — register a signed pre-key.
pub async fn save_prekey(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(request): Json<PrekeyRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = parse_identity(&id)?;
    if !identity.verify(request.prekey.as_bytes(), &request.sig) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "bad signature".into()));
    }
    state
        .store
        .save_prekey(&identity, &request.prekey, &request.sig)?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /onetime/:id` — upload a signed bundle of one-time keys.
pub async fn save_bundle(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(request): Json<SendBundleRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = parse_identity(&id)?;
    let bundle = BundlePub::from_bytes(request.bundle)?;
    if !bundle.verify(&identity, &request.sig) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "bad signature".into()));
    }
    state.store.add_onetimes(&identity, &bundle)?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /onetime/count/:id` — count outstanding one-time keys.
pub async fn count_onetimes(
    State(state): State<RelayState>,
    Path(id): Path<String>,
) -> Result<Json<CountOnetimeResponse>, ApiError> {
    let identity = parse_identity(&id)?;
    let count = state.store.count_onetimes(&identity)?;
    Ok(Json(CountOnetimeResponse { count }))
}

/// `POST /session/:id` — dispense the key material for a new session.
///
/// The one-time key is burned on dispense; when the pool is exhausted the
/// request fails rather than handing out a weaker bundle.
pub async fn open_session(
    State(state): State<RelayState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let identity = parse_identity(&id)?;
    let (prekey, sig) = state
        .store
        .get_prekey(&identity)?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "no prekey for identity".into()))?;
    let onetime = state
        .store
        .take_onetime(&identity)?
        .ok_or_else(|| ApiError(StatusCode::GONE, "one-time keys exhausted".into()))?;

    Ok(Json(SessionResponse {
        prekey,
        sig,
        onetime: Some(onetime),
    }))
}

/// `GET /rtc/:id` — upgrade to the duplex message stream.
pub async fn open_stream(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = parse_identity(&id)?;
    Ok(ws.on_upgrade(move |socket| handle_stream(socket, identity, state)))
}
