//! # Nuntius Relay
//!
//! The untrusted relay server: it stores signed pre-keys and one-time key
//! bundles per identity, dispenses them to session initiators, and forwards
//! opaque frames between connected identities over a duplex stream.
//!
//! The relay never sees plaintext — end-to-end encryption happens entirely
//! client-side. It is trusted for availability only.

#![warn(missing_docs)]

pub mod api;
pub mod handler;
pub mod state;
pub mod store;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use nuntius_core::error::Result;

use state::RelayState;
use store::RelayStore;

/// Read/write timeout for the request/response endpoints. The streaming
/// endpoint is exempt — streams live until a peer disconnects.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the relay router around existing state.
pub fn router(state: RelayState) -> Router {
    let timed = Router::new()
        .route("/prekey/:id", post(api::save_prekey))
        .route("/onetime/:id", post(api::save_bundle))
        .route("/onetime/count/:id", get(api::count_onetimes))
        .route("/session/:id", post(api::open_session))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .route("/rtc/:id", get(api::open_stream))
        .merge(timed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store and serve the relay on `port` until the process exits.
pub async fn run(database: Option<&str>, port: u16) -> Result<()> {
    let store = RelayStore::open(database)?;
    let state = RelayState::new(store);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
