//! # Relay API Client
//!
//! Typed HTTP client for the relay's request/response endpoints, plus the
//! registration flows built on top of it: pre-key renewal and one-time
//! bundle upload.

use reqwest::StatusCode;

use crate::crypto::bundle::{generate_bundle, BundlePub};
use crate::crypto::keys::{generate_exchange, ExchangePub, IdentityPriv, IdentityPub, Signature};
use crate::error::{Error, Result};
use crate::protocol::{CountOnetimeResponse, PrekeyRequest, SendBundleRequest, SessionResponse};
use crate::store::ClientStore;

/// A typed client for one relay server.
#[derive(Debug, Clone)]
pub struct ClientApi {
    root: String,
    http: reqwest::Client,
}

impl ClientApi {
    /// Create a client for the relay at `url` (e.g. `http://localhost:1234`).
    pub fn new(url: &str) -> Self {
        Self {
            root: url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// The base URL this client talks to.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn check(status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::ServerStatus(status.to_string()))
        }
    }

    /// Register a new signed pre-key for an identity.
    pub async fn send_prekey(
        &self,
        identity: &IdentityPub,
        prekey: &ExchangePub,
        sig: &Signature,
    ) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/prekey/{}", self.root, identity.to_base64()))
            .json(&PrekeyRequest {
                prekey: *prekey,
                sig: *sig,
            })
            .send()
            .await?;
        Self::check(response.status())
    }

    /// Upload a signed bundle of one-time keys for an identity.
    pub async fn send_bundle(
        &self,
        identity: &IdentityPub,
        bundle: &BundlePub,
        sig: &Signature,
    ) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/onetime/{}", self.root, identity.to_base64()))
            .json(&SendBundleRequest {
                bundle: bundle.as_bytes().to_vec(),
                sig: *sig,
            })
            .send()
            .await?;
        Self::check(response.status())
    }

    /// Count the one-time keys the relay still holds for an identity.
    pub async fn count_onetimes(&self, identity: &IdentityPub) -> Result<i64> {
        let response = self
            .http
            .get(format!(
                "{}/onetime/count/{}",
                self.root,
                identity.to_base64()
            ))
            .send()
            .await?;
        Self::check(response.status())?;
        let body: CountOnetimeResponse = response.json().await?;
        Ok(body.count)
    }

    /// Fetch the key material needed to open a session with an identity.
    ///
    /// The one-time key in the response is burned by the relay on dispense.
    pub async fn fetch_session(&self, identity: &IdentityPub) -> Result<SessionResponse> {
        let response = self
            .http
            .post(format!("{}/session/{}", self.root, identity.to_base64()))
            .send()
            .await?;
        Self::check(response.status())?;
        Ok(response.json().await?)
    }
}

// ── Registration flows ────────────────────────────────────────────────────────

/// Generate a fresh signed pre-key, register it with the relay, and persist
/// the pair locally. Returns the new public pre-key.
pub async fn renew_prekey(
    api: &ClientApi,
    store: &ClientStore,
    public: &IdentityPub,
    private: &IdentityPriv,
) -> Result<ExchangePub> {
    let (prekey_pub, prekey_priv) = generate_exchange();
    let sig = private.sign(prekey_pub.as_bytes());

    api.send_prekey(public, &prekey_pub, &sig).await?;
    store.save_prekey(&prekey_pub, &prekey_priv)?;
    Ok(prekey_pub)
}

/// Upload a fresh one-time bundle when the relay has run dry for us.
///
/// Returns whether a new bundle was created.
pub async fn ensure_bundle(
    api: &ClientApi,
    store: &ClientStore,
    public: &IdentityPub,
    private: &IdentityPriv,
) -> Result<bool> {
    let outstanding = api.count_onetimes(public).await?;
    if outstanding > 0 {
        return Ok(false);
    }

    let (bundle_pub, bundle_priv) = generate_bundle();
    let sig = bundle_pub.sign(private);

    api.send_bundle(public, &bundle_pub, &sig).await?;
    store.save_onetime_bundle(&bundle_pub, &bundle_priv)?;
    Ok(true)
}
