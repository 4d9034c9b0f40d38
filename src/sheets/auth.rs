//! Google credentials: service account keys and bearer tokens

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{CredentialSource, SCOPES};
use crate::error::{TrackerError, TrackerResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME: i64 = 3600;
/// Refresh this long before the token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service account JSON key the tracker uses
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> TrackerResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TrackerError::Auth(format!("invalid service account key: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug)]
enum Method {
    ServiceAccount(ServiceAccountKey),
    Static(String),
}

/// Hands out bearer tokens for the Sheets and Drive APIs
#[derive(Debug)]
pub struct Authenticator {
    method: Method,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    pub fn from_source(source: &CredentialSource, http: reqwest::Client) -> TrackerResult<Self> {
        let method = match source {
            CredentialSource::Inline(json) => Method::ServiceAccount(ServiceAccountKey::from_json(json)?),
            CredentialSource::File(path) => Method::ServiceAccount(ServiceAccountKey::from_file(path)?),
            CredentialSource::AccessToken(token) => Method::Static(token.clone()),
        };
        if let Method::ServiceAccount(key) = &method {
            info!("Using service account {}", key.client_email);
        }
        Ok(Self {
            method,
            http,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, minting a new one when the cached one is stale
    pub async fn token(&self) -> TrackerResult<String> {
        let key = match &self.method {
            Method::Static(token) => return Ok(token.clone()),
            Method::ServiceAccount(key) => key,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange(key).await?;
        let value = fresh.access_token.clone();
        *cached = Some(fresh.into_cached());
        Ok(value)
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> TrackerResult<TokenResponse> {
        let assertion = sign_assertion(key, Utc::now().timestamp())?;
        debug!("Requesting access token from {}", key.token_uri);

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        Ok(response.json::<TokenResponse>().await?)
    }
}

impl TokenResponse {
    fn into_cached(self) -> CachedToken {
        let lifetime = Duration::from_secs(self.expires_in.unwrap_or(TOKEN_LIFETIME as u64));
        CachedToken {
            value: self.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        }
    }
}

/// RS256 JWT assertion for the OAuth token exchange
pub fn sign_assertion(key: &ServiceAccountKey, issued_at: i64) -> TrackerResult<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SCOPES.join(" "),
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + TOKEN_LIFETIME,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| TrackerError::Auth(format!("invalid private key: {}", e)))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| TrackerError::Auth(format!("failed to sign assertion: {}", e)))
}
