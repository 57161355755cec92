//! GitHub App authentication.
//!
//! An [`AppAuth`] signs short-lived RS256 JWTs with the App's private key and
//! exchanges them for installation access tokens. Installation tokens are
//! cached per installation until shortly before they expire.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Secret;
use crate::error::{Result, UciError};

pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Cached tokens are refreshed this long before GitHub expires them.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct AppAuth {
    app_id: u64,
    key: EncodingKey,
    http: reqwest::Client,
    api_base: String,
    tokens: Mutex<HashMap<u64, CachedToken>>,
}

impl std::fmt::Debug for AppAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuth")
            .field("app_id", &self.app_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl AppAuth {
    /// Parse the App's PEM key. Fails with `UciError::Auth` if it is not a
    /// usable RSA private key.
    pub fn new(
        app_id: u64,
        private_key: &Secret,
        http: reqwest::Client,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key.expose())
            .map_err(|e| UciError::Auth(format!("invalid private key: {e}")))?;
        Ok(Self {
            app_id,
            key,
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// The shared outbound client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// API root without a trailing slash.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Sign a JWT identifying the App itself, valid for ten minutes.
    pub fn app_jwt(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iat: now - 60,
            exp: now + 600,
            iss: self.app_id.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }

    /// Installation access token for `installation_id`, minted on demand.
    pub async fn installation_token(&self, installation_id: u64) -> Result<String> {
        if let Some(token) = self.cached(installation_id) {
            return Ok(token);
        }

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );
        let response = self
            .http
            .post(url)
            .header("Accept", GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(self.app_jwt()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UciError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: InstallationTokenResponse = response.json().await?;
        debug!(
            installation_id,
            expires_at = %payload.expires_at,
            "minted installation token"
        );

        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                installation_id,
                CachedToken {
                    token: payload.token.clone(),
                    expires_at: payload.expires_at,
                },
            );
        Ok(payload.token)
    }

    fn cached(&self, installation_id: u64) -> Option<String> {
        let tokens = self
            .tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cached = tokens.get(&installation_id)?;
        let fresh_until = cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS);
        (Utc::now() < fresh_until).then(|| cached.token.clone())
    }
}
