//! Identity provider client for the dashboard's auth API.
//!
//! `HttpIdentityProvider` exchanges credentials for an access token and
//! re-validates a token by asking the provider who it belongs to.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::auth::{Credentials, UserIdentity};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Sign-in endpoint, relative to the provider base URL
const SIGN_IN_PATH: &str = "/api/auth/sign-in";

/// Current-user endpoint, relative to the provider base URL
const ME_PATH: &str = "/api/auth/me";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// What the provider hands back for accepted credentials.
#[derive(Debug, Clone)]
pub struct ProviderGrant {
    pub token: String,
    pub user: UserIdentity,
    /// Token lifetime in seconds, when the provider states one
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    user: UserIdentity,
    #[serde(rename = "expiresIn", default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: UserIdentity,
}

/// The external system of record for credentials and tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for a token and the identity it belongs to
    async fn exchange_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderGrant, ApiError>;

    /// Look up the identity behind a previously issued token
    async fn fetch_identity(&self, token: &str) -> Result<UserIdentity, ApiError>;
}

/// Identity provider reached over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e))
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderGrant, ApiError> {
        let url = self.url(SIGN_IN_PATH);
        debug!(url = %url, email = %credentials.email, "Sending sign-in request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(credentials)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let parsed: SignInResponse = Self::parse(response, "sign-in").await?;

        if parsed.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Access token not found in response".to_string(),
            ));
        }

        Ok(ProviderGrant {
            token: parsed.access_token,
            user: parsed.user,
            expires_in: parsed.expires_in,
        })
    }

    async fn fetch_identity(&self, token: &str) -> Result<UserIdentity, ApiError> {
        let url = self.url(ME_PATH);
        debug!(url = %url, "Fetching current user");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let parsed: MeResponse = Self::parse(response, "current user").await?;
        Ok(parsed.user)
    }
}
