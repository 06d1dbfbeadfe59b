//! Refresh-token grant against Google's OAuth 2.0 token endpoint.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const GOOGLE_TOKEN_HOST: &str = "https://oauth2.googleapis.com";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token endpoint unreachable: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid token endpoint url: {0}")]
    Url(#[from] url::ParseError),
    /// Google answered with its `{"error": .., "error_description": ..}` body.
    #[error("google rejected the refresh ({status}, {code}): {description}")]
    Rejected {
        status: StatusCode,
        code: String,
        description: String,
    },
    #[error("token endpoint returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

impl OAuthError {
    /// `invalid_grant`: the refresh token was revoked or has expired, so only
    /// a new consent can recover.
    pub fn is_revoked_grant(&self) -> bool {
        matches!(self, OAuthError::Rejected { code, .. } if code == "invalid_grant")
    }
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Installed-app credentials used to trade a refresh token for access tokens.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Self::with_base_url(GOOGLE_TOKEN_HOST, client_id, client_secret)
    }

    pub fn with_base_url(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            http: Client::new(),
            token_url: Url::parse(base_url)?.join("/token")?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Google keeps the refresh token valid across refreshes and usually
    /// leaves it out of the response.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<OAuthToken>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<GoogleErrorBody>(&body) {
            Ok(google) => OAuthError::Rejected {
                status,
                code: google.error,
                description: google.error_description.unwrap_or_default(),
            },
            Err(_) => OAuthError::Api { status, body },
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes, e.g. `https://www.googleapis.com/auth/drive`.
    #[serde(default)]
    pub scope: Option<String>,
}
