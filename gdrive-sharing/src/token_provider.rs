use gdrive_core::{OAuthClient, OAuthError};
use thiserror::Error;

use crate::storage::{OAuthState, now_unix};

/// Full Drive access. `drive.file` only sees objects the app created.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Access tokens are renewed this long before Google's stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("GDRIVE_CLIENT_ID and GDRIVE_CLIENT_SECRET are required to refresh the token")]
    MissingOAuthClient,
    #[error("no refresh token saved; set GDRIVE_REFRESH_TOKEN")]
    MissingRefreshToken,
    #[error("google token refresh failed: {0}")]
    OAuth(#[from] OAuthError),
    #[error("granted scopes '{0}' do not include {DRIVE_SCOPE}")]
    InsufficientScope(String),
}

/// Hands out Drive access tokens, trading the refresh token for a new one
/// when the current token is missing or about to expire.
pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
        }
    }

    pub fn state(&self) -> &OAuthState {
        &self.state
    }

    pub async fn valid_access_token(&mut self) -> Result<String, TokenProviderError> {
        if self.expires_soon() {
            self.refresh().await?;
        }
        Ok(self.state.access_token.clone())
    }

    /// Refresh regardless of the recorded expiry, e.g. after a 401.
    pub async fn refresh_now(&mut self) -> Result<String, TokenProviderError> {
        self.refresh().await?;
        Ok(self.state.access_token.clone())
    }

    fn expires_soon(&self) -> bool {
        if self.state.access_token.is_empty() {
            return true;
        }
        self.state
            .expires_at
            .is_some_and(|expires_at| expires_at <= now_unix().saturating_add(EXPIRY_MARGIN_SECS))
    }

    async fn refresh(&mut self) -> Result<(), TokenProviderError> {
        let refresh_token = self
            .state
            .refresh_token
            .clone()
            .ok_or(TokenProviderError::MissingRefreshToken)?;
        let client = self
            .oauth_client
            .as_ref()
            .ok_or(TokenProviderError::MissingOAuthClient)?;
        let token = client.refresh_token(&refresh_token).await?;
        if let Some(granted) = &token.scope
            && !has_drive_scope(granted)
        {
            return Err(TokenProviderError::InsufficientScope(granted.clone()));
        }

        let previous_scope = self.state.scope.take();
        self.state = OAuthState::from_oauth_token(&token);
        // Google omits the refresh token and sometimes the scope on refresh.
        if self.state.refresh_token.is_none() {
            self.state.refresh_token = Some(refresh_token);
        }
        if self.state.scope.is_none() {
            self.state.scope = previous_scope;
        }
        Ok(())
    }
}

fn has_drive_scope(granted: &str) -> bool {
    granted.split_whitespace().any(|scope| scope == DRIVE_SCOPE)
}
