use anyhow::Context;
use gdrive_core::{ApiErrorClass, DriveClient, DriveError, OAuthClient};
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::storage::{OAuthState, StorageError, TokenStorage};
use crate::token_provider::{TokenProvider, TokenProviderError};

/// Build an authorized client.
///
/// `GDRIVE_TOKEN` is used as is. Otherwise the OAuth state comes from the
/// keyring, or is bootstrapped from `GDRIVE_REFRESH_TOKEN`; the token is
/// verified against the API, refreshed once on an auth failure, and the
/// resulting state is saved back.
pub async fn connect(config: &AuthConfig) -> anyhow::Result<DriveClient> {
    if let Some(token) = &config.access_token {
        debug!("using access token from GDRIVE_TOKEN");
        return build_client(config.api_base.as_deref(), token).context("invalid api base url");
    }

    let storage = TokenStorage::new().context("failed to open the keyring")?;
    let state = stored_or_bootstrap_state(&storage, config)?;
    let mut provider = TokenProvider::new(state, oauth_client(config)?);
    let client = verified_client(&mut provider, config.api_base.as_deref()).await?;
    storage
        .save_oauth_state(provider.state())
        .context("failed to persist oauth state")?;
    Ok(client)
}

pub fn logout() -> anyhow::Result<()> {
    let storage = TokenStorage::new().context("failed to open the keyring")?;
    storage
        .delete_oauth_state()
        .context("failed to remove saved oauth state")?;
    info!("Saved credentials removed.");
    Ok(())
}

fn stored_or_bootstrap_state(
    storage: &TokenStorage,
    config: &AuthConfig,
) -> anyhow::Result<OAuthState> {
    match storage.get_oauth_state() {
        Ok(state) => Ok(state),
        Err(StorageError::StateNotFound) => {
            let refresh_token = config.refresh_token.as_deref().context(
                "no saved credentials; set GDRIVE_TOKEN or GDRIVE_REFRESH_TOKEN",
            )?;
            Ok(OAuthState::from_refresh_token(refresh_token))
        }
        Err(err) => Err(err).context("failed to read saved oauth state"),
    }
}

fn oauth_client(config: &AuthConfig) -> anyhow::Result<Option<OAuthClient>> {
    match (&config.client_id, &config.client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(match config.oauth_base.as_deref() {
            Some(url) => OAuthClient::with_base_url(url, client_id, client_secret)
                .context("invalid oauth base url/config")?,
            None => OAuthClient::new(client_id, client_secret).context("invalid oauth config")?,
        })),
        _ => Ok(None),
    }
}

async fn verified_client(
    provider: &mut TokenProvider,
    base_url: Option<&str>,
) -> anyhow::Result<DriveClient> {
    let token = provider
        .valid_access_token()
        .await
        .map_err(explain_refresh_failure)
        .context("failed to resolve valid access token")?;
    let client = build_client(base_url, &token)?;
    match client.about_user().await {
        Ok(_) => Ok(client),
        Err(err) if matches!(err.classification(), Some(ApiErrorClass::Auth)) => {
            let refreshed = provider
                .refresh_now()
                .await
                .map_err(explain_refresh_failure)
                .context("failed to refresh token after 401")?;
            let retry_client = build_client(base_url, &refreshed)?;
            retry_client.about_user().await?;
            Ok(retry_client)
        }
        Err(err) => Err(err.into()),
    }
}

fn explain_refresh_failure(err: TokenProviderError) -> anyhow::Error {
    let revoked = matches!(&err, TokenProviderError::OAuth(oauth) if oauth.is_revoked_grant());
    let err = anyhow::Error::new(err);
    if revoked {
        err.context("the saved refresh token was revoked; run --logout and set a new GDRIVE_REFRESH_TOKEN")
    } else {
        err
    }
}

fn build_client(base_url: Option<&str>, token: &str) -> Result<DriveClient, DriveError> {
    match base_url {
        Some(url) => DriveClient::with_base_url(url, token.to_string()),
        None => DriveClient::new(token.to_string()),
    }
}
