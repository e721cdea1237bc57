//! Google account plumbing shared by Drive and Photos
//!
//! The add flow stores the pasted client secret under `credentials` and the
//! first token under `token`; backups rebuild an [`OAuthClient`] from them and
//! write the token back when it was refreshed during the run.

use anyhow::Context as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::Context;
use crate::managers::registration::Prompter;
use crate::utils::oauth::{exchange_code, http_client, OAuthClient, OAuthCredentials, OAuthToken};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const PHOTOS_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

const INSTRUCTIONS: &str = "\
If you already have an OAuth client ID, download its JSON.
Otherwise:
  1. Open https://console.developers.google.com/ and choose or create a project
  2. Enable the Drive and Photos Library APIs
  3. Configure the consent screen (External) and add yourself as a test user
  4. Add the scopes .../auth/drive.readonly and .../auth/photoslibrary.readonly
  5. Create credentials: OAuth client ID, Desktop application
  6. Download the client ID JSON";

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSettings {
    pub credentials: OAuthCredentials,
    pub token: OAuthToken,
}

/// Interactive consent: paste the client secret, visit the URL, paste the code
pub fn authorize(
    scope: &str,
    settings: &mut Map<String, Value>,
    prompter: &mut dyn Prompter,
) -> anyhow::Result<()> {
    prompter.message(INSTRUCTIONS);

    let secret = prompter.input("Paste content of credentials file", None)?;
    let credentials = OAuthCredentials::from_client_secret(&secret)?;
    let url = credentials.authorize_url(scope)?;

    prompter.message(&format!("Open this URL and grant access:\n{}", url));
    let code = prompter.input("Enter code", None)?;

    let token = exchange_code(&http_client()?, &credentials, &code)
        .context("Failed to exchange authorization code")?;

    settings.insert("credentials".to_string(), serde_json::to_value(&credentials)?);
    settings.insert("token".to_string(), serde_json::to_value(&token)?);
    Ok(())
}

pub fn client(settings: GoogleSettings) -> anyhow::Result<OAuthClient> {
    Ok(OAuthClient::new(settings.credentials, settings.token)?)
}

/// Write a token refreshed during the run back to the alias namespace
pub fn persist_token(ctx: &mut Context, alias: &str, client: &OAuthClient) {
    let Some(token) = client.refreshed_token() else {
        return;
    };

    let stored = serde_json::to_value(token)
        .map_err(anyhow::Error::from)
        .and_then(|value| Ok(ctx.config.set_in(&[alias, "token"], value)?));

    match stored {
        Ok(()) => debug!("Stored refreshed token"),
        Err(e) => warn!("Failed to store refreshed token: {:#}", e),
    }
}
