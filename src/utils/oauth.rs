//! OAuth2 token lifecycle for installed-application clients
//!
//! Covers the three steps every Google-family source needs: building the
//! consent URL, exchanging the pasted authorization code, and refreshing an
//! expired access token. [`OAuthClient::send`] attaches the bearer token and
//! retries a request exactly once after a refresh when the server answers
//! 401; a second 401 is an error for that request only.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Access denied after refreshing the token")]
    Unauthorized,

    #[error("No refresh token stored, run 'add' again for this alias")]
    MissingRefreshToken,

    #[error("Invalid client credentials: {0}")]
    InvalidCredentials(String),
}

/// Client secret of an "installed" OAuth application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl OAuthCredentials {
    /// Parse a downloaded client secret file, wrapped in `installed` or bare
    pub fn from_client_secret(json: &str) -> Result<Self, OAuthError> {
        let value: serde_json::Value = serde_json::from_str(json.trim())
            .map_err(|e| OAuthError::InvalidCredentials(e.to_string()))?;
        let inner = value.get("installed").cloned().unwrap_or(value);
        serde_json::from_value(inner).map_err(|e| OAuthError::InvalidCredentials(e.to_string()))
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(OOB_REDIRECT)
    }

    /// Consent page URL requesting offline access for `scope`
    pub fn authorize_url(&self, scope: &str) -> Result<Url, OAuthError> {
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", scope),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| OAuthError::InvalidCredentials(e.to_string()))
    }
}

/// Access token as returned by the token endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Take a refreshed token, keeping our refresh token if the server omitted it
    fn merge_refreshed(&mut self, refreshed: OAuthToken) {
        let refresh_token = refreshed.refresh_token.or_else(|| self.refresh_token.take());
        *self = OAuthToken {
            refresh_token,
            ..refreshed
        };
    }
}

/// Outcome of one authorized attempt
pub enum Attempt<T> {
    Done(T),
    Unauthorized,
}

/// Run `attempt`; on 401 call `refresh` and try exactly once more
pub fn retry_once_after_refresh<T, A, R>(mut attempt: A, mut refresh: R) -> Result<T, OAuthError>
where
    A: FnMut() -> Result<Attempt<T>, OAuthError>,
    R: FnMut() -> Result<(), OAuthError>,
{
    if let Attempt::Done(value) = attempt()? {
        return Ok(value);
    }

    debug!("Access token rejected, refreshing");
    refresh()?;

    match attempt()? {
        Attempt::Done(value) => Ok(value),
        Attempt::Unauthorized => Err(OAuthError::Unauthorized),
    }
}

pub fn http_client() -> Result<Client, OAuthError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(300))
        .user_agent(concat!("account-backup/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Exchange an authorization code for the first token
pub fn exchange_code(
    http: &Client,
    credentials: &OAuthCredentials,
    code: &str,
) -> Result<OAuthToken, OAuthError> {
    let response = http
        .post(&credentials.token_uri)
        .form(&[
            ("code", code.trim()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", credentials.redirect_uri()),
            ("grant_type", "authorization_code"),
        ])
        .send()?;

    Ok(check_status(response)?.json()?)
}

/// Authorized HTTP access on behalf of one alias
pub struct OAuthClient {
    http: Client,
    credentials: OAuthCredentials,
    token: OAuthToken,
    refreshed: bool,
}

impl OAuthClient {
    pub fn new(credentials: OAuthCredentials, token: OAuthToken) -> Result<Self, OAuthError> {
        Ok(Self {
            http: http_client()?,
            credentials,
            token,
            refreshed: false,
        })
    }

    pub fn token(&self) -> &OAuthToken {
        &self.token
    }

    /// The current token if it changed since construction
    pub fn refreshed_token(&self) -> Option<&OAuthToken> {
        self.refreshed.then_some(&self.token)
    }

    pub fn refresh(&mut self) -> Result<(), OAuthError> {
        let refresh_token = self
            .token
            .refresh_token
            .clone()
            .ok_or(OAuthError::MissingRefreshToken)?;

        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&[
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()?;

        let refreshed: OAuthToken = check_status(response)?.json()?;
        self.token.merge_refreshed(refreshed);
        self.refreshed = true;
        info!("Refreshed access token");
        Ok(())
    }

    /// Send an authorized request built by `build`, refreshing once on 401
    pub fn send<F>(&mut self, build: F) -> Result<Response, OAuthError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let http = self.http.clone();
        let token = RefCell::new(self.token.access_token.clone());

        let response = retry_once_after_refresh(
            || {
                let response = build(&http).bearer_auth(token.borrow().as_str()).send()?;
                if response.status() == StatusCode::UNAUTHORIZED {
                    Ok(Attempt::Unauthorized)
                } else {
                    Ok(Attempt::Done(response))
                }
            },
            || {
                self.refresh()?;
                *token.borrow_mut() = self.token.access_token.clone();
                Ok(())
            },
        )?;

        check_status(response)
    }
}

/// Turn a non-success response into [`OAuthError::Status`]
pub fn check_status(response: Response) -> Result<Response, OAuthError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().unwrap_or_default();
        Err(OAuthError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
