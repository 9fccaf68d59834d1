// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hosting service API access.
//!
//! The hosting service REST API is used for two optional things: validating
//! the configured token before any clone is attempted, and listing the
//! repositories that the token can see. HTTP itself sits behind the
//! [`HttpClient`] trait so the API logic can be exercised against a fake.

use crate::config::{Credentials, SecretToken};

use serde::Deserialize;
use std::{future::Future, time::Duration};
use tracing::{debug, instrument};

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Layer of indirection for HTTP access.
pub trait HttpClient: Send + Sync {
    /// Perform GET request with bearer token authorization.
    fn get(
        &self,
        url: &str,
        token: &SecretToken,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

/// HTTP access through reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Construct new HTTP client whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - Return [`ForgeError::Http`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("mygit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, token: &SecretToken) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Outcome of token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Token belongs to the configured username.
    Matches,

    /// Token belongs to somebody else.
    Mismatch { login: String },
}

/// Repository visible through the hosting service API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteRepository {
    pub full_name: String,

    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

/// Client for the hosting service REST API.
#[derive(Debug, Clone)]
pub struct HostingApi<H = ReqwestClient>
where
    H: HttpClient,
{
    http: H,
    api_url: String,
}

impl<H> HostingApi<H>
where
    H: HttpClient,
{
    /// Construct new API client for base URL.
    pub fn new(http: H, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Check token against the user identity endpoint.
    ///
    /// # Errors
    ///
    /// - Return [`ForgeError::InvalidToken`] if the service rejects the
    ///   token with 401 or 403.
    /// - Return [`ForgeError::Timeout`] if the service stops responding.
    /// - Return [`ForgeError::UnexpectedStatus`] on any other failure status.
    #[instrument(skip(self, credentials), level = "debug")]
    pub async fn validate_token(&self, credentials: &Credentials) -> Result<Identity> {
        let url = format!("{}/user", self.api_url);
        let response = self.http.get(&url, &credentials.token).await?;
        check_status(&response)?;

        let user: User = serde_json::from_str(&response.body)?;
        debug!("token belongs to {}", user.login);
        if user.login.eq_ignore_ascii_case(credentials.username.trim()) {
            Ok(Identity::Matches)
        } else {
            Ok(Identity::Mismatch { login: user.login })
        }
    }

    /// List every repository visible to the token.
    ///
    /// Walks all result pages of `/user/repos`.
    ///
    /// # Errors
    ///
    /// - Return [`ForgeError::InvalidToken`] if the service rejects the token.
    /// - Return [`ForgeError::Timeout`] if the service stops responding.
    /// - Return [`ForgeError::UnexpectedStatus`] on any other failure status.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn list_repositories(&self, token: &SecretToken) -> Result<Vec<RemoteRepository>> {
        let mut repositories = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}/user/repos?per_page={PER_PAGE}&page={page}&sort=full_name",
                self.api_url
            );
            let response = self.http.get(&url, token).await?;
            check_status(&response)?;

            let batch: Vec<RemoteRepository> = serde_json::from_str(&response.body)?;
            let last_page = batch.len() < PER_PAGE;
            repositories.extend(batch);
            if last_page {
                break;
            }
        }

        Ok(repositories)
    }
}

const PER_PAGE: usize = 100;

fn check_status(response: &HttpResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => Err(ForgeError::InvalidToken {
            status: response.status,
        }),
        status => Err(ForgeError::UnexpectedStatus { status }),
    }
}

/// Hosting service API error types.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Token rejected by the hosting service.
    #[error("token rejected by hosting service (HTTP {status})")]
    InvalidToken { status: u16 },

    /// Hosting service replied with an unexpected status.
    #[error("hosting service replied with HTTP {status}")]
    UnexpectedStatus { status: u16 },

    /// Hosting service did not respond in time.
    #[error("request to hosting service timed out")]
    Timeout,

    /// Response body cannot be decoded.
    #[error("cannot decode hosting service response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport level failure.
    #[error("request to hosting service failed: {0}")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ForgeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ForgeError::Timeout
        } else {
            ForgeError::Http(error)
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ForgeError> = std::result::Result<T, E>;
