//! Authentication client and session credentials
//!
//! The signaling channel authenticates with a bearer token obtained from
//! the calldesk HTTP API. Token refresh orchestration (reacting to 401s on
//! API traffic) stays with the caller; this module only provides the
//! login/refresh/logout calls and the credential the connection consumes.

use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

/// Bearer credential for the signaling channel
///
/// The user id is carried alongside the token because mute confirmations
/// (`audio-muted` / `video-muted`) are addressed per user and only events
/// for the local user reconcile pending mutations.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    /// Opaque bearer token presented on the channel handshake
    pub access_token: String,
    /// Refresh token, if the API issued one
    pub refresh_token: Option<String>,
    /// Authenticated user's id
    pub user_id: String,
}

/// Authenticated user details returned by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: UserInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: String,
}

/// HTTP client for the auth endpoints
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    /// Create a client for the given API base URL (e.g. `https://api.example.com`)
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| ClientError::internal_error(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Log in and obtain a session credential
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<SessionCredential> {
        let url = format!("{}/api/v1/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ClientError::network_error(format!("login request: {e}")))?;

        let response = check_status(response, "login")?;
        let envelope: ApiEnvelope<LoginData> = response
            .json()
            .await
            .map_err(|e| ClientError::protocol_error(format!("login response: {e}")))?;

        Ok(SessionCredential {
            access_token: envelope.data.access_token,
            refresh_token: envelope.data.refresh_token,
            user_id: envelope.data.user.id,
        })
    }

    /// Exchange a refresh token for a fresh access token
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<String> {
        let url = format!("{}/api/v1/auth/refresh", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| ClientError::network_error(format!("refresh request: {e}")))?;

        let response = check_status(response, "refresh")?;
        let envelope: ApiEnvelope<RefreshData> = response
            .json()
            .await
            .map_err(|e| ClientError::protocol_error(format!("refresh response: {e}")))?;

        Ok(envelope.data.access_token)
    }

    /// Invalidate the session server-side
    pub async fn logout(&self, access_token: &str) -> ClientResult<()> {
        let url = format!("{}/api/v1/auth/logout", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::network_error(format!("logout request: {e}")))?;

        check_status(response, "logout").map(|_| ())
    }
}

fn check_status(response: reqwest::Response, operation: &str) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        Err(ClientError::authentication_failed(format!(
            "{operation} rejected: {status}"
        )))
    } else {
        Err(ClientError::network_error(format!(
            "{operation} failed: {status}"
        )))
    }
}
