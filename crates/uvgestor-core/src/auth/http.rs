//! HTTP identity provider
//!
//! Account API:
//! - `POST {base}/accounts/signUp` `{"email", "password", "displayName"}`
//! - `POST {base}/accounts/signIn` `{"email", "password"}`
//! - `POST {base}/accounts/signOut`
//! - `GET {base}/accounts/me`
//!
//! Sign-up and sign-in answer `{"userId", "email", "displayName", "token"}`;
//! the token is kept in memory and sent as a bearer token afterwards.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Identity, IdentityProvider};
use crate::config::IdentityConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(flatten)]
    identity: Identity,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Identity provider backed by a JSON account API
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    token: Arc<Mutex<Option<String>>>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Create from the `[identity]` config section
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let mut provider = Self::new(&config.url, Duration::from_secs(config.timeout_secs))?;
        provider.api_key = config.api_key.clone();
        Ok(provider)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/accounts/{}", self.base_url, path)
    }

    fn current_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Session token wins over the static API key
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.current_token().or_else(|| self.api_key.clone()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Client errors mean the provider answered and said no
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());

        if status.is_client_error() {
            Err(Error::Auth(message))
        } else {
            Err(Error::RemoteUnavailable(message))
        }
    }

    async fn start_session(&self, path: &str, credentials: &Credentials<'_>) -> Result<Identity> {
        let response = self
            .authorize(self.http_client.post(self.url(path)))
            .json(credentials)
            .send()
            .await?;

        let session: SessionResponse = Self::check(response).await?.json().await?;
        self.set_token(session.token);
        Ok(session.identity)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let credentials = Credentials {
            email,
            password,
            display_name: None,
        };
        self.start_session("signIn", &credentials).await
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Identity> {
        let credentials = Credentials {
            email,
            password,
            display_name: Some(display_name),
        };
        self.start_session("signUp", &credentials).await
    }

    async fn sign_out(&self) -> Result<()> {
        let response = self
            .authorize(self.http_client.post(self.url("signOut")))
            .send()
            .await;
        // The local token is dropped even if the provider could not be told
        self.set_token(None);
        Self::check(response?).await?;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Identity>> {
        if self.current_token().is_none() {
            return Ok(None);
        }

        let response = self
            .authorize(self.http_client.get(self.url("me")))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let identity: Identity = Self::check(response).await?.json().await?;
        Ok(Some(identity))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockIdentityServer;

    fn provider(server: &MockIdentityServer) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&server.url(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_sign_out() {
        let server = MockIdentityServer::start().await;
        let provider = provider(&server);

        let created = provider
            .sign_up("ana@uvg.edu", "secret1", "Ana")
            .await
            .unwrap();
        assert_eq!(created.email, "ana@uvg.edu");
        assert_eq!(created.display_name.as_deref(), Some("Ana"));

        let me = provider.current_session().await.unwrap().unwrap();
        assert_eq!(me.user_id, created.user_id);

        provider.sign_out().await.unwrap();
        assert!(provider.current_session().await.unwrap().is_none());

        let again = provider.sign_in("ana@uvg.edu", "secret1").await.unwrap();
        assert_eq!(again.user_id, created.user_id);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_auth_errors() {
        let server = MockIdentityServer::start().await;
        let provider = provider(&server);
        provider
            .sign_up("ana@uvg.edu", "secret1", "Ana")
            .await
            .unwrap();

        let err = provider.sign_in("ana@uvg.edu", "nope").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let err = provider
            .sign_up("ana@uvg.edu", "secret1", "Ana")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("already")));
    }

    #[tokio::test]
    async fn test_server_failure_is_remote_error() {
        let server = MockIdentityServer::start().await;
        server.set_failing(true);
        let provider = provider(&server);

        let err = provider
            .sign_in("ana@uvg.edu", "secret1")
            .await
            .unwrap_err();
        assert!(err.is_remote());
    }
}
