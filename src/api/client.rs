use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::error::{ApiError, GENERIC_FAILURE};
use super::types::{
    Acknowledgement, Article, AuthStatus, Credentials, FeedKey, LikeOutcome, ProfileUpdate,
    Registration, TokenResponse, UserProfile,
};
use crate::config::BackendConfig;
use crate::session::{AuthBackend, RefreshGuard, TokenJar};

/// Header carrying the static API key on every backend request.
pub const API_KEY_HEADER: &str = "api_key";

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// How a request identifies the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// No bearer token is sent.
    Anonymous,
    /// Bearer token sent when one is held.
    IfAvailable,
    /// Fails locally with [`ApiError::Unauthenticated`] when no token is held.
    Required,
}

/// Client for the news backend.
///
/// Attaches the API key to every request and the bearer token to requests
/// that need identity. Clones share the token jar and the refresh guard, so
/// a refresh started through one clone is joined by all others.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: SecretString,
    tokens: Arc<TokenJar>,
    refresh_guard: RefreshGuard,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("tokens", &self.tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiClient {
    pub fn new(backend: BackendConfig, tokens: Arc<TokenJar>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("newsline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, backend, tokens))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        backend: BackendConfig,
        tokens: Arc<TokenJar>,
    ) -> Self {
        let base_url: Arc<str> = Arc::from(backend.base_url.as_str().trim_end_matches('/'));
        Self {
            http,
            base_url,
            api_key: backend.api_key,
            tokens,
            refresh_guard: RefreshGuard::new(),
            timeout: backend.timeout,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenJar> {
        &self.tokens
    }

    /// Whether a token refresh is pending right now.
    pub fn refresh_in_flight(&self) -> bool {
        self.refresh_guard.in_flight()
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    fn request(&self, method: Method, path: &str, auth: Auth) -> Result<RequestBuilder, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, self.api_key.expose_secret());

        match (auth, self.tokens.access_token()) {
            (Auth::Anonymous, _) => {}
            (_, Some(token)) => request = request.bearer_auth(token.expose_secret()),
            (Auth::Required, None) => return Err(ApiError::Unauthenticated),
            (Auth::IfAvailable, None) => {}
        }
        Ok(request)
    }

    /// Send with the configured timeout; non-2xx becomes [`ApiError::Upstream`].
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            let message = upstream_message(response).await;
            tracing::debug!(status = status.as_u16(), message = %message, "Backend returned error");
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Log in and store the returned token pair.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(ApiError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let request = self
            .request(Method::POST, "/auth/login", Auth::Anonymous)?
            .json(credentials);
        let tokens: TokenResponse = self.send_json(request).await?;

        match (tokens.access_token, tokens.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                self.tokens.store_pair(access, refresh);
                tracing::info!("Logged in");
                Ok(())
            }
            _ => Err(ApiError::MissingTokens),
        }
    }

    /// Create an account. Returns the backend's confirmation message.
    pub async fn register(&self, registration: Registration) -> Result<String, ApiError> {
        if registration.name.trim().is_empty()
            || registration.email.trim().is_empty()
            || registration.password.is_empty()
        {
            return Err(ApiError::Validation(
                "Name, email and password are required".to_string(),
            ));
        }

        let mut form = Form::new()
            .text("nome", registration.name)
            .text("email", registration.email)
            .text("senha", registration.password);
        if let Some(image) = registration.image {
            form = form.part("image", Part::bytes(image.bytes).file_name(image.file_name));
        }

        let request = self
            .request(Method::POST, "/auth/register", Auth::Anonymous)?
            .multipart(form);
        let ack: Acknowledgement = self.send_json(request).await?;
        Ok(ack.message)
    }

    /// Refresh the access token. Concurrent callers share one network call.
    ///
    /// Never fails past this point: any error resolves to `false`.
    pub async fn refresh(&self) -> bool {
        let client = self.clone();
        self.refresh_guard
            .refresh(move || async move { client.refresh_once().await })
            .await
    }

    async fn refresh_once(&self) -> bool {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            tracing::debug!("No refresh token held, skipping refresh");
            return false;
        };

        tracing::debug!("Requesting token refresh");
        let result = match self.request(Method::POST, "/auth/refresh", Auth::Anonymous) {
            Ok(request) => {
                let request = request.query(&[("refresh_token", refresh_token.expose_secret())]);
                self.send_json::<TokenResponse>(request).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(TokenResponse {
                access_token: Some(access),
                refresh_token,
            }) if !access.is_empty() => {
                self.tokens.store_access(access);
                if let Some(rotated) = refresh_token.filter(|t| !t.is_empty()) {
                    self.tokens.store_refresh(rotated);
                }
                tracing::info!("Access token renewed");
                true
            }
            Ok(_) => {
                tracing::warn!("Refresh response carried no access token");
                false
            }
            Err(e) => {
                if e.is_auth_rejection() {
                    tracing::info!("Refresh token rejected, clearing session");
                    self.tokens.clear();
                }
                tracing::warn!(error = %e, "Token refresh failed");
                false
            }
        }
    }

    /// End the session. Local tokens are dropped whether or not the call succeeds.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = match self.request(Method::POST, "/auth/logout", Auth::IfAvailable) {
            Ok(request) => self.send(request).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.tokens.clear();
        tracing::info!("Session cleared");
        result
    }

    /// Status probe over the token jar. Never touches the network or the jar.
    pub fn auth_status(&self) -> AuthStatus {
        self.tokens.status()
    }

    // ========================================================================
    // News
    // ========================================================================

    /// `GET /news/feed/{feedType}?skip&limit[&time_filter]`.
    pub async fn feed(&self, key: FeedKey, skip: usize, limit: u32) -> Result<Vec<Article>, ApiError> {
        let auth = if key.feed_type.requires_auth() {
            Auth::Required
        } else {
            Auth::IfAvailable
        };
        let path = format!("/news/feed/{}", key.feed_type);
        let mut request = self
            .request(Method::GET, &path, auth)?
            .query(&[("skip", skip as u64), ("limit", u64::from(limit))]);
        if let Some(filter) = key.time_filter {
            request = request.query(&[("time_filter", filter.as_str())]);
        }

        tracing::debug!(feed = %key, skip, limit, "Fetching feed page");
        let articles: Vec<Article> = self.send_json(request).await?;
        tracing::debug!(feed = %key, skip, received = articles.len(), "Feed page received");
        Ok(articles)
    }

    /// Toggle the current user's like on an article.
    pub async fn handle_like(&self, news_id: i64) -> Result<LikeOutcome, ApiError> {
        let path = format!("/news/handle-like/{news_id}");
        let request = self.request(Method::POST, &path, Auth::Required)?;
        let outcome: LikeOutcome = self.send_json(request).await?;
        tracing::debug!(news_id, liked = outcome.liked, likes = outcome.likes, "Like toggled");
        Ok(outcome)
    }

    // ========================================================================
    // Profile
    // ========================================================================

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let request = self.request(Method::GET, "/user", Auth::Required)?;
        self.send_json(request).await
    }

    /// Update name and email, and the password when one is given.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        if update.name.trim().is_empty() || update.email.trim().is_empty() {
            return Err(ApiError::Validation(
                "Name and email are required".to_string(),
            ));
        }

        let mut form = Form::new()
            .text("nome", update.name.clone())
            .text("email", update.email.clone());
        if let Some(password) = update.password.as_ref().filter(|p| !p.is_empty()) {
            form = form.text("senha", password.clone());
        }

        let request = self
            .request(Method::PATCH, "/user", Auth::Required)?
            .multipart(form);
        self.send_json(request).await
    }
}

impl AuthBackend for ApiClient {
    async fn status(&self) -> Result<AuthStatus, ApiError> {
        Ok(self.auth_status())
    }

    async fn refresh(&self) -> bool {
        ApiClient::refresh(self).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        ApiClient::logout(self).await
    }
}

/// Extract the backend's `detail` (or `error`) message from a failed response.
async fn upstream_message(response: Response) -> String {
    let Ok(bytes) = read_limited_bytes(response, MAX_RESPONSE_SIZE).await else {
        return GENERIC_FAILURE.to_string();
    };
    serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|body| {
            ["detail", "error"]
                .iter()
                .find_map(|field| body.get(field)?.as_str().map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

async fn read_limited_bytes(response: Response, limit: usize) -> Result<Vec<u8>, ApiError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
