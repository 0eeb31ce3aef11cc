//! REST API client for the Bazaar backend.
//!
//! Every request carries the session credentials (an `access_token` cookie).
//! A 401 on any request except the refresh call triggers exactly one
//! transparent refresh followed by at most one retry. If the refresh fails the
//! credentials are dropped, the hooks registered with
//! [`ApiClient::on_invalidated`] run before the error is returned, and
//! [`SessionEvent::Invalidated`] is broadcast to observers.
//!
//! Product and category reads are cached using `moka`; cart reads never are.
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_storefront::api::ApiClient;
//!
//! let client = ApiClient::new(&config)?;
//! let products = client.list_products(&ProductQuery::default()).await?;
//! let lines = client.cart_lines().await?;
//! ```

pub mod admin;
mod cache;
pub mod cart;
mod credentials;
mod error;
pub mod orders;
pub mod products;
pub mod users;

pub use credentials::ACCESS_TOKEN_COOKIE;
pub use error::{ApiError, FieldError};

use std::sync::{Arc, PoisonError, RwLock};

use moka::future::Cache;
use reqwest::header::{COOKIE, RETRY_AFTER, SET_COOKIE};
use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::StorefrontConfig;
use crate::models::Token;

use cache::{CacheKey, CacheValue};
use credentials::{CookieUpdate, Credentials, parse_set_cookie};

const REFRESH_PATH: &str = "users/refresh";
const REQUEST_ID_HEADER: &str = "x-request-id";
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session-level notifications emitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were rejected and could not be refreshed.
    ///
    /// `generation` is the credential generation after the token was dropped.
    Invalidated { generation: u64 },
}

type InvalidationHook = Arc<dyn Fn() + Send + Sync>;

/// Per-request behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Report a 401 as [`ApiError::AuthExpired`] instead of refreshing.
    ///
    /// Set for calls that establish credentials (login, register, refresh).
    pub skip_auth_refresh: bool,
}

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A request description, replayable for the post-refresh retry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Body,
    options: RequestOptions,
}

impl ApiRequest {
    /// A request for `path`, relative to the configured API base URL.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            options: RequestOptions::default(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a URL-encoded form body.
    #[must_use]
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = Body::Form(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self
    }

    /// Append query parameters from a flat struct. `None` fields are omitted.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if `params` cannot be serialized.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self, ApiError> {
        if let serde_json::Value::Object(map) = serde_json::to_value(params)? {
            self.query.extend(map.into_iter().filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            }));
        }
        Ok(self)
    }

    #[must_use]
    pub const fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn skip_auth_refresh(mut self) -> Self {
        self.options.skip_auth_refresh = true;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if the body is not a valid `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %self.body.chars().take(500).collect::<String>(),
                "Failed to parse API response"
            );
            ApiError::Decode(e)
        })
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the Bazaar REST API.
///
/// Cheap to clone; all clones share credentials, the refresh lock and the
/// catalog cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    invalidation_hooks: RwLock<Vec<InvalidationHook>>,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn new(config: &StorefrontConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(config.product_cache.capacity)
            .time_to_live(config.product_cache.ttl)
            .build();

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url: config.api_url.clone(),
                credentials: Credentials::default(),
                refresh_lock: Mutex::new(()),
                events,
                invalidation_hooks: RwLock::new(Vec::new()),
                cache,
            }),
        })
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Use `token` for subsequent requests.
    pub fn set_access_token(&self, token: SecretString) {
        self.inner.credentials.set(token);
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.inner.credentials.token()
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.inner.credentials.is_present()
    }

    /// Forget the access token without notifying subscribers.
    pub fn clear_credentials(&self) {
        self.inner.credentials.clear();
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Run `hook` whenever the session is invalidated.
    ///
    /// Hooks run synchronously, before the request that observed the
    /// rejection returns `ApiError::AuthInvalid`. They must not block.
    pub fn on_invalidated(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner
            .invalidation_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    // =========================================================================
    // Request Execution
    // =========================================================================

    /// Shorthand for [`send`](Self::send) with explicit options.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = ApiRequest::new(method, path).options(options);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        self.send(request).await
    }

    /// Execute a request.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] for transport failures and non-2xx
    /// responses. A 401 is retried once after a successful refresh; if the
    /// refresh fails or the retry is rejected again, returns
    /// `ApiError::AuthInvalid`.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let snapshot = self.inner.credentials.snapshot();
        let response = self.dispatch(&request, snapshot.cookie.as_deref()).await?;

        // Without credentials there is nothing to refresh.
        if response.status() != StatusCode::UNAUTHORIZED
            || request.options.skip_auth_refresh
            || snapshot.cookie.is_none()
        {
            return Self::finish(response).await;
        }

        debug!("Access token rejected, refreshing session");
        self.refresh_after(snapshot.generation).await?;

        let retry = self.inner.credentials.snapshot();
        let response = self.dispatch(&request, retry.cookie.as_deref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Request rejected again after session refresh");
            self.invalidate(retry.generation);
            return Err(ApiError::AuthInvalid);
        }

        Self::finish(response).await
    }

    /// GET `path` and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// Refresh the session unless another task already did since `seen`.
    ///
    /// Holding `refresh_lock` makes the refresh single-flight: tasks that hit
    /// a 401 concurrently wait here and then reuse the new token.
    async fn refresh_after(&self, seen: u64) -> Result<(), ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;

        if self.inner.credentials.generation() != seen {
            return if self.inner.credentials.is_present() {
                debug!("Session already refreshed by a concurrent request");
                Ok(())
            } else {
                Err(ApiError::AuthInvalid)
            };
        }

        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(error = %error, "Session refresh failed");
                self.invalidate(seen);
                Err(ApiError::AuthInvalid)
            }
        }
    }

    /// Call the refresh endpoint and store the new token.
    ///
    /// Uses `dispatch` directly: the refresh call never refreshes itself.
    async fn refresh(&self) -> Result<(), ApiError> {
        let request = ApiRequest::post(REFRESH_PATH).skip_auth_refresh();
        let snapshot = self.inner.credentials.snapshot();
        let response = self.dispatch(&request, snapshot.cookie.as_deref()).await?;
        let token: Token = Self::finish(response).await?.json()?;
        self.inner
            .credentials
            .set(SecretString::from(token.access_token));
        Ok(())
    }

    /// Drop the credentials of generation `seen` and tell everyone the
    /// session is gone.
    ///
    /// Credentials replaced since `seen` belong to a newer session and are
    /// left alone.
    fn invalidate(&self, seen: u64) {
        let Some(generation) = self.inner.credentials.clear_if_current(seen) else {
            debug!("Credentials changed since the rejected request, keeping them");
            return;
        };

        let hooks = self
            .inner
            .invalidation_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook();
        }

        // No receivers is fine: nobody is observing.
        let _ = self.inner.events.send(SessionEvent::Invalidated { generation });
    }

    /// Send one HTTP request.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self
            .inner
            .base_url
            .join(request.path.trim_start_matches('/'))?;

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;
        self.absorb_cookies(&response);
        Ok(response)
    }

    /// Mirror `Set-Cookie: access_token=...` into the credentials.
    fn absorb_cookies(&self, response: &reqwest::Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(header) = value.to_str() else {
                continue;
            };
            match parse_set_cookie(header) {
                Some(CookieUpdate::Set(token)) => {
                    self.inner.credentials.set(SecretString::from(token));
                }
                Some(CookieUpdate::Cleared) => self.inner.credentials.clear(),
                None => {}
            }
        }
    }

    /// Turn a raw response into `ApiResponse` or a classified error.
    async fn finish(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let body = response.text().await?;

        if status.is_success() {
            return Ok(ApiResponse { status, body });
        }

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "API returned server error"
            );
        }

        Err(ApiError::from_response(status, &body, retry_after))
    }

    pub(crate) fn cache(&self) -> &Cache<CacheKey, CacheValue> {
        &self.inner.cache
    }
}
