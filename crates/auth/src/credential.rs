//! Thread-safe credential that attaches tokens and recovers from 401s.

use std::sync::Arc;

use apiwire_http::{
    Clock, Request, RequestExecutorBuilder, RequestInterceptor, Response, SystemClock,
    UnsuccessfulResponseHandler,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TokenServerError;
use crate::token_server::TokenServerClient;
use crate::types::{Grant, TokenSet};

/// How the access token travels on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMethod {
    /// `Authorization: Bearer <token>` header. The only sensible choice for
    /// servers that support it.
    #[default]
    AuthorizationHeader,
    /// `access_token` query parameter, for servers that cannot read headers.
    QueryParameter,
}

const QUERY_PARAM: &str = "access_token";

impl AccessMethod {
    /// Attach `token` to the request, replacing any previous attachment.
    fn apply(&self, request: &mut Request, token: &str) {
        match self {
            Self::AuthorizationHeader => {
                request.set_header("Authorization", format!("Bearer {token}"));
            }
            Self::QueryParameter => set_query_param(&mut request.url, QUERY_PARAM, token),
        }
    }

    /// Recover the token a request was sent with, if any.
    fn token_from_request(&self, request: &Request) -> Option<String> {
        match self {
            Self::AuthorizationHeader => request
                .header("Authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string),
            Self::QueryParameter => request
                .url
                .query_pairs()
                .find(|(k, _)| k == QUERY_PARAM)
                .map(|(_, v)| v.into_owned()),
        }
    }
}

fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}

/// Observes token refresh outcomes, e.g. for persisting tokens.
#[async_trait]
pub trait RefreshListener: Send + Sync {
    /// A refresh succeeded and `tokens` is now the stored set.
    async fn on_token_response(&self, tokens: &TokenSet);

    /// A refresh failed; the stored set is unchanged.
    async fn on_token_error(&self, error: &TokenServerError);
}

/// OAuth2 credential: token store plus refresh machinery, shared across
/// concurrent requests.
///
/// As a [`RequestInterceptor`] it attaches the current access token from a
/// snapshot read, never blocking on a refresh. As an
/// [`UnsuccessfulResponseHandler`] it reacts to 401s: if another task
/// already rotated the token since this request was sent, retry with the
/// fresh token; otherwise refresh once. The refresh mutex makes concurrent
/// 401s collapse into one token-endpoint exchange.
pub struct Credential {
    tokens: RwLock<TokenSet>,
    refresh_lock: Mutex<()>,
    token_server: TokenServerClient,
    access_method: AccessMethod,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn RefreshListener>>,
}

impl Credential {
    pub fn builder(token_server: TokenServerClient) -> CredentialBuilder {
        CredentialBuilder::new(token_server)
    }

    /// Snapshot of the stored tokens.
    pub async fn tokens(&self) -> TokenSet {
        self.tokens.read().await.clone()
    }

    /// Current access token, or `None` before the first successful refresh.
    pub async fn access_token(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        if tokens.access_token.is_empty() {
            None
        } else {
            Some(tokens.access_token.clone())
        }
    }

    /// Seconds until the stored token expires, if a lifetime is known.
    pub async fn seconds_until_expiry(&self) -> Option<i64> {
        self.tokens.read().await.seconds_until_expiry(self.now())
    }

    /// Replace the stored tokens wholesale, e.g. from persisted state.
    pub async fn set_tokens(&self, tokens: TokenSet) {
        *self.tokens.write().await = tokens;
    }

    /// Register this credential on an executor as both interceptor and
    /// unsuccessful-response handler.
    pub fn apply_to(self: &Arc<Self>, builder: RequestExecutorBuilder) -> RequestExecutorBuilder {
        builder
            .interceptor(Arc::clone(self) as Arc<dyn RequestInterceptor>)
            .unsuccessful_response_handler(Arc::clone(self) as Arc<dyn UnsuccessfulResponseHandler>)
    }

    /// Refresh the access token now.
    ///
    /// Returns `Ok(true)` when a new token was installed, `Ok(false)` when
    /// no refresh token is stored so no exchange is possible. Concurrent
    /// callers serialize on the refresh mutex; each performs its own
    /// exchange, so callers wanting single-flight semantics go through the
    /// 401 handler instead.
    ///
    /// # Errors
    /// Propagates the classified [`TokenServerError`] from the exchange.
    pub async fn refresh(&self) -> Result<bool, TokenServerError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh body; caller holds `refresh_lock`.
    async fn refresh_locked(&self) -> Result<bool, TokenServerError> {
        let refresh_token = self.tokens.read().await.refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            debug!("no refresh token stored, cannot refresh");
            return Ok(false);
        };

        let grant = Grant::RefreshToken { refresh_token: refresh_token.clone() };
        match self.token_server.request_token(&grant).await {
            Ok(response) => {
                let installed = response.into_token_set(Some(refresh_token), self.now());
                let expires_in = installed.seconds_until_expiry(self.now());
                *self.tokens.write().await = installed.clone();
                info!(expires_in = ?expires_in, "access token refreshed");
                for listener in &self.listeners {
                    listener.on_token_response(&installed).await;
                }
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                for listener in &self.listeners {
                    listener.on_token_error(&err).await;
                }
                Err(err)
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }
}

#[async_trait]
impl RequestInterceptor for Credential {
    /// Attach the current access token. Pure snapshot read; an expired or
    /// missing token is attached as-is (or not at all) and repaired through
    /// the 401 path.
    async fn intercept(&self, request: &mut Request) {
        let tokens = self.tokens.read().await;
        if !tokens.access_token.is_empty() {
            self.access_method.apply(request, &tokens.access_token);
        }
    }
}

#[async_trait]
impl UnsuccessfulResponseHandler for Credential {
    /// React to a 401 by repairing the stored token.
    ///
    /// Runs regardless of `retry_supported` so the token is fixed for
    /// future calls even when this one cannot be retried. The staleness
    /// check and the refresh share one critical section, so N concurrent
    /// 401s produce exactly one exchange: the first caller refreshes, the
    /// rest observe a token different from the one their request carried
    /// and retry without touching the wire.
    async fn handle_response(
        &self,
        request: &Request,
        response: &Response,
        _retry_supported: bool,
    ) -> bool {
        if response.status != 401 {
            return false;
        }

        let _guard = self.refresh_lock.lock().await;

        let token_used = self.access_method.token_from_request(request);
        let current = self.tokens.read().await.access_token.clone();
        if token_used.as_deref() != Some(current.as_str()) && !current.is_empty() {
            debug!("token already rotated by another task, retrying with current token");
            return true;
        }

        match self.refresh_locked().await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                warn!(error = %err, "refresh after unauthorized response failed");
                false
            }
        }
    }
}

/// Assembles a [`Credential`].
pub struct CredentialBuilder {
    token_server: TokenServerClient,
    tokens: TokenSet,
    access_method: AccessMethod,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn RefreshListener>>,
}

impl CredentialBuilder {
    pub fn new(token_server: TokenServerClient) -> Self {
        Self {
            token_server,
            tokens: TokenSet::with_access_token(""),
            access_method: AccessMethod::default(),
            clock: Arc::new(SystemClock),
            listeners: Vec::new(),
        }
    }

    /// Seed the credential with a known access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.access_token = token.into();
        self
    }

    /// Seed the credential with a refresh token.
    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.refresh_token = Some(token.into());
        self
    }

    /// Seed the credential with a full token set, e.g. from persistence.
    pub fn tokens(mut self, tokens: TokenSet) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn access_method(mut self, method: AccessMethod) -> Self {
        self.access_method = method;
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn refresh_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Credential {
        Credential {
            tokens: RwLock::new(self.tokens),
            refresh_lock: Mutex::new(()),
            token_server: self.token_server,
            access_method: self.access_method,
            clock: self.clock,
            listeners: self.listeners,
        }
    }
}
