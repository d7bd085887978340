//! Client for the OAuth2 token endpoint.

use std::sync::Arc;
use std::time::Duration;

use apiwire_http::{BackOff, ExponentialBackOff, HttpTransport, Request, Response};
use tracing::{debug, warn};
use url::Url;

use crate::error::TokenServerError;
use crate::types::{ClientAuthentication, Grant, TokenErrorResponse, TokenResponse};

type BackOffFactory = dyn Fn() -> Box<dyn BackOff> + Send + Sync;

/// Performs grant exchanges against a single token endpoint.
///
/// Every exchange is a form-encoded POST. Network failures and 5xx
/// responses are retried under a fresh backoff per exchange; definitive
/// OAuth2 errors and malformed bodies fail immediately. The whole exchange
/// runs under `exchange_timeout`.
pub struct TokenServerClient {
    transport: Arc<dyn HttpTransport>,
    token_url: Url,
    client_auth: ClientAuthentication,
    backoff_factory: Arc<BackOffFactory>,
    exchange_timeout: Duration,
}

impl TokenServerClient {
    /// Default wall-clock budget for one exchange including retries.
    pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_url: Url,
        client_auth: ClientAuthentication,
    ) -> Self {
        Self {
            transport,
            token_url,
            client_auth,
            backoff_factory: Arc::new(|| {
                Box::new(ExponentialBackOff::new()) as Box<dyn BackOff>
            }),
            exchange_timeout: Self::DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Replace the backoff used for transient retries within an exchange.
    pub fn backoff_factory(
        mut self,
        factory: impl Fn() -> Box<dyn BackOff> + Send + Sync + 'static,
    ) -> Self {
        self.backoff_factory = Arc::new(factory);
        self
    }

    /// Bound the total duration of one exchange, retries included.
    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Exchange a grant for tokens.
    ///
    /// Returns the parsed success response; the caller decides how to store
    /// it. Classification: transport failures and 5xx after exhausted
    /// retries are [`TokenServerError::Transient`], a parseable RFC 6749
    /// error body is [`TokenServerError::AuthServer`], anything the client
    /// cannot interpret is [`TokenServerError::Protocol`].
    pub async fn request_token(&self, grant: &Grant) -> Result<TokenResponse, TokenServerError> {
        debug!(grant_type = grant.grant_type(), url = %self.token_url, "requesting token");
        match tokio::time::timeout(self.exchange_timeout, self.exchange(grant)).await {
            Ok(result) => result,
            Err(_) => Err(TokenServerError::DeadlineExceeded),
        }
    }

    async fn exchange(&self, grant: &Grant) -> Result<TokenResponse, TokenServerError> {
        let mut backoff = (self.backoff_factory)();
        loop {
            let message = match self.transport.send(&self.build_request(grant)).await {
                Ok(response) if response.is_server_error() => {
                    format!("token server returned {}", response.status)
                }
                Ok(response) => return self.classify(response),
                Err(err) if err.is_transient() => err.to_string(),
                Err(err) => {
                    return Err(TokenServerError::Protocol { message: err.to_string() })
                }
            };

            // Transient failure: wait out the backoff or give up.
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(delay_ms = delay.as_millis() as u64, %message, "token exchange retry");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(TokenServerError::Transient { message }),
            }
        }
    }

    fn build_request(&self, grant: &Grant) -> Request {
        let mut request = Request::post(self.token_url.clone());
        request.set_form_body(grant.to_form_body(&self.client_auth));
        request.set_header("Accept", "application/json");
        request
    }

    fn classify(&self, response: Response) -> Result<TokenResponse, TokenServerError> {
        if response.is_success() {
            return response.json::<TokenResponse>().map_err(|err| {
                TokenServerError::Protocol {
                    message: format!("unparseable token response: {err}"),
                }
            });
        }

        // 4xx: the server speaks OAuth2 if the body parses as an error
        // response, otherwise the reply is garbage.
        match response.json::<TokenErrorResponse>() {
            Ok(error) => {
                debug!(code = %error.error, "token server rejected grant");
                Err(TokenServerError::AuthServer {
                    code: error.error,
                    description: error.error_description,
                })
            }
            Err(_) => Err(TokenServerError::Protocol {
                message: format!(
                    "token server returned {} with unrecognized body",
                    response.status
                ),
            }),
        }
    }
}
