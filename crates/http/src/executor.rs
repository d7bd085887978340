//! Request executor: drives one logical HTTP call through signing,
//! transport I/O, and recovery.
//!
//! The pipeline is built once per executor and never mutated after requests
//! start flowing: an ordered interceptor list runs before every send attempt,
//! and an ordered handler list is consulted for unsuccessful responses.
//! Transient failures (transport errors, retryable 5xx) are retried under a
//! per-call [`BackOff`]; handler-triggered retries (the credential refresh
//! path) are granted at most once per logical call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backoff::{BackOff, ExponentialBackOff};
use crate::error::{ExecuteError, TransportError};
use crate::request::{Request, RequestContext};
use crate::response::Response;
use crate::transport::HttpTransport;

/// Mutates an outgoing request before every send attempt.
///
/// Interceptors must not perform network I/O and must not fail; a credential
/// attaches its current token here from a snapshot read.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: &mut Request);
}

/// Decides whether an unsuccessful response warrants retrying the call.
///
/// Handlers run even when a retry is not supported, so they can repair state
/// (e.g. refresh an expired token) for future calls. A `true` verdict is only
/// acted on when `retry_supported` was passed as `true`.
#[async_trait]
pub trait UnsuccessfulResponseHandler: Send + Sync {
    async fn handle_response(
        &self,
        request: &Request,
        response: &Response,
        retry_supported: bool,
    ) -> bool;
}

type BackOffFactory = dyn Fn() -> Box<dyn BackOff> + Send + Sync;

/// Orchestrates the execute/intercept/respond/retry loop for single logical
/// HTTP calls. Cheap to clone via [`Arc`]s; build once, share freely.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    handlers: Vec<Arc<dyn UnsuccessfulResponseHandler>>,
    backoff_factory: Arc<BackOffFactory>,
    retry_server_errors: bool,
    max_attempts: u32,
}

impl RequestExecutor {
    pub fn builder(transport: Arc<dyn HttpTransport>) -> RequestExecutorBuilder {
        RequestExecutorBuilder::new(transport)
    }

    /// Drive one logical call to completion.
    ///
    /// The outcome is always either a response (of any status) or a
    /// classified [`ExecuteError`]; exhausted retries surface the last
    /// failure, never a silent drop.
    ///
    /// # Errors
    /// - [`ExecuteError::Transport`] when transport failures outlast the
    ///   backoff budget or are not transient.
    /// - [`ExecuteError::DeadlineExceeded`] when `request.deadline` is
    ///   exhausted at any blocking point.
    pub async fn execute(&self, mut request: Request) -> Result<Response, ExecuteError> {
        let started = Instant::now();
        let deadline = request.deadline;
        let mut backoff = (self.backoff_factory)();
        let mut ctx = RequestContext::default();

        loop {
            ctx.attempt_count += 1;

            for interceptor in &self.interceptors {
                interceptor.intercept(&mut request).await;
            }

            debug!(
                method = %request.method,
                url = %request.url,
                attempt = ctx.attempt_count,
                "sending request"
            );

            let response = match self.send_bounded(&request, deadline, started).await? {
                Ok(response) => response,
                Err(source) => {
                    if !source.is_transient() || ctx.attempt_count >= self.max_attempts {
                        return Err(ExecuteError::Transport {
                            attempts: ctx.attempt_count,
                            source,
                        });
                    }
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!(attempt = ctx.attempt_count, ?delay, error = %source,
                                "transport failure, backing off");
                            self.sleep_bounded(delay, deadline, started).await?;
                            continue;
                        }
                        None => {
                            return Err(ExecuteError::Transport {
                                attempts: ctx.attempt_count,
                                source,
                            });
                        }
                    }
                }
            };

            if response.is_success() {
                return Ok(response);
            }

            if response.status == 401 {
                // One handler-triggered retry per logical call; after that a
                // second 401 is terminal.
                let retry_supported =
                    !ctx.refresh_attempted && ctx.attempt_count < self.max_attempts;

                let mut requires_retry = false;
                for handler in &self.handlers {
                    let verdict = self
                        .run_bounded(
                            handler.handle_response(&request, &response, retry_supported),
                            deadline,
                            started,
                        )
                        .await?;
                    requires_retry |= verdict;
                }

                if requires_retry && retry_supported {
                    debug!(attempt = ctx.attempt_count, "handler requested retry after 401");
                    ctx.refresh_attempted = true;
                    continue;
                }
                self.check_deadline(deadline, started)?;
                return Ok(response);
            }

            if self.retry_server_errors
                && response.is_server_error()
                && ctx.attempt_count < self.max_attempts
            {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(status = response.status, ?delay, "server error, backing off");
                    self.sleep_bounded(delay, deadline, started).await?;
                    continue;
                }
            }

            return Ok(response);
        }
    }

    async fn send_bounded(
        &self,
        request: &Request,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<Result<Response, TransportError>, ExecuteError> {
        self.run_bounded(self.transport.send(request), deadline, started).await
    }

    /// Run a future under the remaining deadline budget, if any.
    async fn run_bounded<T>(
        &self,
        fut: impl std::future::Future<Output = T>,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<T, ExecuteError> {
        match deadline {
            None => Ok(fut.await),
            Some(deadline) => {
                let remaining = self.remaining(deadline, started)?;
                tokio::time::timeout(remaining, fut)
                    .await
                    .map_err(|_| ExecuteError::DeadlineExceeded { elapsed: started.elapsed() })
            }
        }
    }

    async fn sleep_bounded(
        &self,
        delay: Duration,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<(), ExecuteError> {
        if let Some(deadline) = deadline {
            // Sleeping past the deadline can never lead to a useful retry.
            if self.remaining(deadline, started)? < delay {
                return Err(ExecuteError::DeadlineExceeded { elapsed: started.elapsed() });
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn remaining(&self, deadline: Instant, started: Instant) -> Result<Duration, ExecuteError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(ExecuteError::DeadlineExceeded { elapsed: now - started });
        }
        Ok(deadline - now)
    }

    fn check_deadline(
        &self,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<(), ExecuteError> {
        if let Some(deadline) = deadline {
            self.remaining(deadline, started)?;
        }
        Ok(())
    }
}

/// Builder for [`RequestExecutor`]; the pipeline is frozen at `build`.
pub struct RequestExecutorBuilder {
    transport: Arc<dyn HttpTransport>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    handlers: Vec<Arc<dyn UnsuccessfulResponseHandler>>,
    backoff_factory: Arc<BackOffFactory>,
    retry_server_errors: bool,
    max_attempts: u32,
}

impl RequestExecutorBuilder {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            interceptors: Vec::new(),
            handlers: Vec::new(),
            backoff_factory: Arc::new(|| Box::new(ExponentialBackOff::new())),
            retry_server_errors: false,
            max_attempts: 10,
        }
    }

    /// Append an interceptor; they run in registration order.
    pub fn interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Append an unsuccessful-response handler; they run in registration
    /// order and their verdicts are OR-ed.
    pub fn unsuccessful_response_handler(
        mut self,
        handler: Arc<dyn UnsuccessfulResponseHandler>,
    ) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Factory producing one fresh [`BackOff`] per logical call.
    pub fn backoff_factory(
        mut self,
        factory: impl Fn() -> Box<dyn BackOff> + Send + Sync + 'static,
    ) -> Self {
        self.backoff_factory = Arc::new(factory);
        self
    }

    /// Also retry 5xx responses under the backoff policy.
    pub fn retry_server_errors(mut self, retry: bool) -> Self {
        self.retry_server_errors = retry;
        self
    }

    /// Hard cap on send attempts per logical call, independent of backoff.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn build(self) -> RequestExecutor {
        RequestExecutor {
            transport: self.transport,
            interceptors: self.interceptors,
            handlers: self.handlers,
            backoff_factory: self.backoff_factory,
            retry_server_errors: self.retry_server_errors,
            max_attempts: self.max_attempts,
        }
    }
}
