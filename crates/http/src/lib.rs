//! HTTP request execution pipeline with pluggable transports.
//!
//! This crate drives one logical HTTP call through an immutable interceptor
//! pipeline, a caller-injected low-level transport, and a recovery loop:
//! transient failures (network errors, retryable 5xx) are retried under a
//! [`backoff::BackOff`] policy, and unauthorized responses are offered to
//! registered [`executor::UnsuccessfulResponseHandler`]s which may fix the
//! request (e.g. refresh a credential) and ask for exactly one retry.
//!
//! The crate knows nothing about OAuth; credentials plug in through the
//! interceptor and handler seams.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ RequestExecutor  │  intercept → send → classify → maybe retry
//! └────────┬─────────┘
//!          │
//!          ├──► RequestInterceptor*           (mutate outgoing request)
//!          ├──► HttpTransport                 (low-level I/O, injected)
//!          ├──► UnsuccessfulResponseHandler*  (401 recovery verdicts)
//!          └──► BackOff                       (transient retry delays)
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod backoff;
pub mod clock;
pub mod error;
pub mod executor;
pub mod request;
pub mod response;
pub mod transport;

pub use backoff::{BackOff, ExponentialBackOff, ExponentialBackOffBuilder, FixedBackOff, StopBackOff};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ExecuteError, TransportError};
pub use executor::{
    RequestExecutor, RequestExecutorBuilder, RequestInterceptor, UnsuccessfulResponseHandler,
};
pub use request::{Method, Request, RequestContext};
pub use response::Response;
#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;
pub use transport::HttpTransport;
