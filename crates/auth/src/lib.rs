//! OAuth2 bearer-token credentials for the apiwire request pipeline.
//!
//! A [`Credential`] owns one user's token state and plugs into an
//! [`apiwire_http::RequestExecutor`] as both the pre-send interceptor
//! (attaching `Authorization: Bearer <token>`) and the unsuccessful-response
//! handler (reacting to 401 by refreshing the token against the OAuth2 token
//! endpoint and asking for one retry).
//!
//! Refreshes are single-flight: concurrent calls that hit 401 at the same
//! time coalesce into one token-endpoint exchange, and every waiter observes
//! the result.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐
//! │   Credential   │  intercept / handle-401 / refresh state machine
//! └───────┬────────┘
//!         │
//!         ├──► TokenServerClient   (one wire exchange per refresh)
//!         ├──► TokenSet            (locked token store)
//!         └──► RefreshListener*    (persistence hooks)
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod credential;
pub mod error;
pub mod token_server;
pub mod types;

pub use credential::{AccessMethod, Credential, CredentialBuilder, RefreshListener};
pub use error::TokenServerError;
pub use token_server::TokenServerClient;
pub use types::{ClientAuthentication, Grant, TokenErrorResponse, TokenResponse, TokenSet};
