//! Integration tests for the request executor over the reqwest transport.
//!
//! Exercises the full pipeline against a local mock server: success paths,
//! 5xx retry under backoff, and surfacing of terminal error statuses.

use std::sync::Arc;
use std::time::Duration;

use apiwire_http::{
    BackOff, FixedBackOff, Method, Request, RequestExecutor, ReqwestTransport,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(reqwest::Client::new()))
}

fn fast_backoff() -> impl Fn() -> Box<dyn BackOff> + Send + Sync {
    || Box::new(FixedBackOff::new(Duration::from_millis(1), 5))
}

fn url_of(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).expect("mock server URI")
}

/// Validates the plain success scenario: a 200 response passes through with
/// its body intact and headers set by the request are delivered.
#[tokio::test(flavor = "multi_thread")]
async fn executes_simple_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("X-Client", "apiwire"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(transport()).build();
    let mut request = Request::new(Method::Get, url_of(&server, "/items"));
    request.set_header("X-Client", "apiwire");

    let response = executor.execute(request).await.expect("request succeeds");
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "payload");
}

/// Validates the retryable 5xx scenario: with server-error retries enabled,
/// the executor retries under backoff until the server recovers.
#[tokio::test(flavor = "multi_thread")]
async fn retries_server_errors_until_recovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(transport())
        .retry_server_errors(true)
        .backoff_factory(fast_backoff())
        .build();

    let response = executor
        .execute(Request::new(Method::Get, url_of(&server, "/flaky")))
        .await
        .expect("recovers after retries");
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "recovered");
}

/// Validates the terminal 4xx scenario: client errors are returned as-is,
/// never retried, with the body preserved for diagnostics.
#[tokio::test(flavor = "multi_thread")]
async fn surfaces_client_errors_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid payload"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(transport())
        .retry_server_errors(true)
        .backoff_factory(fast_backoff())
        .build();

    let mut request = Request::new(Method::Post, url_of(&server, "/submit"));
    request.set_form_body("a=1".to_string());

    let response = executor.execute(request).await.expect("response surfaced");
    assert_eq!(response.status, 422);
    assert_eq!(response.text(), "invalid payload");
}

/// Validates the bounded-exhaustion scenario: a permanently failing server
/// yields the last 5xx response once the backoff budget is spent.
#[tokio::test(flavor = "multi_thread")]
async fn exhausted_backoff_surfaces_last_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("still down"))
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(transport())
        .retry_server_errors(true)
        .backoff_factory(|| Box::new(FixedBackOff::new(Duration::from_millis(1), 2)))
        .build();

    let response = executor
        .execute(Request::new(Method::Get, url_of(&server, "/down")))
        .await
        .expect("last response surfaced");
    assert_eq!(response.status, 500);
    assert_eq!(response.text(), "still down");
}
