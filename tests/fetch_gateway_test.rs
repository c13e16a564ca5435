//! Integration tests for the fetch gateway's retry and rate-limit policy.

use forum_graph_scraper::config::Config;
use forum_graph_scraper::fetch::{FetchClient, FetchError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> FetchClient {
    FetchClient::new(&Config::for_testing()).expect("Failed to build fetch client")
}

#[tokio::test]
async fn test_success_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client()
        .fetch(&format!("{}/page", server.uri()))
        .await
        .expect("fetch should succeed");
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_client_error_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .expect_err("404 must not be retried");
    match err {
        FetchError::Rejected { status, .. } => assert_eq!(status.as_u16(), 404),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_retries_then_exhausts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client()
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .expect_err("persistent 5xx must exhaust");
    match err {
        FetchError::Exhausted {
            attempts,
            last_status,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status.map(|s| s.as_u16()), Some(503));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_then_recovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let body = client()
        .fetch(&format!("{}/recovering", server.uri()))
        .await
        .expect("third attempt should succeed");
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn test_429_retries_without_consuming_attempts() {
    let server = MockServer::start().await;
    // More 429s than the attempt budget allows for other error classes:
    // rate-limit responses must not count against it.
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("through"))
        .mount(&server)
        .await;

    let body = client()
        .fetch(&format!("{}/limited", server.uri()))
        .await
        .expect("429s should never exhaust the budget");
    assert_eq!(body, "through");
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_429_without_retry_after_uses_fallback_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    // The testing config shrinks the fallback delay to milliseconds, so
    // this completes quickly while still exercising the fallback path.
    let body = client()
        .fetch(&format!("{}/limited", server.uri()))
        .await
        .expect("fetch should succeed after fallback delay");
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_network_error_exhausts_attempts() {
    // Nothing listens here; connections fail at the network level.
    let err = client()
        .fetch("http://127.0.0.1:1/unreachable")
        .await
        .expect_err("connection failures must exhaust");
    match err {
        FetchError::Exhausted {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_some());
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}
