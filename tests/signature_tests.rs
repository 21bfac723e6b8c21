//! Integration tests for HMAC signing on the wire.

mod common;

use common::*;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use lms_webhooks::catalog::UserPayload;
use lms_webhooks::crypto;
use lms_webhooks::WebhookEvent;

fn event(tenant: Uuid) -> WebhookEvent {
    WebhookEvent::user_created(
        tenant,
        &UserPayload {
            user_id: Uuid::new_v4(),
            email: "trainee@example.com".into(),
            display_name: None,
        },
    )
}

/// A subscription with a secret gets a signature that verifies against the
/// exact body bytes that arrived.
#[tokio::test]
async fn test_signature_verifies_against_received_body() {
    let server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .subscribe_with(TENANT_A, &server.uri(), &["user.created"], |input| {
            input.secret_encrypted = Some(encrypt_test_secret("whsec_testsecret"));
        })
        .await;

    harness.dispatcher.dispatch(&event(TENANT_A)).await.unwrap();

    let requests = capture.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];

    let sig = req.header("X-Webhook-Signature").expect("signature header");
    assert!(sig.starts_with("sha256="));
    assert!(crypto::verify_signature(sig, "whsec_testsecret", &req.body));

    // A different secret must not verify
    assert!(!crypto::verify_signature(sig, "whsec_other", &req.body));
}

/// No secret, no signature header.
#[tokio::test]
async fn test_no_secret_means_no_signature_header() {
    let server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .subscribe(TENANT_A, &server.uri(), &["user.created"])
        .await;

    harness.dispatcher.dispatch(&event(TENANT_A)).await.unwrap();

    let requests = capture.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].header("X-Webhook-Signature").is_none());
}

/// After a secret rotation the next dispatch signs with the new secret, and
/// the old one no longer verifies.
#[tokio::test]
async fn test_rotated_secret_signs_subsequent_deliveries() {
    let server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let sub = harness
        .subscribe_with(TENANT_A, &server.uri(), &["user.created"], |input| {
            input.secret_encrypted = Some(encrypt_test_secret("whsec_original"));
        })
        .await;

    let service = harness.subscription_service();
    let new_secret = service.rotate_secret(TENANT_A, sub.id).await.unwrap();
    assert!(new_secret.starts_with("whsec_"));
    assert_ne!(new_secret, "whsec_original");

    harness.dispatcher.dispatch(&event(TENANT_A)).await.unwrap();

    let requests = capture.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    let sig = req.header("X-Webhook-Signature").expect("signature header");

    assert!(crypto::verify_signature(sig, &new_secret, &req.body));
    assert!(!crypto::verify_signature(sig, "whsec_original", &req.body));
}

/// Body bytes, delivery id, and signature are all byte-identical across the
/// retries of a single dispatch.
#[tokio::test]
async fn test_body_and_delivery_id_stable_across_retries() {
    let server = MockServer::start().await;
    let capture = CaptureResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness
        .subscribe_with(TENANT_A, &server.uri(), &["user.created"], |input| {
            input.max_retries = 3;
            input.secret_encrypted = Some(encrypt_test_secret("whsec_testsecret"));
        })
        .await;

    harness.dispatcher.dispatch(&event(TENANT_A)).await.unwrap();

    let requests = capture.requests();
    assert_eq!(requests.len(), 3);

    let first = &requests[0];
    for req in &requests[1..] {
        assert_eq!(req.body, first.body, "retries resend the same bytes");
        assert_eq!(
            req.header("X-Webhook-Delivery-Id"),
            first.header("X-Webhook-Delivery-Id")
        );
        assert_eq!(
            req.header("X-Webhook-Signature"),
            first.header("X-Webhook-Signature")
        );
    }
}

/// Two subscriptions to the same event each get their own delivery id and
/// their own `webhookId` in the envelope.
#[tokio::test]
async fn test_each_subscription_gets_distinct_delivery_identity() {
    let server_one = MockServer::start().await;
    let server_two = MockServer::start().await;
    let capture_one = CaptureResponder::new();
    let capture_two = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture_one.clone())
        .mount(&server_one)
        .await;
    Mock::given(method("POST"))
        .respond_with(capture_two.clone())
        .mount(&server_two)
        .await;

    let harness = TestHarness::new();
    let sub_one = harness
        .subscribe(TENANT_A, &server_one.uri(), &["user.created"])
        .await;
    let sub_two = harness
        .subscribe(TENANT_A, &server_two.uri(), &["user.created"])
        .await;

    harness.dispatcher.dispatch(&event(TENANT_A)).await.unwrap();

    let req_one = &capture_one.requests()[0];
    let req_two = &capture_two.requests()[0];

    assert_ne!(
        req_one.header("X-Webhook-Delivery-Id"),
        req_two.header("X-Webhook-Delivery-Id")
    );
    assert_eq!(
        req_one.body_json()["webhookId"],
        serde_json::json!(sub_one.id)
    );
    assert_eq!(
        req_two.body_json()["webhookId"],
        serde_json::json!(sub_two.id)
    );
}
