//! Common test utilities for lms-webhooks integration tests.
//!
//! Provides wiremock responders, an in-memory harness wiring the dispatcher
//! to a memory store, and subscription fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use lms_webhooks::models::CreateWebhookSubscription;
use lms_webhooks::{
    DeliveryEngine, Dispatcher, MemoryWebhookStore, SubscriptionService, WebhookStore,
    WebhookSubscription,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Standard test tenant IDs
pub const TENANT_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const TENANT_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// AES key shared by all test components.
pub const ENCRYPTION_KEY: [u8; 32] = [0x42u8; 32];

/// Short backoff base so retry tests stay fast.
pub const FAST_BACKOFF_MS: i64 = 25;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Dispatcher + memory store wired together.
pub struct TestHarness {
    pub store: Arc<MemoryWebhookStore>,
    pub dispatcher: Dispatcher,
}

impl TestHarness {
    pub fn new() -> Self {
        let engine = DeliveryEngine::new(ENCRYPTION_KEY.to_vec()).expect("engine builds");
        Self::with_engine(engine)
    }

    pub fn with_engine(engine: DeliveryEngine) -> Self {
        let store = Arc::new(MemoryWebhookStore::new());
        let dyn_store: Arc<dyn WebhookStore> = store.clone();
        let dispatcher = Dispatcher::new(dyn_store, engine);
        Self { store, dispatcher }
    }

    /// Subscription admin service sharing this harness's store, with HTTP
    /// targets allowed (mock servers live on loopback).
    pub fn subscription_service(&self) -> SubscriptionService {
        let dyn_store: Arc<dyn WebhookStore> = self.store.clone();
        SubscriptionService::new(dyn_store, ENCRYPTION_KEY.to_vec()).with_allow_http(true)
    }

    /// Insert a subscription directly into the store.
    pub async fn subscribe(
        &self,
        tenant_id: Uuid,
        target_url: &str,
        event_types: &[&str],
    ) -> WebhookSubscription {
        self.subscribe_with(tenant_id, target_url, event_types, |_| {})
            .await
    }

    /// Insert a subscription with fixture overrides.
    pub async fn subscribe_with(
        &self,
        tenant_id: Uuid,
        target_url: &str,
        event_types: &[&str],
        customize: impl FnOnce(&mut CreateWebhookSubscription),
    ) -> WebhookSubscription {
        let mut input = CreateWebhookSubscription {
            tenant_id,
            name: "test-endpoint".into(),
            description: None,
            target_url: target_url.into(),
            event_types: event_types.iter().map(|s| (*s).to_string()).collect(),
            secret_encrypted: None,
            custom_headers: HashMap::new(),
            max_retries: 3,
            retry_delay_base_ms: FAST_BACKOFF_MS,
            created_by: None,
        };
        customize(&mut input);
        self.store
            .create_subscription(input)
            .await
            .expect("create subscription")
    }
}

/// Encrypt a plaintext secret the way the engine expects to find it.
pub fn encrypt_test_secret(secret: &str) -> String {
    lms_webhooks::crypto::encrypt_secret(secret, &ENCRYPTION_KEY).expect("encrypt secret")
}

// ---------------------------------------------------------------------------
// CapturedRequest — for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder — captures requests, returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Capture responder with a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// All captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder — counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Counting responder with a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder — fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a given number of times before succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Fail `n` times with 500, then return 200.
    pub fn fail_times(n: u32) -> Self {
        Self::fail_with_status(n, 500)
    }

    /// Fail `n` times with a custom status code, then return 200.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    /// Current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}
