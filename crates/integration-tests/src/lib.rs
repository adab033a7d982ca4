//! End-to-end scenarios for the Luxus client session layer.
//!
//! Every test runs a full [`Session`] against a `wiremock` server standing in
//! for the storefront API, with in-memory storage that the test can inspect.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p luxus-integration-tests
//!
//! # With client logs
//! RUST_LOG=luxus_client=debug cargo test -p luxus-integration-tests -- --nocapture
//! ```

#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Once};
use std::time::Duration;

use luxus_client::{ClientConfig, KeyValueStore, MemoryStore, RetryPolicy, Session};
use secrecy::SecretString;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The user every fixture signs in as.
pub const USER_ID: i32 = 7;

/// Retry attempts configured by [`TestApp::start`].
pub const MAX_ATTEMPTS: u32 = 3;

static TRACING: Once = Once::new();

/// Route client logs through the test harness's captured output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A session wired to a mock API over inspectable storage.
pub struct TestApp {
    pub server: MockServer,
    pub storage: Arc<MemoryStore>,
    pub session: Session,
}

impl TestApp {
    /// A signed-out session with fast retries.
    pub async fn start() -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let storage = Arc::new(MemoryStore::new());

        let mut config = ClientConfig::new(&server.uri()).expect("mock server URI is valid");
        config.retry = RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: Duration::ZERO,
        };

        let session = Session::new(config, storage.clone()).expect("session builds");
        Self {
            server,
            storage,
            session,
        }
    }

    /// A session signed in as user 7 with `access-0`, both collections empty
    /// on the server.
    pub async fn signed_in() -> Self {
        let app = Self::start().await;
        app.mount_login("access-0", "refresh-0").await;
        app.mount_empty_collections().await;
        app.session
            .login("ana@example.com", &SecretString::from("hunter22"))
            .await
            .expect("login succeeds");
        app
    }

    pub async fn mount_login(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path("/users/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": USER_ID, "nome": "Ana", "email": "ana@example.com", "tipo": "Cliente"},
                "access_token": access_token,
                "refresh_token": refresh_token,
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_empty_collections(&self) {
        Mock::given(method("GET"))
            .and(path(format!("/cart/{USER_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/favorites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"favorites": []})))
            .mount(&self.server)
            .await;
    }

    /// Raw persisted value for `key`.
    pub async fn stored(&self, key: &str) -> Option<String> {
        self.storage.get(key).await.expect("memory store never fails")
    }
}

/// A product as the API serializes it.
#[must_use]
pub fn product_json(id: i32, title: &str, price: u32) -> Value {
    json!({
        "id": id,
        "titulo": title,
        "preco": price,
        "categoria": "Vestidos",
        "status": "disponivel"
    })
}
