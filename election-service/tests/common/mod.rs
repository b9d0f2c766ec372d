use std::sync::Arc;

use alloy::primitives::{address, Address};
use alloy::signers::local::PrivateKeySigner;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use election_service::{
    api, database::Database, ledger::memory::InMemoryLedger, signing::VoteSigner,
    state::AppState,
};
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-token";
pub const CONTRACT: Address = address!("1111111111111111111111111111111111111111");

pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<InMemoryLedger>,
}

/// Router over an in-memory database and ledger, with a random signing key.
pub async fn setup_app() -> TestApp {
    let key = PrivateKeySigner::random();
    let ledger = Arc::new(InMemoryLedger::new(CONTRACT, Some(key.address())));
    let db = Database::in_memory().await.expect("in-memory database");
    let signer = Arc::new(VoteSigner::new(key, CONTRACT, 300));
    let state = AppState::new(
        ledger.clone(),
        db,
        Some(signer),
        Some(ADMIN_TOKEN.to_string()),
        ":memory:",
    );
    TestApp {
        router: api::router(state),
        ledger,
    }
}

pub enum Caller<'a> {
    Anonymous,
    Admin,
    Voter(&'a str),
}

impl TestApp {
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        caller: Caller<'_>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        match caller {
            Caller::Anonymous => {}
            Caller::Admin => {
                builder = builder.header("authorization", format!("Bearer {}", ADMIN_TOKEN));
            }
            Caller::Voter(id) => {
                builder = builder.header("x-voter-id", id);
            }
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
        (status, json)
    }
}
