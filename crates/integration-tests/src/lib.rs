//! End-to-end test harness for the identity gateway.
//!
//! Tests drive the real router with `tower::ServiceExt::oneshot`, backed by
//! the in-memory identity and counter stores. No database or network is
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p miniapp-integration-tests
//! ```

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use miniapp_core::{RawFields, SignatureVerifier};
use miniapp_server::{
    AppState, app,
    config::ServerConfig,
    db::MemoryIdentityStore,
    services::rate_limit::MemoryCounterStore,
};

/// Bot token shared with the signer.
pub const BOT_TOKEN: &str = "7342037359:AAHb0t-t0ken-f0r-Test1ng";

/// Session signing secret.
pub const SESSION_SECRET: &str = "k7Qm2vX9pL4sR8tW1yZ6bN3cF5hJ0dGa";

/// Session cookie name used by the default configuration.
pub const SESSION_COOKIE: &str = "miniapp_session";

/// Policy marker cookie name used by the default configuration.
pub const MARKER_COOKIE: &str = "miniapp_session_policy";

/// Build a configuration from the base test variables plus `overrides`.
#[must_use]
pub fn test_config(overrides: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = [
        ("MINIAPP_DATABASE_URL", "postgres://localhost/miniapp_test"),
        ("MINIAPP_BOT_TOKEN", BOT_TOKEN),
        ("MINIAPP_SESSION_SECRET", SESSION_SECRET),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect();
    for (k, v) in overrides {
        vars.insert((*k).to_owned(), (*v).to_owned());
    }
    ServerConfig::from_lookup(move |key| vars.get(key).cloned()).unwrap()
}

/// A router wired to in-memory stores.
pub struct TestApp {
    pub store: MemoryIdentityStore,
    pub state: AppState,
    router: Router,
    signer: SignatureVerifier,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let store = MemoryIdentityStore::new();
        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(MemoryCounterStore::new()),
        )
        .unwrap();
        Self {
            router: app(state.clone()),
            store,
            state,
            signer: SignatureVerifier::new(&SecretString::from(BOT_TOKEN)).unwrap(),
        }
    }

    /// Init data for `user_id`, signed as the platform would, dated now.
    #[must_use]
    pub fn init_data(&self, user_id: i64) -> RawFields {
        let mut fields = RawFields::new();
        fields.insert("auth_date", Utc::now().timestamp().to_string());
        fields.insert("query_id", "AAHdF6IQAAAAAN0XohDhrOrc");
        fields.insert(
            "user",
            format!(
                r#"{{"id":{user_id},"first_name":"Test","last_name":"User","username":"test{user_id}","language_code":"en","photo_url":"https:\/\/t.me\/i\/userpic\/320\/test{user_id}.svg"}}"#
            ),
        );
        self.sign(&mut fields);
        fields
    }

    /// Replace the `hash` field with a valid signature over `fields`.
    pub fn sign(&self, fields: &mut RawFields) {
        fields.remove("hash");
        let hash = self.signer.sign(fields);
        fields.insert("hash", hash);
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// `POST /api/auth/login` with a JSON `initData` string.
    pub async fn login_request(&self, fields: &RawFields, extra: &[(&str, &str)]) -> Response<Body> {
        let body = serde_json::json!({ "initData": fields.to_query() });
        let mut builder = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Log `user_id` in and return the bearer token.
    pub async fn login(&self, user_id: i64) -> String {
        let response = self.login_request(&self.init_data(user_id), &[]).await;
        assert_eq!(response.status(), 200, "login failed");
        let body = body_json(response).await;
        body["data"]["token"].as_str().unwrap().to_owned()
    }

    /// `GET path` with a bearer token and extra headers.
    pub async fn get(&self, path: &str, token: Option<&str>, extra: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::get(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values on a response.
#[must_use]
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_owned)
        .collect()
}

/// The `Set-Cookie` value for cookie `name`, if any.
#[must_use]
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
}

/// Value part of a `Set-Cookie` header.
#[must_use]
pub fn cookie_value(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map_or("", |(_, value)| value)
}
