//! In-process test harness: the full router over an in-memory database,
//! the sandbox gateway and a recording mailer.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use rei25_portal::api::{create_router, AppState};
use rei25_portal::models::AppConfig;
use rei25_portal::providers::{MemoryMailer, SandboxGateway};
use rei25_portal::store::Store;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ADMIN: &str = "admin@rei.ug";
pub const ORGANIZER: &str = "org@rei.ug";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub gateway: Arc<SandboxGateway>,
    pub mailer: Arc<MemoryMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(AppConfig::for_testing(), SandboxGateway::new())
    }

    pub fn with_gateway(gateway: SandboxGateway) -> Self {
        Self::with(AppConfig::for_testing(), gateway)
    }

    pub fn with(mut config: AppConfig, gateway: SandboxGateway) -> Self {
        config.auth.admin_emails.insert(ADMIN.to_string());
        config.auth.organizer_emails.insert(ORGANIZER.to_string());

        let store = Arc::new(Store::in_memory().unwrap());
        let gateway = Arc::new(gateway);
        let mailer = Arc::new(MemoryMailer::new());
        let state = Arc::new(AppState::new(
            config,
            store,
            gateway.clone(),
            mailer.clone(),
        ));

        Self {
            router: create_router(state.clone()),
            state,
            gateway,
            mailer,
        }
    }

    /// Raw response: status, headers and body bytes
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    /// JSON response: status and parsed envelope
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send(method, uri, token, body).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Full OTP login; returns the session token
    pub async fn login(&self, email: &str) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/auth/request-otp",
                None,
                Some(serde_json::json!({ "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "request-otp for {}", email);

        let code = self.last_code(email);
        let (status, json) = self
            .call(
                Method::POST,
                "/api/auth/verify-otp",
                None,
                Some(serde_json::json!({ "email": email, "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify-otp for {}", email);
        json["data"]["token"].as_str().unwrap().to_string()
    }

    /// Most recent login code mailed to `email` (the six-digit word in the body)
    pub fn last_code(&self, email: &str) -> String {
        let sent = self.mailer.sent_to(email);
        let mail = sent
            .iter()
            .rev()
            .find(|m| m.subject.contains("login code"))
            .expect("no OTP mail");
        mail.text
            .split(|c: char| !c.is_ascii_digit())
            .find(|word| word.len() == 6)
            .unwrap()
            .to_string()
    }

    /// Log in and submit a member, in-person registration (UGX 150,000)
    pub async fn registered(&self, email: &str) -> (String, i64) {
        let token = self.login(email).await;
        let (status, json) = self
            .post(
                "/api/registrations",
                &token,
                serde_json::json!({
                    "fullName": "Jane Akello",
                    "phone": "0772123456",
                    "organization": "UNRA",
                    "jobTitle": "Engineer",
                    "country": "Uganda",
                    "category": "member",
                    "attendance": "in_person"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        (token, json["data"]["id"].as_i64().unwrap())
    }

    /// Poll the track endpoint until the payment leaves `processing`
    pub async fn wait_tracked(&self, reference: &str, token: &str) -> Value {
        for _ in 0..200 {
            let (status, json) = self
                .get(&format!("/api/payments/track/{}", reference), token)
                .await;
            if status == StatusCode::OK && json["data"]["state"] != "processing" {
                return json["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("payment {} never finished", reference);
    }
}

/// Amounts serialize as strings; accept numbers too
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not an amount: {}", other),
    }
}

pub fn error_code(json: &Value) -> &str {
    json["error"]["code"].as_str().unwrap_or("")
}
