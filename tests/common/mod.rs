#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use shopfront::api::AppState;
use shopfront::config::Config;
use shopfront::payments::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway};
use shopfront::services::{MailError, Mailer};
use tokio::sync::Mutex;
use tower::ServiceExt;

pub const PASSWORD: &str = "secret123";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Keeps the tokens that would have been mailed, keyed by recipient.
#[derive(Default)]
pub struct RecordingMailer {
    verification: Mutex<HashMap<String, String>>,
    reset: Mutex<HashMap<String, String>>,
}

impl RecordingMailer {
    pub async fn verification_token(&self, email: &str) -> Option<String> {
        self.verification.lock().await.get(email).cloned()
    }

    pub async fn reset_token(&self, email: &str) -> Option<String> {
        self.reset.lock().await.get(email).cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_register_confirmation(
        &self,
        email: &str,
        _name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        self.verification
            .lock()
            .await
            .insert(email.to_string(), token.to_string());
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError> {
        self.reset
            .lock()
            .await
            .insert(email.to_string(), token.to_string());
        Ok(())
    }
}

/// Hands out `cs_test_<n>` sessions and remembers every request.
#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicUsize,
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(request);
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: format!("https://checkout.test/pay/cs_test_{n}"),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
    pub gateway: Arc<FakeGateway>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    // A single connection keeps the in-memory database alive for the test
    config.general.database_url = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.general.metrics_enabled = false;
    config.auth.jwt_secret = "test-access-secret".to_string();
    config.auth.jwt_refresh_secret = "test-refresh-secret".to_string();
    config.auth.jwt_mail_secret = "test-mail-secret".to_string();
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.server.secure_cookies = false;
    config.server.client_url = "http://shop.test".to_string();
    config.stripe.webhook_secret = WEBHOOK_SECRET.to_string();
    config.scheduler.enabled = false;
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    let gateway = Arc::new(FakeGateway::default());

    let state = shopfront::api::create_app_state_with(
        config,
        mailer.clone(),
        gateway.clone(),
        None,
    )
    .await
    .expect("Failed to create app state");
    let router = shopfront::api::router(state.clone());

    TestApp {
        router,
        state,
        mailer,
        gateway,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Registers and confirms an account, returning its id.
    pub async fn register_active(&self, email: &str) -> i32 {
        let response = self
            .json(
                "POST",
                "/api/users",
                None,
                &serde_json::json!({
                    "name": "Anna",
                    "surname": "Nowak",
                    "email": email,
                    "password": PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["data"]["id"].as_i64().unwrap();

        let token = self.mailer.verification_token(email).await.unwrap();
        let response = self
            .json(
                "POST",
                "/api/auth/verify-email",
                None,
                &serde_json::json!({ "token": token }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        i32::try_from(id).unwrap()
    }

    /// Logs in and returns the access token and the refresh cookie value.
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .json(
                "POST",
                "/api/auth/login",
                None,
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = refresh_cookie(&response).expect("login sets the refresh cookie");
        let body = body_json(response).await;
        let access = body["data"]["access_token"].as_str().unwrap().to_string();
        (access, cookie)
    }

    pub async fn customer(&self, email: &str) -> (i32, String) {
        let id = self.register_active(email).await;
        let (access, _) = self.login(email, PASSWORD).await;
        (id, access)
    }

    pub async fn admin(&self) -> String {
        let email = "admin@shop.test";
        self.state
            .user_service()
            .ensure_admin(email, PASSWORD)
            .await
            .unwrap();
        self.login(email, PASSWORD).await.0
    }
}

pub fn refresh_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("refreshToken="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub const BOUNDARY: &str = "shopfront-test-boundary";

/// One part of a `multipart/form-data` body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(method: &str, uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn png_fixture() -> Vec<u8> {
    use image::{ImageBuffer, ImageFormat, Rgb};

    let img = ImageBuffer::from_fn(16, 16, |x, _| {
        if x % 2 == 0 {
            Rgb([200u8, 160, 100])
        } else {
            Rgb([40u8, 40, 40])
        }
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub const COLORS_JSON: &str = r##"[{"name":"Natural","hex":"#c8a165","stock":5},{"name":"Black","hex":"#000","stock":1}]"##;

/// Creates a public product through the API and returns its detail JSON.
pub async fn create_product(app: &TestApp, admin: &str, name: &str, price: &str) -> serde_json::Value {
    let png = png_fixture();
    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            admin,
            &[
                Part::Text("name", name),
                Part::Text("en_name", name),
                Part::Text("brand", "Woodworks"),
                Part::Text("code", "WW-1"),
                Part::Text("category", "chairs"),
                Part::Text("price", price),
                Part::Text("public", "true"),
                Part::Text("materials", r#"["wood"]"#),
                Part::Text("colors", COLORS_JSON),
                Part::File("images", "a.png", &png),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}
