mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{PASSWORD, body_json, refresh_cookie, spawn_app};
use serde_json::json;

fn with_refresh_cookie(method: &str, uri: &str, cookie: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("refreshToken={cookie}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app.get("/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app().await;

    for uri in ["/api/users/me", "/api/cart", "/api/orders/all", "/api/products/admin"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let response = app.get("/api/users/me", Some("not-a-jwt")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_and_activation() {
    let app = spawn_app().await;
    let email = "anna@shop.test";

    let register = json!({
        "name": "Anna",
        "surname": "Nowak",
        "email": email,
        "password": PASSWORD,
        "phone_number": "+48 600 100 200",
    });

    let response = app.json("POST", "/api/users", None, &register).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["activated"], false);
    assert_eq!(body["data"]["role"], "customer");
    assert!(body["data"].get("password").is_none());

    let response = app.json("POST", "/api/users", None, &register).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unconfirmed accounts cannot log in
    let response = app
        .json(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "email": email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .json(
            "POST",
            "/api/auth/verify-email",
            None,
            &json!({ "token": "garbage" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let token = app.mailer.verification_token(email).await.unwrap();
    let response = app
        .json("POST", "/api/auth/verify-email", None, &json!({ "token": token }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (access, _) = app.login(email, PASSWORD).await;
    let response = app.get("/api/users/me", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["email"], email);
    assert_eq!(body["data"]["activated"], true);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = spawn_app().await;

    let cases = [
        json!({ "name": "A", "surname": "Nowak", "email": "a@shop.test", "password": PASSWORD }),
        json!({ "name": "Anna", "surname": "Nowak", "email": "not-an-email", "password": PASSWORD }),
        json!({ "name": "Anna", "surname": "Nowak", "email": "a@shop.test", "password": "123" }),
        json!({ "name": "Anna", "surname": "Nowak", "email": "a@shop.test", "password": PASSWORD, "phone_number": "call me" }),
    ];

    for case in cases {
        let response = app.json("POST", "/api/users", None, &case).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{case}");
    }
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = spawn_app().await;
    app.register_active("jan@shop.test").await;

    let response = app
        .json(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "email": "jan@shop.test", "password": "wrong-pass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotates_cookie() {
    let app = spawn_app().await;
    app.register_active("jan@shop.test").await;
    let (_, cookie) = app.login("jan@shop.test", PASSWORD).await;

    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = refresh_cookie(&response).unwrap();
    assert_ne!(rotated, cookie);
    let body = body_json(response).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    let response = app.get("/api/auth/profile", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The superseded token is revoked
    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_refresh_rotates_once() {
    let app = spawn_app().await;
    let user_id = app.register_active("jan@shop.test").await;
    let (_, cookie) = app.login("jan@shop.test", PASSWORD).await;

    let (first, second) = tokio::join!(
        app.send(with_refresh_cookie("POST", "/api/auth/refresh", &cookie, None)),
        app.send(with_refresh_cookie("POST", "/api/auth/refresh", &cookie, None)),
    );

    let mut statuses = [first.status(), second.status()];
    statuses.sort_by_key(StatusCode::as_u16);
    assert_eq!(statuses, [StatusCode::OK, StatusCode::UNAUTHORIZED]);

    let now = chrono::Utc::now().timestamp();
    let active = app
        .state
        .store()
        .active_refresh_tokens(user_id, now)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = spawn_app().await;
    app.register_active("jan@shop.test").await;
    let (access, cookie) = app.login("jan@shop.test", PASSWORD).await;

    let response = app
        .send(with_refresh_cookie(
            "DELETE",
            "/api/auth/logout",
            &cookie,
            Some(&access),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cleared.starts_with("refreshToken=;"));
    assert!(cleared.contains("Max-Age=0"));

    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_rejects_foreign_refresh_token() {
    let app = spawn_app().await;
    app.register_active("jan@shop.test").await;
    app.register_active("ola@shop.test").await;
    let (jan_access, _) = app.login("jan@shop.test", PASSWORD).await;
    let (_, ola_cookie) = app.login("ola@shop.test", PASSWORD).await;

    let response = app
        .send(with_refresh_cookie(
            "DELETE",
            "/api/auth/logout",
            &ola_cookie,
            Some(&jan_access),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Ola's session survives
    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &ola_cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset() {
    let app = spawn_app().await;
    let email = "jan@shop.test";
    let user_id = app.register_active(email).await;
    let (_, old_cookie) = app.login(email, PASSWORD).await;

    let response = app
        .json(
            "POST",
            "/api/auth/forgot-password",
            None,
            &json!({ "email": "nobody@shop.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.mailer.reset_token("nobody@shop.test").await.is_none());

    let response = app
        .json("POST", "/api/auth/forgot-password", None, &json!({ "email": email }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = app.mailer.reset_token(email).await.unwrap();

    let reset = json!({ "token": token, "password": "brand-new-1" });
    let response = app
        .json("POST", "/api/auth/reset-password", None, &reset)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Sessions opened with the old password are gone
    let now = chrono::Utc::now().timestamp();
    let active = app
        .state
        .store()
        .active_refresh_tokens(user_id, now)
        .await
        .unwrap();
    assert!(active.is_empty());
    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &old_cookie, None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The link is bound to the old password hash, so it only works once
    let response = app
        .json("POST", "/api/auth/reset-password", None, &reset)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.login(email, "brand-new-1").await;
    let response = app
        .json(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "email": email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = spawn_app().await;
    let (_, customer) = app.customer("jan@shop.test").await;
    let admin = app.admin().await;

    let response = app.get("/api/orders/statistics", Some(&customer)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/orders/statistics", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_orders"], 0);
}

#[tokio::test]
async fn test_active_sessions_are_capped() {
    let app = spawn_app().await;
    let user_id = app.register_active("jan@shop.test").await;

    let mut cookies = Vec::new();
    for _ in 0..4 {
        cookies.push(app.login("jan@shop.test", PASSWORD).await.1);
    }

    let now = chrono::Utc::now().timestamp();
    let active = app
        .state
        .store()
        .active_refresh_tokens(user_id, now)
        .await
        .unwrap();
    assert_eq!(active.len(), 3);

    // The newest session is always kept
    let response = app
        .send(with_refresh_cookie("POST", "/api/auth/refresh", &cookies[3], None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_tokens() {
    let app = spawn_app().await;
    let user_id = app.register_active("jan@shop.test").await;
    app.login("jan@shop.test", PASSWORD).await;

    let deleted = shopfront::services::scheduler::sweep_refresh_tokens(app.state.store())
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    let now = chrono::Utc::now().timestamp();
    let active = app
        .state
        .store()
        .active_refresh_tokens(user_id, now)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}
