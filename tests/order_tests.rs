mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{TestApp, WEBHOOK_SECRET, body_json, create_product, spawn_app};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

fn shipping() -> serde_json::Value {
    json!({
        "full_name": "Anna Nowak",
        "street": "Długa",
        "house_number": "12",
        "apartment_number": "4",
        "city": "Gdańsk",
        "zip_code": "80-001",
    })
}

fn sign(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

async fn send_webhook(app: &TestApp, event_type: &str, object: serde_json::Value) -> Response {
    let payload = json!({
        "id": "evt_test",
        "type": event_type,
        "data": { "object": object },
    })
    .to_string();
    let signature = sign(&payload, chrono::Utc::now().timestamp());

    app.send(
        Request::builder()
            .method("POST")
            .uri("/api/transactions/stripe/webhook")
            .header("stripe-signature", signature)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap(),
    )
    .await
}

async fn add_to_cart(app: &TestApp, token: &str, product: i64, color: i64, quantity: i32) -> Response {
    app.json(
        "PATCH",
        "/api/cart",
        Some(token),
        &json!({ "product_id": product, "color_id": color, "quantity": quantity }),
    )
    .await
}

#[tokio::test]
async fn test_cart_operations() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (_, customer) = app.customer("jan@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();
    let black = product["colors"][1]["id"].as_i64().unwrap();

    let response = app.get("/api/cart", Some(&customer)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["items"], json!([]));

    add_to_cart(&app, &customer, product_id, natural, 2).await;
    let response = add_to_cart(&app, &customer, product_id, natural, 1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(items[0]["name"], "Chair");
    assert_eq!(items[0]["color"], "Natural");

    let response = add_to_cart(&app, &customer, product_id, natural, 100).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["items"][0]["quantity"], 100);

    for quantity in [0, 101] {
        let response = add_to_cart(&app, &customer, product_id, black, quantity).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = add_to_cart(&app, &customer, product_id, 9999, 1).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = add_to_cart(&app, &customer, 9999, natural, 1).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let remove = |color: i64| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/cart/items/{product_id}/{color}"))
            .header(header::AUTHORIZATION, format!("Bearer {customer}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.send(remove(black)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(remove(natural)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["items"], json!([]));

    add_to_cart(&app, &customer, product_id, black, 1).await;
    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/api/cart")
                .header(header::AUTHORIZATION, format!("Bearer {customer}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/api/cart", Some(&customer)).await;
    assert_eq!(body_json(response).await["data"]["items"], json!([]));
}

#[tokio::test]
async fn test_checkout_payment_and_dispatch() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (user_id, customer) = app.customer("jan@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();

    let response = app.json("POST", "/api/orders", Some(&customer), &shipping()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    add_to_cart(&app, &customer, product_id, natural, 3).await;

    let mut invalid = shipping();
    invalid["zip_code"] = json!("");
    let response = app.json("POST", "/api/orders", Some(&customer), &invalid).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.json("POST", "/api/orders", Some(&customer), &shipping()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["url"], "https://checkout.test/pay/cs_test_1");

    {
        let requests = app.gateway.requests.lock().await;
        let request = &requests[0];
        assert_eq!(request.customer_email, "jan@shop.test");
        assert_eq!(request.client_reference_id, user_id.to_string());
        assert_eq!(request.line_items[0].name, "Chair (Natural)");
        assert_eq!(request.line_items[0].unit_amount, 10_000);
        assert_eq!(request.line_items[0].quantity, 3);
        assert_eq!(request.success_url, "http://shop.test/home");
        assert_eq!(request.cancel_url, "http://shop.test/store/checkout");
    }

    let response = app.get("/api/orders/all", Some(&customer)).await;
    let body = body_json(response).await;
    let order = body["data"][0].clone();
    let order_id = order["id"].as_i64().unwrap();
    assert_eq!(order["payment_status"], "PENDING");
    assert_eq!(order["delivery_status"], "NOT_DISPATCHED");
    assert_eq!(order["items"][0]["price_at_time_of_order"], 100);

    let dispatch = || {
        Request::builder()
            .method("PATCH")
            .uri(format!("/api/orders/dispatch/{order_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.send(dispatch()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let completed = json!({
        "id": "cs_test_1",
        "amount_total": 31_100,
        "currency": "pln",
        "payment_status": "paid",
    });
    let response = send_webhook(&app, "checkout.session.completed", completed.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["received"], true);

    // Redelivery is a no-op
    let response = send_webhook(&app, "checkout.session.completed", completed).await;
    assert_eq!(response.status(), StatusCode::OK);

    let transaction = app
        .state
        .store()
        .get_transaction_by_session("cs_test_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.order_id, i32::try_from(order_id).unwrap());
    assert_eq!(transaction.currency, "pln");

    let response = app
        .get(&format!("/api/orders/find-by-id/{order_id}"), Some(&customer))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["payment_status"], "COMPLETED");

    let response = app.get("/api/cart", Some(&customer)).await;
    assert_eq!(body_json(response).await["data"]["items"], json!([]));

    let response = app
        .get(&format!("/api/products/by-id/{product_id}"), None)
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["colors"][0]["stock"], 2);

    let response = app
        .get(&format!("/api/transactions/{user_id}"), Some(&customer))
        .await;
    let body = body_json(response).await;
    let transactions = body["data"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["amount"], 31_100);
    assert_eq!(transactions[0]["session_id"], "cs_test_1");

    let response = app.send(dispatch()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["delivery_status"], "DISPATCHED");
    let response = app.send(dispatch()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/orders/statistics", Some(&admin)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["completed"], 1);
    assert_eq!(body["data"]["dispatched"], 1);
    assert_eq!(body["data"]["revenue"], 31_100);

    let response = app.get("/api/orders/for-admin?page=1&limit=10", Some(&admin)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 1);
    assert_eq!(body["data"]["page_count"], 1);
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (owner_id, owner) = app.customer("jan@shop.test").await;
    let (_, other) = app.customer("ola@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();
    add_to_cart(&app, &owner, product_id, natural, 1).await;
    app.json("POST", "/api/orders", Some(&owner), &shipping()).await;

    let response = app.get("/api/orders/all", Some(&owner)).await;
    let order_id = body_json(response).await["data"][0]["id"].as_i64().unwrap();

    let uri = format!("/api/orders/find-by-id/{order_id}");
    assert_eq!(app.get(&uri, Some(&other)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get(&uri, Some(&admin)).await.status(), StatusCode::OK);

    let uri = format!("/api/transactions/{owner_id}");
    assert_eq!(app.get(&uri, Some(&other)).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.get(&uri, Some(&admin)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_rejects_stock_shortfall() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (_, customer) = app.customer("jan@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let black = product["colors"][1]["id"].as_i64().unwrap();

    add_to_cart(&app, &customer, product_id, black, 2).await;

    let response = app.json("POST", "/api/orders", Some(&customer), &shipping()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.gateway.requests.lock().await.is_empty());
}

#[tokio::test]
async fn test_webhook_signature_and_expiry() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (_, customer) = app.customer("jan@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();
    add_to_cart(&app, &customer, product_id, natural, 1).await;
    app.json("POST", "/api/orders", Some(&customer), &shipping()).await;

    let payload = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_1" } },
    })
    .to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/transactions/stripe/webhook")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(unsigned).await.status(), StatusCode::BAD_REQUEST);

    let stale = Request::builder()
        .method("POST")
        .uri("/api/transactions/stripe/webhook")
        .header("stripe-signature", sign(&payload, chrono::Utc::now().timestamp() - 3600))
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(stale).await.status(), StatusCode::BAD_REQUEST);

    let tampered = Request::builder()
        .method("POST")
        .uri("/api/transactions/stripe/webhook")
        .header("stripe-signature", sign(&payload, chrono::Utc::now().timestamp()))
        .body(Body::from(payload.replace("cs_test_1", "cs_test_2")))
        .unwrap();
    assert_eq!(app.send(tampered).await.status(), StatusCode::BAD_REQUEST);

    let extreme = Request::builder()
        .method("POST")
        .uri("/api/transactions/stripe/webhook")
        .header("stripe-signature", "t=-9223372036854775808,v1=00")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(extreme).await.status(), StatusCode::BAD_REQUEST);

    let far_future = Request::builder()
        .method("POST")
        .uri("/api/transactions/stripe/webhook")
        .header("stripe-signature", sign(&payload, i64::MAX))
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(far_future).await.status(), StatusCode::BAD_REQUEST);

    // The server is still up
    let response = app.get("/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_webhook(&app, "checkout.session.expired", json!({ "id": "cs_test_1" })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/orders/all", Some(&customer)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"][0]["payment_status"], "CANCELED");

    // A canceled order is never completed afterwards
    let response = send_webhook(&app, "checkout.session.completed", json!({ "id": "cs_test_1" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/api/orders/all", Some(&customer)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"][0]["payment_status"], "CANCELED");

    // Unknown sessions and unrelated events are acknowledged
    let response = send_webhook(
        &app,
        "checkout.session.completed",
        json!({ "id": "cs_missing", "payment_status": "paid" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send_webhook(&app, "invoice.paid", json!({ "id": "in_1" })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn order_status(app: &TestApp, token: &str) -> serde_json::Value {
    let response = app.get("/api/orders/all", Some(token)).await;
    body_json(response).await["data"][0]["payment_status"].clone()
}

async fn color_stock(app: &TestApp, product_id: i64) -> (serde_json::Value, serde_json::Value) {
    let response = app
        .get(&format!("/api/products/by-id/{product_id}"), None)
        .await;
    let body = body_json(response).await;
    (
        body["data"]["colors"][0]["stock"].clone(),
        body["data"]["colors"][1]["stock"].clone(),
    )
}

#[tokio::test]
async fn test_paid_order_with_short_line_still_decrements_others() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (_, first) = app.customer("jan@shop.test").await;
    let (_, second) = app.customer("ola@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();
    let black = product["colors"][1]["id"].as_i64().unwrap();

    add_to_cart(&app, &first, product_id, natural, 2).await;
    add_to_cart(&app, &first, product_id, black, 1).await;
    let response = app.json("POST", "/api/orders", Some(&first), &shipping()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    add_to_cart(&app, &second, product_id, black, 1).await;
    let response = app.json("POST", "/api/orders", Some(&second), &shipping()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The second buyer pays first and takes the last black chair
    for session in ["cs_test_2", "cs_test_1"] {
        let response = send_webhook(
            &app,
            "checkout.session.completed",
            json!({ "id": session, "payment_status": "paid" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(order_status(&app, &first).await, "COMPLETED");
    assert_eq!(order_status(&app, &second).await, "COMPLETED");
    assert_eq!(color_stock(&app, product_id).await, (json!(3), json!(0)));
}

#[tokio::test]
async fn test_unpaid_checkout_waits_for_async_payment() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let (user_id, first) = app.customer("jan@shop.test").await;
    let (_, second) = app.customer("ola@shop.test").await;

    let product = create_product(&app, &admin, "Chair", "100").await;
    let product_id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();

    add_to_cart(&app, &first, product_id, natural, 2).await;
    app.json("POST", "/api/orders", Some(&first), &shipping()).await;
    add_to_cart(&app, &second, product_id, natural, 1).await;
    app.json("POST", "/api/orders", Some(&second), &shipping()).await;

    for (session, user) in [("cs_test_1", &first), ("cs_test_2", &second)] {
        let response = send_webhook(
            &app,
            "checkout.session.completed",
            json!({ "id": session, "payment_status": "unpaid" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(order_status(&app, user).await, "PENDING");
    }

    assert!(
        app.state
            .store()
            .get_transaction_by_session("cs_test_1")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(color_stock(&app, product_id).await, (json!(5), json!(1)));
    let response = app.get("/api/cart", Some(&first)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let response = send_webhook(
        &app,
        "checkout.session.async_payment_succeeded",
        json!({ "id": "cs_test_1", "amount_total": 21_100, "payment_status": "paid" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&app, &first).await, "COMPLETED");
    assert_eq!(color_stock(&app, product_id).await, (json!(3), json!(1)));

    let response = app
        .get(&format!("/api/transactions/{user_id}"), Some(&first))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"][0]["amount"], 21_100);

    let response = send_webhook(
        &app,
        "checkout.session.async_payment_failed",
        json!({ "id": "cs_test_2", "payment_status": "unpaid" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&app, &second).await, "CANCELED");
}
