mod common;

use axum::http::{StatusCode, header};
use common::{COLORS_JSON, Part, body_bytes, body_json, create_product, multipart_request, png_fixture, spawn_app};

#[tokio::test]
async fn test_create_and_read_product() {
    let app = spawn_app().await;
    let admin = app.admin().await;

    let png = png_fixture();
    let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            &admin,
            &[
                Part::Text("name", "Krzesło Dębowe, Classic"),
                Part::Text("en_name", "Oak Chair"),
                Part::Text("brand", "Woodworks"),
                Part::Text("code", "OC-1"),
                Part::Text("category", "chairs"),
                Part::Text("price", "499"),
                Part::Text("public", "true"),
                Part::Text("materials", r#"["wood","steel"]"#),
                Part::Text("colors", COLORS_JSON),
                Part::File("images", "front.png", &png),
                Part::File("images", "side.png", &png),
                Part::File("objFile", "chair.obj", obj),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let product = body_json(response).await["data"].clone();
    let id = product["id"].as_i64().unwrap();
    assert_eq!(product["url"], "krzesło-dębowe-classic");
    assert_eq!(product["images"].as_array().unwrap().len(), 2);
    assert_eq!(product["colors"].as_array().unwrap().len(), 2);
    assert_eq!(product["materials"], serde_json::json!(["wood", "steel"]));
    assert_eq!(product["has_model"], true);

    let response = app
        .get(&format!("/api/products/by-name/{}", "krzes%C5%82o-d%C4%99bowe-classic"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&format!("/api/products/image/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let response = app.get(&format!("/api/products/obj/{id}.obj"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "model/obj");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{id}.obj\"").as_str()
    );
    assert_eq!(body_bytes(response).await, obj.to_vec());
}

#[tokio::test]
async fn test_create_product_validation() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let png = png_fixture();

    // No images
    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            &admin,
            &[
                Part::Text("name", "Table"),
                Part::Text("en_name", "Table"),
                Part::Text("brand", "B"),
                Part::Text("code", "T"),
                Part::Text("category", "tables"),
                Part::Text("price", "100"),
                Part::Text("public", "true"),
                Part::Text("materials", r#"["wood"]"#),
                Part::Text("colors", COLORS_JSON),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Not an image
    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            &admin,
            &[
                Part::Text("name", "Table"),
                Part::Text("en_name", "Table"),
                Part::Text("brand", "B"),
                Part::Text("code", "T"),
                Part::Text("category", "tables"),
                Part::Text("price", "100"),
                Part::Text("public", "true"),
                Part::Text("materials", r#"["wood"]"#),
                Part::Text("colors", COLORS_JSON),
                Part::File("images", "a.png", b"definitely not a png"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    create_product(&app, &admin, "Table", "100").await;

    // Same name means the same url
    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            &admin,
            &[
                Part::Text("name", "table"),
                Part::Text("en_name", "Table"),
                Part::Text("brand", "B"),
                Part::Text("code", "T"),
                Part::Text("category", "tables"),
                Part::Text("price", "100"),
                Part::Text("public", "true"),
                Part::Text("materials", r#"["wood"]"#),
                Part::Text("colors", COLORS_JSON),
                Part::File("images", "a.png", &png),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_customers_cannot_manage_products() {
    let app = spawn_app().await;
    let (_, customer) = app.customer("jan@shop.test").await;

    let response = app
        .send(multipart_request(
            "POST",
            "/api/products",
            &customer,
            &[Part::Text("name", "Sneaky")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/products/admin", Some(&customer)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_listing_filters_and_paging() {
    let app = spawn_app().await;
    let admin = app.admin().await;

    create_product(&app, &admin, "Cheap Chair", "100").await;
    create_product(&app, &admin, "Mid Chair", "300").await;
    let hidden = create_product(&app, &admin, "Hidden Chair", "200").await;

    let response = app
        .send(multipart_request(
            "PUT",
            &format!("/api/products/{}", hidden["id"]),
            &admin,
            &[Part::Text("public", "false")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/products", None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 2);
    assert!(body["data"]["products"][0]["image"].is_string());

    let response = app.get("/api/products?min_price=200", None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 1);
    assert_eq!(body["data"]["products"][0]["name"], "Mid Chair");

    let response = app.get("/api/products?category=tables", None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 0);

    // Unknown categories are ignored rather than rejected
    let response = app.get("/api/products?category=spaceships", None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 2);

    let response = app.get("/api/products?page=1&limit=1", None).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["page_count"], 2);
    assert_eq!(body["data"]["products"].as_array().unwrap().len(), 1);

    let response = app.get("/api/products?limit=51", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/products?page=0", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/products/admin?limit=500", Some(&admin)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_count"], 3);
}

#[tokio::test]
async fn test_hidden_products_are_admin_only() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let product = create_product(&app, &admin, "Lamp", "80").await;
    let id = product["id"].as_i64().unwrap();

    let response = app
        .send(multipart_request(
            "PUT",
            &format!("/api/products/{id}"),
            &admin,
            &[Part::Text("public", "false"), Part::Text("price", "90")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["price"], 90);
    assert_eq!(body["data"]["images"].as_array().unwrap().len(), 1);

    let response = app.get("/api/products/by-name/lamp", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/api/products/image/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/api/products/by-id/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_reconciles_colors_and_delete() {
    let app = spawn_app().await;
    let admin = app.admin().await;
    let product = create_product(&app, &admin, "Sofa", "1500").await;
    let id = product["id"].as_i64().unwrap();
    let natural = product["colors"][0]["id"].as_i64().unwrap();

    let colors = format!(
        r##"[{{"_id":{natural},"name":"Natural","hex":"#c8a165","stock":9}},{{"name":"Grey","hex":"#888888","stock":2}}]"##
    );
    let response = app
        .send(multipart_request(
            "PUT",
            &format!("/api/products/{id}"),
            &admin,
            &[Part::Text("colors", &colors)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let colors = body["data"]["colors"].as_array().unwrap();
    assert_eq!(colors.len(), 2);
    assert!(colors.iter().any(|c| c["id"] == natural && c["stock"] == 9));
    assert!(colors.iter().any(|c| c["name"] == "Grey"));
    assert!(!colors.iter().any(|c| c["name"] == "Black"));

    let response = app.get(&format!("/api/products/obj/{id}.obj"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(
            axum::http::Request::builder()
                .method("DELETE")
                .uri(format!("/api/products/{id}"))
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&format!("/api/products/by-id/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
