//! Info document tests: content negotiation, canonical ids, and overrides.

use axum::http::StatusCode;

use iiif_server::{Constraint, ImageHandler};

use super::test_utils::{body_json, get, get_with_headers, router_with, test_router, write_test_png};

#[tokio::test]
async fn test_info_document_basics() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let info = body_json(response).await;
    assert_eq!(info["@context"], "http://iiif.io/api/image/2/context.json");
    assert_eq!(info["protocol"], "http://iiif.io/api/image");
    assert_eq!(info["width"], 64);
    assert_eq!(info["height"], 48);

    let profile = info["profile"].as_array().unwrap();
    assert_eq!(profile[0], "http://iiif.io/api/image/2/level2.json");
    let supports = profile[1]["supports"].as_array().unwrap();
    assert!(supports.iter().any(|s| s == "regionByPx"));
    assert!(supports.iter().any(|s| s == "mirroring"));
}

#[tokio::test]
async fn test_info_content_negotiation() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get_with_headers(
        &router,
        "/iiif/img1.png/info.json",
        &[("accept", "application/ld+json")],
    )
    .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/ld+json"
    );

    let response = get_with_headers(
        &router,
        "/iiif/img1.png/info.json",
        &[("accept", "text/html,application/xhtml+xml")],
    )
    .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_info_id_from_host_header() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get_with_headers(
        &router,
        "/iiif/img1.png/info.json",
        &[("host", "images.example.com")],
    )
    .await;
    let info = body_json(response).await;
    assert_eq!(info["@id"], "http://images.example.com/iiif/img1.png");
}

#[tokio::test]
async fn test_info_id_honors_forwarded_headers() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get_with_headers(
        &router,
        "/iiif/img1.png/info.json",
        &[
            ("host", "internal:8080"),
            ("x-forwarded-host", "public.example.com"),
            ("x-forwarded-proto", "https"),
        ],
    )
    .await;
    let info = body_json(response).await;
    assert_eq!(info["@id"], "https://public.example.com/iiif/img1.png");
}

#[tokio::test]
async fn test_info_id_uses_configured_base_url() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let handler = ImageHandler::new(dir.path(), "/iiif")
        .with_base_url(Some("https://cdn.example.com".to_string()));
    let router = router_with(handler);

    let response = get_with_headers(
        &router,
        "/iiif/img1.png/info.json",
        &[("x-forwarded-host", "other.example.com"), ("x-forwarded-proto", "http")],
    )
    .await;
    let info = body_json(response).await;
    assert_eq!(info["@id"], "https://cdn.example.com/iiif/img1.png");
}

#[tokio::test]
async fn test_info_advertises_tight_maximums() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let handler = ImageHandler::new(dir.path(), "/iiif")
        .with_maximums(Constraint { width: 32, height: 32, area: 0 });
    let router = router_with(handler);

    let response = get(&router, "/iiif/img1.png/info.json").await;
    let info = body_json(response).await;
    let profile = info["profile"].as_array().unwrap();
    assert_eq!(profile[1]["maxWidth"], 32);
    assert_eq!(profile[1]["maxHeight"], 32);
}

#[tokio::test]
async fn test_info_override_file_replaces_document() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    std::fs::write(
        dir.path().join("img1.png-info.json"),
        r#"{
            "@context": "http://iiif.io/api/image/2/context.json",
            "protocol": "http://iiif.io/api/image",
            "width": 9999,
            "height": 8888,
            "profile": ["http://iiif.io/api/image/2/level1.json", {"maxWidth": 16}]
        }"#,
    )
    .unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/info.json").await;
    let info = body_json(response).await;
    assert_eq!(info["width"], 9999);
    assert_eq!(info["height"], 8888);
    // The handler still stamps the canonical @id.
    assert!(info["@id"].as_str().unwrap().ends_with("/iiif/img1.png"));
}

#[tokio::test]
async fn test_info_override_constrains_commands() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    std::fs::write(
        dir.path().join("img1.png-info.json"),
        r#"{
            "@context": "http://iiif.io/api/image/2/context.json",
            "protocol": "http://iiif.io/api/image",
            "width": 64,
            "height": 48,
            "profile": ["http://iiif.io/api/image/2/level2.json", {"maxWidth": 16}]
        }"#,
    )
    .unwrap();
    // Disable the info cache so the override is consulted every request.
    let handler = ImageHandler::new(dir.path(), "/iiif").with_cache_capacities(0, 0);
    let router = router_with(handler);

    let response = get(&router, "/iiif/img1.png/full/32,/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    let response = get(&router, "/iiif/img1.png/full/16,/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unparseable_override_falls_back_to_generated() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    std::fs::write(dir.path().join("img1.png-info.json"), b"{ not json").unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["width"], 64);
}
