//! End-to-end command request tests: rendering, redirects, and errors.

use axum::http::StatusCode;
use image::GenericImageView;

use iiif_server::{Constraint, ImageHandler};

use super::test_utils::{
    body_bytes, body_json, get, is_valid_jpeg, is_valid_png, router_with, test_router,
    write_test_png,
};

// =============================================================================
// Rendering
// =============================================================================

#[tokio::test]
async fn test_full_max_renders_native_size() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/full/max/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert!(response.headers().contains_key("last-modified"));

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[tokio::test]
async fn test_square_gray_png() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/square/24,/0/gray.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (24, 24));
    assert_eq!(decoded.color(), image::ColorType::L8);
}

#[tokio::test]
async fn test_percent_region_best_fit_rotated_bitonal() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    // Central half of the source, fitted into 20x20, rotated 90 degrees.
    let response = get(
        &router,
        "/iiif/img1.png/pct:25,25,50,50/!20,20/90/bitonal.png",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let decoded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert!(decoded.width() <= 20 && decoded.height() <= 20);
    for pixel in decoded.to_luma8().pixels() {
        assert!(pixel[0] == 0 || pixel[0] == 255);
    }
}

#[tokio::test]
async fn test_rotation_swaps_output_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/full/max/270/default.png").await;
    let decoded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (48, 64));
}

#[tokio::test]
async fn test_exact_size_ignores_aspect() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/full/10,40/0/default.png").await;
    let decoded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (10, 40));
}

#[tokio::test]
async fn test_pixel_region_extraction() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/8,4,16,12/max/0/default.png").await;
    let decoded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 12));

    // Top-left of the crop is source pixel (8, 4): r = 8*3, g = 4*5.
    let pixel = decoded.to_rgb8().get_pixel(0, 0).0;
    assert_eq!(pixel, [24, 20, 12]);
}

// =============================================================================
// Redirects and errors
// =============================================================================

#[tokio::test]
async fn test_bare_identifier_redirects_to_info() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "/iiif/img1.png/info.json"
    );
}

#[tokio::test]
async fn test_unknown_bare_identifier_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/missing.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "invalid_request");
}

#[tokio::test]
async fn test_missing_image_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/missing.png/full/max/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"], "not_found");
}

#[tokio::test]
async fn test_malformed_command_is_400() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/full/max/45/default.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unadvertised_format_is_501() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/img1.png/full/max/0/default.pdf").await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let error = body_json(response).await;
    assert_eq!(error["error"], "unsupported_feature");
}

#[tokio::test]
async fn test_output_over_maximums_is_501() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let handler = ImageHandler::new(dir.path(), "/iiif")
        .with_maximums(Constraint { width: 100, height: 100, area: 0 });
    let router = router_with(handler);

    let response = get(&router, "/iiif/img1.png/full/128,/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let error = body_json(response).await;
    assert_eq!(error["error"], "dimensions_exceed_limits");

    // Within the limit the request still works.
    let response = get(&router, "/iiif/img1.png/full/96,/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_image_beats_unsupported_format() {
    // An override file makes the info path succeed without touching the
    // image, but a command against the absent file must still be a 404, not
    // a 501 for the unadvertised format.
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ghost.png-info.json"),
        r#"{
            "@context": "http://iiif.io/api/image/2/context.json",
            "protocol": "http://iiif.io/api/image",
            "width": 64,
            "height": 48,
            "profile": ["http://iiif.io/api/image/2/level2.json", {}]
        }"#,
    )
    .unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/ghost.png/full/max/0/default.pdf").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"], "not_found");
}

#[tokio::test]
async fn test_unclaimed_suffix_is_415() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.bin"), b"not an image").unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/iiif/data.bin/full/max/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_cross_origin_command_request_allowed() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let response = super::test_utils::get_with_headers(
        &router,
        "/iiif/img1.png/full/32,/0/default.jpg",
        &[("origin", "https://viewer.example.com")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let router = test_router(dir.path());

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

// =============================================================================
// Tile cache behavior
// =============================================================================

#[tokio::test]
async fn test_repeat_small_jpeg_served_identically() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let router = test_router(dir.path());

    let uri = "/iiif/img1.png/full/32,/0/default.jpg";
    let first = body_bytes(get(&router, uri).await).await;
    let second = body_bytes(get(&router, uri).await).await;
    assert_eq!(first, second);
    assert!(is_valid_jpeg(&first));
}

#[tokio::test]
async fn test_disabled_caches_still_serve() {
    let dir = tempfile::tempdir().unwrap();
    write_test_png(dir.path(), "img1.png", 64, 48);
    let handler = ImageHandler::new(dir.path(), "/iiif").with_cache_capacities(0, 0);
    let router = router_with(handler);

    let response = get(&router, "/iiif/img1.png/full/32,/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = get(&router, "/iiif/img1.png/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
}
