/// Fetcher tests against a local mock origin, plus the full sync pipeline over HTTP
mod common;

use common::{encode, source_image};
use image::{GenericImageView, ImageOutputFormat};
use image_resizer_service::cache::InMemoryImageCache;
use image_resizer_service::models::ResizeRequest;
use image_resizer_service::services::{HttpImageFetcher, ImageFetcher, ResizerService};
use image_resizer_service::ResizeError;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpImageFetcher {
    HttpImageFetcher::new(Duration::from_secs(5)).unwrap()
}

async fn origin_serving(route: &str, body: Vec<u8>, content_type: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_bytes(body),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_fetch_decodes_png() {
    let server = origin_serving(
        "/img.png",
        encode(&source_image(), ImageOutputFormat::Png),
        "image/png",
    )
    .await;

    let fetched = fetcher()
        .fetch(&format!("{}/img.png", server.uri()))
        .await
        .unwrap();

    assert_eq!(fetched.format, "png");
    assert_eq!(fetched.image.dimensions(), (64, 32));
}

#[tokio::test]
async fn test_fetch_reports_detected_format_not_declared_type() {
    // Declared as PNG, actually JPEG
    let server = origin_serving(
        "/img",
        encode(&source_image(), ImageOutputFormat::Jpeg(90)),
        "image/png",
    )
    .await;

    let fetched = fetcher()
        .fetch(&format!("{}/img", server.uri()))
        .await
        .unwrap();
    assert_eq!(fetched.format, "jpeg");
}

#[tokio::test]
async fn test_fetch_rejects_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&format!("{}/missing.jpg", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err, ResizeError::Fetch("bad status from origin: 404".into()));
}

#[tokio::test]
async fn test_fetch_accepts_any_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(203)
                .insert_header("content-type", "image/png")
                .set_body_bytes(encode(&source_image(), ImageOutputFormat::Png)),
        )
        .mount(&server)
        .await;

    assert!(fetcher().fetch(&server.uri()).await.is_ok());
}

#[tokio::test]
async fn test_fetch_rejects_non_image_content_type() {
    let server = origin_serving("/page", b"<html></html>".to_vec(), "text/html").await;

    let err = fetcher()
        .fetch(&format!("{}/page", server.uri()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("did not return an image"));
    assert!(err.to_string().contains("text/html"));
}

#[tokio::test]
async fn test_fetch_rejects_corrupt_body() {
    let server = origin_serving("/broken.jpg", b"not really a jpeg".to_vec(), "image/jpeg").await;

    let err = fetcher()
        .fetch(&format!("{}/broken.jpg", server.uri()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("decoding image failed"));
}

#[tokio::test]
async fn test_fetch_truncates_at_size_limit() {
    let body = encode(&source_image(), ImageOutputFormat::Png);
    let limit = body.len() / 2;
    let server = origin_serving("/big.png", body, "image/png").await;

    let err = fetcher()
        .with_max_body_bytes(limit)
        .fetch(&format!("{}/big.png", server.uri()))
        .await
        .unwrap_err();

    // Truncation surfaces as a decode failure
    assert!(err.to_string().contains("decoding image failed"));
}

#[tokio::test]
async fn test_fetch_reports_unreachable_origin() {
    let err = fetcher()
        .fetch("http://127.0.0.1:1/img.png")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("making HTTP request failed"));
}

#[tokio::test]
async fn test_fetch_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = HttpImageFetcher::new(Duration::from_millis(100))
        .unwrap()
        .fetch(&server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, ResizeError::Fetch(_)));
}

#[tokio::test]
async fn test_pipeline_over_http_fetches_once_then_serves_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(encode(&source_image(), ImageOutputFormat::Jpeg(90))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(InMemoryImageCache::default());
    let service = ResizerService::new(Arc::new(fetcher())).with_cache(cache.clone());
    let req = ResizeRequest::new(format!("{}/img.jpg", server.uri()), 100, 50);

    let first = service.get_resized(&req).await.unwrap();
    let second = service.get_resized(&req).await.unwrap();

    assert_eq!(first.mime_type, "image/jpeg");
    assert_eq!(first, second);
    assert_eq!(cache.writes(), 1);
    // MockServer verifies `expect(1)` on drop
}
