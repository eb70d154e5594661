//! HTTP service tests
//!
//! Full requests over TCP against the server, rendering through mock browsers.

mod common;

use std::sync::Arc;

use common::{fast_defaults, start_http_server};
use webrender::cdp::mock::{MockBehavior, MockBrowserLauncher, MOCK_PDF, MOCK_PNG};
use webrender::render::RenderDefaults;

#[tokio::test]
async fn test_healthcheck_and_not_found() {
    let launcher = Arc::new(MockBrowserLauncher::new());
    let (base, _server, shutdown) = start_http_server(launcher, fast_defaults()).await;

    let health = reqwest::get(format!("{}/healthcheck", base)).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "OK");

    let missing = reqwest::get(format!("{}/nope", base)).await.unwrap();
    assert_eq!(missing.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_render_png_over_get() {
    let launcher = Arc::new(MockBrowserLauncher::new());
    let (base, server, shutdown) = start_http_server(launcher.clone(), fast_defaults()).await;

    let url = format!(
        "{}/image?url={}&width=1024&height=768&timeout=5",
        base,
        urlencoding::encode("https://example.com/?a=1&b=2")
    );
    let response = reqwest::get(url).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().as_ref(), MOCK_PNG);

    let page = launcher.last_page().unwrap();
    assert!(page.called("navigate:https://example.com/?a=1&b=2"));
    assert_eq!(launcher.live_browsers(), 0);
    assert_eq!(server.metrics().requests("image"), 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_render_pdf_over_post_with_headers() {
    let launcher = Arc::new(MockBrowserLauncher::new());
    let (base, _server, shutdown) = start_http_server(launcher.clone(), fast_defaults()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/image", base))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("url=https%3A%2F%2Fexample.com&asPDF=true&headers[Authorization]=Bearer%20t")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF"));
    assert_eq!(body.as_ref(), MOCK_PDF);

    let calls = launcher.last_page().unwrap().calls();
    assert_eq!(calls[0], "enable_domain:Network");
    assert_eq!(calls[1], "set_extra_headers:Authorization");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_failures_answer_500_and_count_errors() {
    let launcher = Arc::new(MockBrowserLauncher::with_behavior(MockBehavior {
        navigation_error: Some("net::ERR_CONNECTION_REFUSED".to_string()),
        ..MockBehavior::default()
    }));
    let (base, server, shutdown) = start_http_server(launcher.clone(), fast_defaults()).await;

    let failed = reqwest::get(format!("{}/image?url=https://down.example", base)).await.unwrap();
    assert_eq!(failed.status(), 500);
    assert!(failed.text().await.unwrap().contains("ERR_CONNECTION_REFUSED"));

    let invalid = reqwest::get(format!("{}/image?url=not-a-url", base)).await.unwrap();
    assert_eq!(invalid.status(), 500);

    assert_eq!(server.metrics().requests("image"), 2);
    assert_eq!(server.metrics().errors("image"), 2);
    assert_eq!(launcher.launches(), 1, "an invalid request never launches a browser");
    assert_eq!(launcher.live_browsers(), 0);

    let metrics = reqwest::get(format!("{}/metrics", base)).await.unwrap().text().await.unwrap();
    assert!(metrics.contains("webrender_errors_total{channel=\"image\"} 2"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_hanging_page_answers_from_fallback() {
    let launcher = Arc::new(MockBrowserLauncher::with_behavior(MockBehavior {
        hang_navigation: true,
        ..MockBehavior::default()
    }));
    let defaults = RenderDefaults {
        timeout: 1,
        ..fast_defaults()
    };
    let (base, _server, shutdown) = start_http_server(launcher.clone(), defaults).await;

    let started = std::time::Instant::now();
    let response = reqwest::get(format!("{}/image?url=https://slow.example", base)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), MOCK_PNG);
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert_eq!(launcher.live_browsers(), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_concurrent_requests_use_separate_browsers() {
    let launcher = Arc::new(MockBrowserLauncher::new());
    let (base, _server, shutdown) = start_http_server(launcher.clone(), fast_defaults()).await;

    let requests = (0..4).map(|i| reqwest::get(format!("{}/image?url=https://site{}.example", base, i)));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 200);
    }
    assert_eq!(launcher.launches(), 4);
    assert_eq!(launcher.live_browsers(), 0);

    let _ = shutdown.send(());
}
