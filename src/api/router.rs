//! HTTP router.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Access logger → 3. Body limit → Handler

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Headroom over the image limit for multipart boundaries and text fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the service router from a pre-constructed `ApiContext`.
pub fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = middleware::cors::cors_layer(&ctx.config.cors);

    Router::new()
        .route("/", get(endpoints::health::root))
        .route("/health", get(endpoints::health::check))
        .route(
            "/api/analyze",
            get(endpoints::analyze::usage).post(endpoints::analyze::analyze),
        )
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::signal::SignalVocabulary;
    use crate::test_support::TINY_PNG;
    use crate::upstream::mock::MockUpstream;
    use crate::upstream::UpstreamError;

    const BOUNDARY: &str = "chart-signal-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            file_name: &'a str,
            content_type: &'a str,
            bytes: &'a [u8],
        },
    }

    fn png_part(bytes: &[u8]) -> Part<'_> {
        Part::File {
            name: "image",
            file_name: "chart.png",
            content_type: "image/png",
            bytes,
        }
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn app_with(config: ServiceConfig, upstream: Arc<MockUpstream>) -> Router {
        build_router(ApiContext::new(Arc::new(config), upstream))
    }

    fn app(upstream: Arc<MockUpstream>) -> Router {
        app_with(ServiceConfig::default(), upstream)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── analyze: validation ──────────────────────────────────

    #[tokio::test]
    async fn missing_image_is_400_without_upstream_call() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app(upstream.clone())
            .oneshot(analyze_request(&[Part::Text("asset", "EURUSD")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], "VALIDATION");
        assert!(json["error"].as_str().unwrap().contains("missing file"));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn non_multipart_body_is_400() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(upstream.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn non_image_upload_is_400() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app(upstream.clone())
            .oneshot(analyze_request(&[Part::File {
                name: "image",
                file_name: "notes.txt",
                content_type: "text/plain",
                bytes: b"definitely not a chart",
            }]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn text_labelled_as_png_is_400() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app(upstream.clone())
            .oneshot(analyze_request(&[Part::File {
                name: "image",
                file_name: "chart.png",
                content_type: "image/png",
                bytes: b"definitely not a chart",
            }]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn image_over_limit_is_413() {
        let config = ServiceConfig {
            max_upload_bytes: 1024,
            ..ServiceConfig::default()
        };
        let mut big = TINY_PNG.to_vec();
        big.resize(4 * 1024, 0);

        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app_with(config, upstream.clone())
            .oneshot(analyze_request(&[png_part(&big)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn body_over_layer_limit_is_413() {
        let config = ServiceConfig {
            max_upload_bytes: 1024,
            ..ServiceConfig::default()
        };
        let mut huge = TINY_PNG.to_vec();
        huge.resize(256 * 1024, 0);

        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app_with(config, upstream.clone())
            .oneshot(analyze_request(&[png_part(&huge)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn bad_duration_is_400() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let response = app(upstream.clone())
            .oneshot(analyze_request(&[
                png_part(TINY_PNG),
                Part::Text("durationSeconds", "soon"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
    }

    // ── analyze: hosted model path ───────────────────────────

    #[tokio::test]
    async fn confident_reply_is_flat_200() {
        let upstream = Arc::new(MockUpstream::model_text(
            "```json\n{\"sinal\":\"COMPRA\",\"confianca\":\"85%\",\"resumo\":\"Uptrend\",\"assetType\":\"forex\"}\n```",
        ));
        let response = app(upstream.clone())
            .oneshot(analyze_request(&[
                Part::File {
                    name: "grafico",
                    file_name: "chart.png",
                    content_type: "image/png",
                    bytes: TINY_PNG,
                },
                Part::Text("ativo", " eurusd "),
                Part::Text("duracao", "120"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["signal"], "BUY");
        assert_eq!(json["confidence"], 85);
        assert_eq!(json["summary"], "Uptrend");
        assert_eq!(json["assetType"], "FOREX");
        assert_eq!(json["durationSeconds"], 120);
        assert_eq!(json["asset"], "EURUSD");
        assert_eq!(json["degraded"], false);
        assert!(json.get("raw").is_none());

        assert_eq!(upstream.calls(), 1);
        let seen = upstream.last_request().unwrap();
        assert_eq!(seen.asset.as_deref(), Some("EURUSD"));
        assert_eq!(seen.duration_seconds, 120);
        assert_eq!(seen.mime_type, "image/png");
        assert_eq!(seen.image_bytes, TINY_PNG);
    }

    #[tokio::test]
    async fn prose_reply_is_degraded_200_with_raw() {
        let upstream = Arc::new(MockUpstream::model_text(
            "The chart looks bullish to me, momentum is building.",
        ));
        let response = app(upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["signal"], "BUY");
        assert_eq!(json["confidence"], 30);
        assert_eq!(json["degraded"], true);
        assert!(json["raw"].as_str().unwrap().contains("bullish"));
        assert_eq!(json["durationSeconds"], 90);
    }

    #[tokio::test]
    async fn binary_mode_never_answers_neutral() {
        let config = ServiceConfig {
            vocabulary: SignalVocabulary::Binary,
            ..ServiceConfig::default()
        };
        let upstream = Arc::new(MockUpstream::model_text(
            r#"{"signal":"NEUTRAL","confidence":50}"#,
        ));
        let response = app_with(config, upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_ne!(json["signal"], "NEUTRAL");
        assert_eq!(json["degraded"], true);
    }

    #[tokio::test]
    async fn slow_upstream_is_504() {
        let config = ServiceConfig {
            upstream_timeout: Duration::from_millis(100),
            ..ServiceConfig::default()
        };
        let upstream = Arc::new(
            MockUpstream::model_text(r#"{"signal":"BUY"}"#).delayed(Duration::from_secs(5)),
        );
        let started = std::time::Instant::now();
        let response = app_with(config, upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["code"], "UPSTREAM_TIMEOUT");
    }

    #[tokio::test]
    async fn upstream_rate_limit_is_429_with_retry_after() {
        let upstream = Arc::new(MockUpstream::failing(|| UpstreamError::RateLimited {
            retry_after: Some(15),
        }));
        let response = app(upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "15");
    }

    #[tokio::test]
    async fn missing_credential_is_500_not_configured() {
        let upstream = Arc::new(MockUpstream::failing(|| {
            UpstreamError::NotConfigured("OPENAI_API_KEY is missing")
        }));
        let response = app(upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "NOT_CONFIGURED");
    }

    // ── analyze: proxy path ──────────────────────────────────

    #[tokio::test]
    async fn proxy_without_json_is_502() {
        let upstream = Arc::new(MockUpstream::proxy_body("<html>502 Bad Gateway</html>"));
        let response = app(upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(response).await;
        assert_eq!(json["code"], "BAD_UPSTREAM_RESPONSE");
        assert!(json["details"]["excerpt"].as_str().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn proxy_json_is_normalized() {
        let upstream = Arc::new(MockUpstream::proxy_body(
            r#"{"ok":true,"signal":"put","confidence":0.64,"summary":"Lower highs"}"#,
        ));
        let response = app(upstream)
            .oneshot(analyze_request(&[png_part(TINY_PNG)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["signal"], "SELL");
        assert_eq!(json["confidence"], 64);
        assert_eq!(json["degraded"], false);
    }

    // ── other routes ─────────────────────────────────────────

    #[tokio::test]
    async fn get_analyze_is_405_with_hint() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let request = Request::builder()
            .uri("/api/analyze")
            .body(Body::empty())
            .unwrap();
        let response = app(upstream).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let json = json_body(response).await;
        assert_eq!(json["code"], "USE_POST");
        assert_eq!(json["details"]["method"], "POST");
    }

    #[tokio::test]
    async fn health_reports_service_and_time() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(upstream.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["service"], "chart-signal");
        let time = json["time"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok());
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn root_reports_version() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app(upstream).oneshot(request).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/analyze")
            .header("origin", "https://app.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app(upstream).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let methods = response
            .headers()
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
    }

    #[tokio::test]
    async fn cors_list_echoes_only_known_origins() {
        let config = ServiceConfig {
            cors: crate::config::CorsPolicy::List(vec!["https://app.example.com".into()]),
            ..ServiceConfig::default()
        };
        let upstream = Arc::new(MockUpstream::model_text("{}"));
        let router = app_with(config, upstream);

        let allowed = Request::builder()
            .uri("/health")
            .header("origin", "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example.com"
        );

        let other = Request::builder()
            .uri("/health")
            .header("origin", "https://evil.example.com")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(other).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
