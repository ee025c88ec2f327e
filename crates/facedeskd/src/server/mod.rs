mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use self::state::*;

/// Build the HTTP application. Unrouted paths fall through to the static
/// directory.
pub fn create_app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let assets = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(api::index_handler))
        .route("/register", get(api::register_handler))
        .route("/real-time-face-recognition", get(api::recognition_page_handler))
        .route("/get-labeled-faces", get(api::labeled_faces_handler))
        .route("/upload", post(api::upload_handler))
        .route("/send-sms", post(api::send_sms_handler))
        .route("/rebuild", post(api::rebuild_handler))
        .route("/recognize", post(api::recognize_handler))
        .route("/status", get(api::status_handler))
        .fallback_service(assets)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{fake, EngineHandle};
    use crate::registry::{RegistryBuilder, RegistryService};
    use crate::sms::{self, SmsClient, SmsConfig};
    use crate::store::ImageStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use std::path::Path;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facedesk-test-boundary";

    fn state(root: &Path, engine: EngineHandle, sms: SmsConfig) -> Arc<AppState> {
        state_with_refresh(root, engine, sms, false)
    }

    fn state_with_refresh(
        root: &Path,
        engine: EngineHandle,
        sms: SmsConfig,
        refresh_on_upload: bool,
    ) -> Arc<AppState> {
        let static_dir = root.join("public");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(static_dir.join("register.html"), "<h1>register</h1>").unwrap();
        std::fs::write(static_dir.join("real_time_face_recognition.html"), "<h1>live</h1>").unwrap();
        std::fs::write(static_dir.join("app.js"), "console.log('hi');").unwrap();

        let store = ImageStore::new(static_dir.join("uploads"));
        let registry = RegistryService::new(RegistryBuilder::new(store.clone(), engine.clone()));
        Arc::new(AppState {
            store,
            registry,
            engine,
            sms: SmsClient::new(sms).unwrap(),
            static_dir,
            match_threshold: 0.5,
            refresh_on_upload,
        })
    }

    fn app(state: &Arc<AppState>) -> Router {
        create_app(Arc::clone(state), 1024 * 1024)
    }

    fn multipart(bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, bytes: &[u8]) -> Request<Body> {
        let body = multipart(bytes);
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn sms_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send-sms")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"to":"+15552223333","message":"hello"}"#))
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        serde_json::from_str(&text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_labeled_faces_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, calls) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        let response = app(&state).oneshot(get_request("/get-labeled-faces")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!([]));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_stores_image() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        let response = app(&state)
            .oneshot(upload_request("/upload?label=alice", &fake::png([255, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "Image uploaded");

        let images = state.store.images("alice").await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(std::fs::read(&images[0]).unwrap(), fake::png([255, 0, 0]));
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        for uri in ["/upload?label=..%2Fx", "/upload?label=", "/upload"] {
            let response = app(&state)
                .oneshot(upload_request(uri, &fake::png([255, 0, 0])))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(text(response).await, "Invalid label");
        }
        assert!(state.store.labels().await.unwrap().is_empty());
        assert!(!tmp.path().join("public/x").exists());
    }

    #[tokio::test]
    async fn test_upload_over_limit_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        let response = create_app(Arc::clone(&state), 64)
            .oneshot(upload_request("/upload?label=alice", &vec![0u8; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.store.labels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pages_served() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        for (uri, body) in [("/", "<h1>home</h1>"), ("/register", "<h1>register</h1>")] {
            let response = app(&state).oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(text(response).await, body);
        }

        let response = app(&state).oneshot(get_request("/app.js")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "console.log('hi');");
    }

    #[tokio::test]
    async fn test_missing_page_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());
        std::fs::remove_file(state.static_dir.join("register.html")).unwrap();

        let response = app(&state).oneshot(get_request("/register")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recognition_page_builds_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(2, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());
        let alice = facedesk_core::Label::parse("alice").unwrap();
        state.store.save(&alice, &fake::png([255, 0, 0])).await.unwrap();
        state.store.save(&alice, &fake::png([10, 10, 10])).await.unwrap();

        let response = app(&state)
            .oneshot(get_request("/real-time-face-recognition"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "<h1>live</h1>");

        let response = app(&state).oneshot(get_request("/get-labeled-faces")).await.unwrap();
        assert_eq!(
            json(response).await,
            serde_json::json!([{"label": "alice", "descriptors": [[1.0, 0.0, 0.0]]}])
        );
    }

    #[tokio::test]
    async fn test_recognition_page_served_when_build_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(
            tmp.path(),
            EngineHandle::unavailable("no models"),
            SmsConfig::default(),
        );
        let alice = facedesk_core::Label::parse("alice").unwrap();
        state.store.save(&alice, &fake::png([255, 0, 0])).await.unwrap();

        let response = app(&state)
            .oneshot(get_request("/real-time-face-recognition"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.registry.is_cached().await);
    }

    #[tokio::test]
    async fn test_recognize_matches_and_rejects() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(2, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());
        let alice = facedesk_core::Label::parse("alice").unwrap();
        state.store.save(&alice, &fake::png([255, 0, 0])).await.unwrap();

        let response = app(&state)
            .oneshot(upload_request("/recognize", &fake::png([255, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["label"], "alice");
        assert_eq!(body["matched"], true);

        let response = app(&state)
            .oneshot(upload_request("/recognize", &fake::png([255, 255, 255])))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["matched"], false);
        assert_eq!(body["label"], "unknown");

        let response = app(&state)
            .oneshot(upload_request("/recognize", &fake::png([0, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app(&state)
            .oneshot(upload_request("/recognize", b"garbage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recognize_with_nothing_enrolled() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        let response = app(&state)
            .oneshot(upload_request("/recognize", &fake::png([255, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"matched": false, "label": "unknown", "distance": null})
        );
    }

    async fn labels_after_page_visit(state: &Arc<AppState>) -> Vec<String> {
        let response = app(state)
            .oneshot(get_request("/real-time-face-recognition"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        state
            .registry
            .snapshot()
            .await
            .entries()
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_upload_refreshes_registry_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(2, 0);
        let state = state_with_refresh(tmp.path(), engine, SmsConfig::default(), true);
        let alice = facedesk_core::Label::parse("alice").unwrap();
        state.store.save(&alice, &fake::png([255, 0, 0])).await.unwrap();
        assert_eq!(labels_after_page_visit(&state).await, vec!["alice"]);

        let response = app(&state)
            .oneshot(upload_request("/upload?label=bob", &fake::png([200, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.registry.is_cached().await);

        assert_eq!(labels_after_page_visit(&state).await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_upload_keeps_cached_registry_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(2, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());
        let alice = facedesk_core::Label::parse("alice").unwrap();
        state.store.save(&alice, &fake::png([255, 0, 0])).await.unwrap();
        assert_eq!(labels_after_page_visit(&state).await, vec!["alice"]);

        let response = app(&state)
            .oneshot(upload_request("/upload?label=bob", &fake::png([200, 0, 0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.registry.is_cached().await);

        assert_eq!(labels_after_page_visit(&state).await, vec!["alice"]);
        assert_eq!(state.store.labels().await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_rebuild_and_status() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(2, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());
        let bob = facedesk_core::Label::parse("bob").unwrap();
        state.store.save(&bob, &fake::png([200, 0, 0])).await.unwrap();
        state.store.save(&bob, &fake::png([255, 0, 0])).await.unwrap();

        let response = app(&state).oneshot(get_request("/status")).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["cached"], false);
        assert_eq!(body["models_loaded"], true);
        assert_eq!(body["engine_workers"], 2);
        assert_eq!(body["sms_configured"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/rebuild")
            .body(Body::empty())
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!({"labels": 1, "descriptors": 2}));

        let response = app(&state).oneshot(get_request("/status")).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["cached"], true);
        assert_eq!(body["labels"], 1);
    }

    #[tokio::test]
    async fn test_send_sms_without_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = fake::engine(1, 0);
        let state = state(tmp.path(), engine, SmsConfig::default());

        let response = app(&state).oneshot(sms_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text(response).await, "Error sending SMS");
    }

    #[tokio::test]
    async fn test_send_sms_through_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let base = sms::tests::spawn_fake_provider().await;

        let (engine, _) = fake::engine(1, 0);
        let ok = state(&tmp.path().join("ok"), engine, sms::tests::config(&base, "secret"));
        let response = app(&ok).oneshot(sms_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "SMS sent successfully");

        let (engine, _) = fake::engine(1, 0);
        let bad = state(&tmp.path().join("bad"), engine, sms::tests::config(&base, "wrong"));
        let response = app(&bad).oneshot(sms_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text(response).await, "Error sending SMS");
    }
}
