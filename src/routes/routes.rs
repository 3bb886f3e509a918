//! Defines routes for the preview service.
//!
//! ## Structure
//! - **Service endpoints**
//!   - `GET  /healthz`: liveness
//!   - `GET  /status`: readiness (test write against the bucket)
//!
//! - **Preview endpoints**
//!   - `HEAD /{source_id}/{checksum}`: existence check (ETag only)
//!   - `GET  /{source_id}/{checksum}`: preview metadata
//!   - `GET  /{source_id}/{checksum}/content`: preview content (honors If-None-Match)
//!   - `PUT  /{source_id}/{checksum}/content`: deposit content (honors Overwrite)

use crate::{
    handlers::{
        health_handlers::{healthz, service_status},
        preview_handlers::{
            check_preview_exists, deposit_preview, get_preview_content, get_preview_metadata,
        },
    },
    services::preview_store::PreviewStore,
};
use axum::{Router, routing::get};

/// Build and return the router for all preview routes.
///
/// The router carries the shared `PreviewStore` to all handlers.
pub fn routes() -> Router<PreviewStore> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(service_status))
        .route(
            "/{source_id}/{checksum}",
            get(get_preview_metadata).head(check_preview_exists),
        )
        .route(
            "/{source_id}/{checksum}/content",
            get(get_preview_content).put(deposit_preview),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_backend::InMemoryBackend;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const FOO_ETAG: &str = "\"ewrggAHdCT55M1uUfwKLEA==\"";

    fn app(backend: &InMemoryBackend) -> Router {
        routes().with_state(PreviewStore::new(Arc::new(backend.clone())))
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn deposit(body: &'static [u8], extra: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::PUT)
            .uri("/1234/foohash1==/content");
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn pdf_deposit(body: &'static [u8]) -> Request<Body> {
        deposit(body, &[("content-type", "application/pdf")])
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_ok_when_store_writable() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(&app, get("/status")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["iam"], "ok");
    }

    #[tokio::test]
    async fn status_unavailable_when_probe_fails() {
        let backend = InMemoryBackend::new("previews");
        backend.fail_writes();
        let response = send(&app(&backend), get("/status")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let backend = InMemoryBackend::new("previews");
        backend.fail_writes();
        let response = send(&app(&backend), get("/healthz")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deposit_requires_content_type() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(&app, deposit(b"foocontent", &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deposit_rejects_unsupported_content_type() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(
            &app,
            deposit(b"foocontent", &[("content-type", "text/plain")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deposit_ok() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(&app, pdf_deposit(b"foocontent")).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
        let data = json(response).await;
        assert_eq!(data["checksum"], "ewrggAHdCT55M1uUfwKLEA==");
        assert_eq!(data["size_bytes"], 10);
        assert!(data["added"].is_string());
    }

    #[tokio::test]
    async fn deposit_already_exists() {
        let app = app(&InMemoryBackend::new("previews"));
        send(&app, pdf_deposit(b"foocontent")).await;
        let response = send(&app, pdf_deposit(b"barcontent")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn deposit_already_exists_overwrite() {
        let app = app(&InMemoryBackend::new("previews"));
        send(&app, pdf_deposit(b"foocontent")).await;
        let response = send(
            &app,
            deposit(
                b"barcontent",
                &[("content-type", "application/pdf"), ("overwrite", "true")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, get("/1234/foohash1==")).await;
        assert_eq!(json(response).await["checksum"], "uW94u/u4xfDA3lcVd354ng==");
    }

    #[tokio::test]
    async fn deposit_with_wrong_content_md5_fails() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(
            &app,
            deposit(
                b"foocontent",
                &[
                    ("content-type", "application/pdf"),
                    ("content-md5", "uW94u/u4xfDA3lcVd354ng=="),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn retrieve_metadata() {
        let app = app(&InMemoryBackend::new("previews"));
        send(&app, pdf_deposit(b"foocontent")).await;

        let response = send(&app, get("/1234/foohash1==")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
        let data = json(response).await;
        assert_eq!(data["checksum"], "ewrggAHdCT55M1uUfwKLEA==");
        assert_eq!(data["size_bytes"], 10);
    }

    #[tokio::test]
    async fn retrieve_nonexistent_metadata() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(&app, get("/1234/foohash1==")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "No preview available");
    }

    #[tokio::test]
    async fn existence_check() {
        let app = app(&InMemoryBackend::new("previews"));
        let head = || {
            Request::builder()
                .method(Method::HEAD)
                .uri("/1234/foohash1==")
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(send(&app, head()).await.status(), StatusCode::NOT_FOUND);

        send(&app, pdf_deposit(b"foocontent")).await;
        let response = send(&app, head()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
    }

    #[tokio::test]
    async fn retrieve_content() {
        let app = app(&InMemoryBackend::new("previews"));
        send(&app, pdf_deposit(b"foocontent")).await;

        let response = send(&app, get("/1234/foohash1==/content")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"foocontent");
    }

    #[tokio::test]
    async fn retrieve_nonexistent_content() {
        let app = app(&InMemoryBackend::new("previews"));
        let response = send(&app, get("/1234/foohash1==/content")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retrieve_content_not_modified() {
        let backend = InMemoryBackend::new("previews");
        let app = app(&backend);
        send(&app, pdf_deposit(b"foocontent")).await;

        let request = Request::builder()
            .uri("/1234/foohash1==/content")
            .header(header::IF_NONE_MATCH, FOO_ETAG)
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
        assert_eq!(backend.get_calls(), 0);
    }

    #[tokio::test]
    async fn retrieve_content_with_stale_tag() {
        let app = app(&InMemoryBackend::new("previews"));
        send(&app, pdf_deposit(b"foocontent")).await;

        let request = Request::builder()
            .uri("/1234/foohash1==/content")
            .header(header::IF_NONE_MATCH, "\"uW94u/u4xfDA3lcVd354ng==\"")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ETAG], FOO_ETAG);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"foocontent");
    }
}
