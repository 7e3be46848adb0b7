//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use spool_core::ArtifactId;
use spool_core::config::AppConfig;
use spool_server::{AppState, create_router};
use spool_storage::{ArtifactMeta, ContentStore, FilesystemStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub store_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store_path = temp_dir.path().join("mp3");

        let mut config = AppConfig::for_testing(&store_path);
        modifier(&mut config);

        let store: Arc<dyn ContentStore> = Arc::new(
            FilesystemStore::new(&config.storage.path)
                .await
                .expect("Failed to create artifact store"),
        );

        let state = AppState::new(config, store).expect("Test config should be valid");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            store_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn store(&self) -> Arc<dyn ContentStore> {
        self.state.store.clone()
    }

    /// Store an artifact directly, bypassing HTTP.
    pub async fn seed(&self, id: &str, data: Bytes) -> ArtifactMeta {
        let id = ArtifactId::parse(id).expect("test id should be valid");
        *self
            .state
            .store
            .put_bytes(&id, data)
            .await
            .expect("Failed to seed artifact")
            .meta()
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// `GET uri` with optional extra headers; returns the response and its body.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> (Response<()>, Bytes) {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = self.send(builder.body(Body::empty()).unwrap()).await;
        split(response).await
    }
}

/// Split a response into its head and collected body.
#[allow(dead_code)]
pub async fn split(response: Response<Body>) -> (Response<()>, Bytes) {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    (Response::from_parts(parts, ()), bytes)
}
