//! Shared test utilities: an in-process HTTP file server and helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use yaolist_datastore::utils::format_http_date;
use yaolist_datastore::{ByteSource, FileReader};

pub const AUTH_TOKEN: &str = "Bearer test-token";

/// Paths that sleep before answering.
pub const SLOW_PATH: &str = "slow.txt";
/// Paths that always answer 500.
pub const BROKEN_PATH: &str = "broken.txt";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
pub struct MockFile {
    pub content: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl MockFile {
    pub fn new(content: &str, headers: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            content: content.as_bytes().to_vec(),
            last_modified: Utc::now(),
            headers,
        }
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
}

struct MockState {
    files: HashMap<String, MockFile>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Test server wrapper serving a fixed set of files.
pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    /// Default files: `test.txt`, `data/file.json`, `private/secret.txt`
    /// (needs `Authorization: Bearer test-token`) and `multi.txt`.
    pub async fn spawn() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "test.txt".to_string(),
            MockFile::new("Hello, World!", vec![("Content-Type", "text/plain")]),
        );
        let mut older = MockFile::new(r#"{"key": "value"}"#, vec![("Content-Type", "application/json")]);
        older.last_modified = Utc::now() - chrono::Duration::hours(1);
        files.insert("data/file.json".to_string(), older);
        files.insert(
            "private/secret.txt".to_string(),
            MockFile::new("secret data", vec![("Content-Type", "text/plain")]),
        );
        files.insert(
            "multi.txt".to_string(),
            MockFile::new("m", vec![("X-Multi", "first"), ("X-Multi", "second")]),
        );
        Self::spawn_with(files).await
    }

    pub async fn spawn_with(files: HashMap<String, MockFile>) -> Self {
        let state = Arc::new(MockState {
            files,
            requests: Mutex::new(Vec::new()),
        });
        let router = Router::new().fallback(serve_file).with_state(state.clone());

        // Bind to port 0 to let OS choose available port
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server error");
        });

        Self { addr, state }
    }

    /// Base URL without trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn serve_file(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();
    let recorded: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        headers: recorded,
    });

    if path == SLOW_PATH {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
    if path == BROKEN_PATH {
        return status(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if path.starts_with("private/") {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if auth != Some(AUTH_TOKEN) {
            return status(StatusCode::UNAUTHORIZED);
        }
    }

    let file = match state.files.get(&path) {
        Some(f) => f,
        None => return status(StatusCode::NOT_FOUND),
    };
    if method != Method::GET && method != Method::HEAD {
        return status(StatusCode::METHOD_NOT_ALLOWED);
    }

    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in &file.headers {
        builder = builder.header(*name, *value);
    }
    builder
        .header("Content-Length", file.content.len().to_string())
        .header("Last-Modified", format_http_date(file.last_modified))
        .body(Body::from(file.content.clone()))
        .unwrap()
}

fn status(code: StatusCode) -> Response {
    Response::builder().status(code).body(Body::empty()).unwrap()
}

pub fn source(content: &str) -> ByteSource {
    Box::new(std::io::Cursor::new(content.as_bytes().to_vec()))
}

pub async fn read_all(mut reader: FileReader) -> String {
    let mut content = String::new();
    reader.read_to_string(&mut content).await.expect("read failed");
    content
}
