//! Local HTTP server speaking just enough HTTP/1.1 to stand in for a
//! chat-completions endpoint

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ask_ai::database::models::{CreateApiEndpoint, RequestPolicy};
use ask_ai::database::settings_repo::KEY_REQUEST_TIMEOUT_SECS;
use ask_ai::{AskAi, DatabaseManager};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const HI: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
pub const THERE: &str = "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n";
pub const DONE: &str = "data: [DONE]\n\n";

pub fn delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
}

/// Canned reply for one request
#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub chunks: Vec<Vec<u8>>,
    pub chunk_delay: Duration,
    /// Keep the connection open after the last chunk until the client hangs up
    pub hold_open: bool,
}

impl MockResponse {
    pub fn sse(chunks: Vec<&[u8]>) -> Self {
        Self {
            status: 200,
            chunks: chunks.into_iter().map(|c| c.to_vec()).collect(),
            chunk_delay: Duration::from_millis(5),
            hold_open: false,
        }
    }

    /// One SSE body cut into pieces at the given byte offsets
    pub fn sse_split(body: &str, cuts: &[usize]) -> Self {
        let bytes = body.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            chunks.push(bytes[start..cut].to_vec());
            start = cut;
        }
        chunks.push(bytes[start..].to_vec());
        Self {
            chunks,
            ..Self::sse(vec![])
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            chunks: vec![body.as_bytes().to_vec()],
            chunk_delay: Duration::ZERO,
            hold_open: false,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

/// What the server saw for one request
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub received_at: Instant,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

pub struct MockServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
    pub connections: Arc<AtomicUsize>,
    /// Set when the client closed a held-open connection
    pub client_hung_up: Arc<AtomicBool>,
}

impl MockServer {
    /// Serve `responses` in order, one per connection
    pub async fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local test server");
        let addr = listener.local_addr().expect("local addr");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let client_hung_up = Arc::new(AtomicBool::new(false));

        let (req_log, conn_count, hung_up) = (requests.clone(), connections.clone(), client_hung_up.clone());
        tokio::spawn(async move {
            for response in responses {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                conn_count.fetch_add(1, Ordering::SeqCst);
                let (req_log, hung_up) = (req_log.clone(), hung_up.clone());
                tokio::spawn(async move {
                    serve_one(socket, response, req_log, hung_up).await;
                });
            }
        });

        Self {
            url: format!("http://{}/v1/chat/completions", addr),
            requests,
            connections,
            client_hung_up,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_hang_up(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.client_hung_up.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(body_start + content_length);

    Some(CapturedRequest {
        request_line,
        headers,
        body: String::from_utf8_lossy(&buf[body_start..body_end]).to_string(),
        received_at: Instant::now(),
    })
}

async fn serve_one(
    mut socket: TcpStream,
    response: MockResponse,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    hung_up: Arc<AtomicBool>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().unwrap().push(request);

    if response.status != 200 {
        let body: Vec<u8> = response.chunks.concat();
        let head = if response.status == 204 {
            "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 {} Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                response.status,
                body.len()
            )
        };
        let _ = socket.write_all(head.as_bytes()).await;
        if response.status != 204 {
            let _ = socket.write_all(&body).await;
        }
        let _ = socket.shutdown().await;
        return;
    }

    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }

    for chunk in &response.chunks {
        if chunk.is_empty() {
            continue;
        }
        tokio::time::sleep(response.chunk_delay).await;
        let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
        frame.extend_from_slice(chunk);
        frame.extend_from_slice(b"\r\n");
        if socket.write_all(&frame).await.is_err() || socket.flush().await.is_err() {
            hung_up.store(true, Ordering::SeqCst);
            return;
        }
    }

    if response.hold_open {
        let mut sink = [0u8; 256];
        loop {
            match socket.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        hung_up.store(true, Ordering::SeqCst);
        return;
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

/// App with a throwaway store holding one endpoint that points at `url`
pub fn app_with_endpoint(url: &str, key: &str, policy: RequestPolicy) -> (TempDir, Arc<AskAi>) {
    let dir = tempfile::tempdir().expect("temp dir");
    add_endpoint(&open_db(&dir), url, key, policy);
    let app = AskAi::open(dir.path().join("ask-ai.db")).expect("open app");
    (dir, Arc::new(app))
}

/// Same as [`app_with_endpoint`] with `request_timeout_secs` set before the
/// HTTP client is built
pub fn app_with_timeout(url: &str, timeout_secs: u64) -> (TempDir, Arc<AskAi>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = open_db(&dir);
    add_endpoint(&db, url, "sk-test", RequestPolicy::default());
    db.set_setting_checked(KEY_REQUEST_TIMEOUT_SECS, &timeout_secs.to_string())
        .expect("set timeout");
    drop(db);
    let app = AskAi::open(dir.path().join("ask-ai.db")).expect("open app");
    (dir, Arc::new(app))
}

fn add_endpoint(db: &DatabaseManager, url: &str, key: &str, policy: RequestPolicy) {
    db.create_endpoint(&CreateApiEndpoint {
        name: "local".to_string(),
        url: url.to_string(),
        key: key.to_string(),
        model: "test-model".to_string(),
        policy,
    })
    .expect("create endpoint");
}

pub fn open_db(dir: &TempDir) -> DatabaseManager {
    DatabaseManager::new(dir.path().join("ask-ai.db")).expect("open db")
}
