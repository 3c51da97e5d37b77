//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use apex_proxy::http::MakeCorrelationId;
use apex_proxy::{HttpServer, ProxyConfig, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A raw TCP origin answering every request with a fixed response.
pub struct MockOrigin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    /// Request heads received so far, in arrival order.
    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a mock origin returning `status` with `body`.
pub async fn start_mock_origin(status: u16, body: &'static str) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                recorded.lock().unwrap().push(head);

                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nX-Apex: origin\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockOrigin { addr, requests }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// An origin that reads the request, writes `reply` (possibly nothing) and
/// then keeps the connection open until the proxy goes away.
#[allow(dead_code)]
pub struct HangingOrigin {
    pub addr: SocketAddr,
    /// One message per request head received.
    pub accepted: mpsc::UnboundedReceiver<()>,
    /// One message per connection the proxy closed or reset.
    pub closed: mpsc::UnboundedReceiver<()>,
}

#[allow(dead_code)]
pub async fn start_hanging_origin(reply: &'static str) -> HangingOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let accepted_tx = accepted_tx.clone();
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                read_head(&mut socket).await;
                let _ = accepted_tx.send(());
                let _ = socket.write_all(reply.as_bytes()).await;

                let mut buf = [0u8; 256];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    HangingOrigin {
        addr,
        accepted,
        closed,
    }
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Correlation ids `test-0`, `test-1`, ... remembered in issue order.
#[derive(Clone, Default)]
pub struct RecordingIds {
    issued: Arc<Mutex<Vec<String>>>,
    next: Arc<AtomicUsize>,
}

impl RecordingIds {
    #[allow(dead_code)]
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

impl MakeCorrelationId for RecordingIds {
    fn make_id(&self) -> String {
        let id = format!("test-{}", self.next.fetch_add(1, Ordering::SeqCst));
        self.issued.lock().unwrap().push(id.clone());
        id
    }
}

/// Loopback callers, JSON endpoints, pointed at `origin`.
pub fn proxy_config(origin: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.origin.url = format!("http://{origin}");
    config.origin.timeout_secs = 2;
    config.access.allow_loopback = true;
    config.access.allow_json_endpoints = true;
    config
}

/// A running proxy bound to an ephemeral loopback port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(config: ProxyConfig, ids: RecordingIds) -> RunningProxy {
    let server = HttpServer::with_correlation_ids(&config, Arc::new(ids)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningProxy {
        addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
