//! Minimal HTTP/1.1 stub server for provider tests.
//!
//! Routes match on the request target (path plus query) by prefix; the
//! longest matching prefix wins. Unknown targets answer 404.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

#[derive(Default)]
struct Stats {
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: AtomicU64,
}

pub struct StubServer {
    addr: SocketAddr,
    routes: Routes,
    stats: Arc<Stats>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();
        let stats = Arc::new(Stats::default());

        let (task_routes, task_stats) = (Arc::clone(&routes), Arc::clone(&stats));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&task_routes);
                let stats = Arc::clone(&task_stats);
                tokio::spawn(async move {
                    let _ = serve(stream, routes, stats).await;
                });
            }
        });

        Self {
            addr,
            routes,
            stats,
        }
    }

    /// Register or replace a canned response.
    pub fn route(&self, prefix: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(prefix.to_string(), (status, body.to_string()));
    }

    /// Hold every response for `delay` so overlapping requests are visible.
    pub fn respond_after(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.stats.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.stats.hits.load(Ordering::SeqCst)
    }

    /// Most requests ever handled at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, stats: Arc<Stats>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    stats.hits.fetch_add(1, Ordering::SeqCst);
    let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.peak.fetch_max(now, Ordering::SeqCst);

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let (status, body) = {
        let routes = routes.lock().unwrap();
        routes
            .iter()
            .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, response)| response.clone())
            .unwrap_or((404, "not found".to_string()))
    };

    let delay = stats.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let response = format!(
        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
