// tests/common/mod.rs
// Shared mocks for integration tests. Each mock counts its calls.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feed_digest_bot::dedup::{DedupGate, DedupRecord, DedupStore, MemoryDedupStore};
use feed_digest_bot::error::{BackendError, PipelineError, Result, SendError};
use feed_digest_bot::ingest::providers::StaticFeedFetcher;
use feed_digest_bot::notify::{DeliveryChannel, OutgoingMessage, Publisher};
use feed_digest_bot::pipeline::Pipeline;
use feed_digest_bot::retry::RetryPolicy;
use feed_digest_bot::summarize::{
    BackendRequest, DigestLimits, GeneratedDigest, GenerativeBackend, Summarizer,
};

pub const FEED_URL: &str = "https://news.example.com/feed.xml";

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(50),
    }
}

/// Backend that replays scripted replies, then repeats `default`.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<std::result::Result<GeneratedDigest, BackendError>>>,
    default: std::result::Result<GeneratedDigest, BackendError>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn always(reply: std::result::Result<GeneratedDigest, BackendError>) -> Self {
        Self::scripted(vec![], reply)
    }

    pub fn scripted(
        replies: Vec<std::result::Result<GeneratedDigest, BackendError>>,
        default: std::result::Result<GeneratedDigest, BackendError>,
    ) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            default,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(
        &self,
        request: &BackendRequest,
    ) -> std::result::Result<GeneratedDigest, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn good_digest() -> GeneratedDigest {
    GeneratedDigest {
        title: "Generated title".into(),
        bullets: vec!["first point".into(), "second point".into(), "third point".into()],
        relevance: "It matters to readers".into(),
    }
}

/// Channel that replays scripted send results (then succeeds) and keeps every message.
#[derive(Default)]
pub struct RecordingChannel {
    replies: Mutex<VecDeque<std::result::Result<(), SendError>>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: Vec<std::result::Result<(), SendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, message: &OutgoingMessage) -> std::result::Result<(), SendError> {
        self.sent.lock().unwrap().push(message.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Memory store whose lookups can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryDedupStore,
    pub fail_get: std::sync::atomic::AtomicBool,
    pub fail_put: std::sync::atomic::AtomicBool,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<DedupRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(PipelineError::Store("simulated lookup failure".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, record: DedupRecord) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(PipelineError::Store("simulated write failure".into()));
        }
        self.inner.put(record).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_expired(now).await
    }
}

/// Store whose calls never complete; every operation has to time out.
#[derive(Default)]
pub struct StalledStore {
    pub gets: AtomicUsize,
}

#[async_trait]
impl DedupStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<DedupRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn put(&self, _record: DedupRecord) -> Result<()> {
        std::future::pending().await
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        std::future::pending().await
    }
}

pub fn build_pipeline(
    fetcher: StaticFeedFetcher,
    store: Arc<dyn DedupStore>,
    backend: Arc<dyn GenerativeBackend>,
    channel: Arc<dyn DeliveryChannel>,
) -> Pipeline {
    Pipeline::new(
        Arc::new(fetcher),
        DedupGate::new(store, 90, Duration::from_secs(2)),
        Summarizer::new(backend, fast_retry(2), DigestLimits::default()),
        Publisher::new(channel, fast_retry(3)),
    )
}

/// One canned HTTP response for [`http_stub`].
pub struct StubReply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl StubReply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
    use tokio::io::AsyncReadExt;
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let len = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Serve `replies` in order, one connection each, on a local port. The handle
/// yields the raw requests that were received.
pub async fn http_stub(replies: Vec<StubReply>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::AsyncWriteExt;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for reply in replies {
            let (mut sock, _) = listener.accept().await.unwrap();
            seen.push(read_request(&mut sock).await);
            let mut head = format!(
                "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                reply.status,
                reason(reply.status),
                reply.body.len()
            );
            for (k, v) in &reply.headers {
                head.push_str(&format!("{k}: {v}\r\n"));
            }
            head.push_str("\r\n");
            let _ = sock.write_all(head.as_bytes()).await;
            let _ = sock.write_all(reply.body.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
        seen
    });
    (format!("http://{addr}"), handle)
}
