//! Local HTTP servers shared by the integration tests
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub const SAMPLE_XMLTV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="f3932e75f691561adbe3b68a5c4c3a8e">
    <display-name>BBC One Lon</display-name>
    <display-name>BBC One</display-name>
    <icon src="/logos/bbc_one.png"/>
  </channel>
  <channel id="a9d1c0e3">
    <display-name>Channel Nobody Has</display-name>
  </channel>
  <programme start="20240101060000 +0000" stop="20240101063000 +0000" channel="f3932e75f691561adbe3b68a5c4c3a8e">
    <title lang="en">Breakfast</title>
  </programme>
</tv>
"#;

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Body of a generated listing of roughly `channels * 120` bytes
pub fn large_listing(channels: usize) -> String {
    let mut doc = String::from("<?xml version=\"1.0\"?>\n<tv>\n");
    for i in 0..channels {
        doc.push_str(&format!(
            "  <channel id=\"ch{i}\">\n    <display-name>Channel {i}</display-name>\n  </channel>\n"
        ));
    }
    doc.push_str("</tv>\n");
    doc
}

/// A document server with switchable range and failure behaviour
pub struct DocServer {
    pub body: Bytes,
    /// Answer `Range` requests with 206; otherwise always 200 with the full body
    pub honour_ranges: bool,
    /// Value of the `Content-Encoding` header, if any
    pub content_encoding: Option<&'static str>,
    pub last_modified: Option<&'static str>,
    /// Delay before answering each request
    pub delay: Duration,
    /// Answer every request with this status instead
    pub fail_with: Option<StatusCode>,
    pub failing: AtomicBool,
    pub requests: AtomicU32,
}

impl DocServer {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Bytes::from(Into::<Vec<u8>>::into(body)),
            honour_ranges: true,
            content_encoding: None,
            last_modified: None,
            delay: Duration::ZERO,
            fail_with: None,
            failing: AtomicBool::new(false),
            requests: AtomicU32::new(0),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/feed.xml", get(serve_document))
            .with_state(Arc::clone(self))
    }

    /// Spawn the server and return the document URL
    pub async fn spawn(self: &Arc<Self>) -> String {
        let addr = spawn_server(self.router()).await;
        format!("http://{addr}/feed.xml")
    }
}

fn parse_range(headers: &HeaderMap) -> Option<(u64, u64)> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn serve_document(State(server): State<Arc<DocServer>>, headers: HeaderMap) -> Response {
    server.requests.fetch_add(1, Ordering::SeqCst);
    if !server.delay.is_zero() {
        tokio::time::sleep(server.delay).await;
    }
    if server.failing.load(Ordering::SeqCst) {
        let status = server.fail_with.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Response::builder()
            .status(status)
            .body(Body::empty())
            .unwrap();
    }

    let total = server.body.len() as u64;
    let mut builder = Response::builder();
    if let Some(encoding) = server.content_encoding {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }
    if let Some(last_modified) = server.last_modified {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }

    match parse_range(&headers).filter(|_| server.honour_ranges) {
        Some((start, _)) if start >= total => builder
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total}"))
            .body(Body::empty())
            .unwrap(),
        Some((start, end)) => {
            let end = end.min(total - 1);
            let slice = server.body.slice(start as usize..=end as usize);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .body(Body::from(slice))
                .unwrap()
        }
        None => builder
            .status(StatusCode::OK)
            .body(Body::from(server.body.clone()))
            .unwrap(),
    }
}
