//! HTTP access to the load generator.

use std::net::Ipv6Addr;
use std::time::Duration;

use async_trait::async_trait;
use http::uri::Authority;
use http_body_util::BodyExt;
use tracing::debug;

use crate::error::{LoadGenError, LoadGenResult};

/// Status and body of one load-generator response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Issues `GET` requests against a load-generator host.
///
/// Connection-level failures must map to [`LoadGenError::Transport`];
/// any HTTP status, including errors, is a successful reply.
#[async_trait]
pub trait LoadGenTransport: Send + Sync {
    async fn get(&self, host: &str, path_and_query: &str) -> LoadGenResult<HttpReply>;
}

/// HTTP/1 client over a fresh TCP connection per request.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl LoadGenTransport for HyperTransport {
    async fn get(&self, host: &str, path_and_query: &str) -> LoadGenResult<HttpReply> {
        let authority = with_default_port(host)?;
        let address = authority.as_str().to_string();
        let uri = format!("http://{address}{path_and_query}");

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&address)
                .await
                .map_err(|e| LoadGenError::Transport(format!("connect {address}: {e}")))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| LoadGenError::Transport(format!("handshake {address}: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(&uri)
                .header("host", address.as_str())
                .header("user-agent", "vmscale/0.1")
                .body(http_body_util::Empty::<bytes::Bytes>::new())
                .map_err(|e| LoadGenError::Protocol(format!("bad request {uri}: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| LoadGenError::Transport(format!("GET {uri}: {e}")))?;
            let status = resp.status().as_u16();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| LoadGenError::Transport(format!("reading body of {uri}: {e}")))?
                .to_bytes();

            debug!(%uri, status, bytes = body.len(), "load generator replied");
            Ok(HttpReply::new(status, String::from_utf8_lossy(&body)))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(LoadGenError::Transport(format!("GET {uri} timed out"))),
        }
    }
}

/// `host` as an authority with an explicit port, 80 when none is given.
/// Bare IPv6 literals are bracketed first.
fn with_default_port(host: &str) -> LoadGenResult<Authority> {
    let host = if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let invalid = |e: http::uri::InvalidUri| {
        LoadGenError::Protocol(format!("invalid load generator host {host}: {e}"))
    };

    let authority: Authority = host.parse().map_err(invalid)?;
    if authority.port_u16().is_some() {
        return Ok(authority);
    }
    format!("{}:80", authority.as_str()).parse().map_err(invalid)
}
