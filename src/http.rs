// ABOUTME: Minimal HTTP/1.1 client over a plain TCP connection.
// ABOUTME: Shared by the endpoint prober and the traffic splitter client.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("unsupported URL {0:?}: only http:// is supported")]
    InvalidUrl(String),

    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: String,
        source: std::io::Error,
    },

    #[error("HTTP handshake failed: {0}")]
    Handshake(hyper::Error),

    #[error("failed to build request: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Request(hyper::Error),

    #[error("failed to read response body: {0}")]
    Body(hyper::Error),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Split `http://host[:port]/path?query` into the connect address, host header and request target.
fn split_url(url: &str) -> Result<(String, String, String), HttpError> {
    let invalid = || HttpError::InvalidUrl(url.to_string());
    let uri: Uri = url.parse().map_err(|_| invalid())?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid());
    }
    let authority = uri.authority().ok_or_else(invalid)?;
    let host = authority.host();
    if host.is_empty() {
        return Err(invalid());
    }

    let address = format!("{host}:{}", authority.port_u16().unwrap_or(80));
    let target = match uri.query() {
        Some(query) => format!("{}?{query}", uri.path()),
        None => uri.path().to_string(),
    };
    Ok((address, authority.as_str().to_string(), target))
}

/// Send one request on a fresh connection and collect the response body.
///
/// Callers bound the whole exchange with `tokio::time::timeout`.
pub async fn send(
    method: Method,
    url: &str,
    body: Option<Bytes>,
) -> Result<HttpResponse, HttpError> {
    let (address, host, path) = split_url(url)?;

    let stream = TcpStream::connect(&address)
        .await
        .map_err(|source| HttpError::Connect {
            authority: address.clone(),
            source,
        })?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(HttpError::Handshake)?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("http connection error: {}", e);
        }
    });

    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(&path)
        .header("host", &host)
        .header("user-agent", concat!("switchyard/", env!("CARGO_PKG_VERSION")));
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let req = builder
        .body(Full::new(body.unwrap_or_default()))
        .map_err(|e| HttpError::Build(e.to_string()))?;

    let resp = sender.send_request(req).await.map_err(HttpError::Request)?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(HttpError::Body)?
        .to_bytes();

    Ok(HttpResponse { status, body })
}
