// ABOUTME: Integration tests for the HTTP prober and router splitter against a canned local server.
// ABOUTME: Each server answers one connection with a fixed response and reports the request it saw.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use switchyard::deploy::{EndpointProber, HttpProber, ProbeError};
use switchyard::traffic::{HttpTrafficSplitter, TrafficError, TrafficSplitter};
use switchyard::types::{EnvironmentName, TrafficSplit};

/// Request line, headers and body as received by the canned server.
struct Captured {
    head: String,
    body: String,
}

/// Serve one request with `status` and `body`; returns the base URL.
async fn serve_once(status: &'static str, response_body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let (head, body) = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let head = text[..end].to_string();
                let length = head
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if text.len() >= end + 4 + length {
                    break (head, text[end + 4..end + 4 + length].to_string());
                }
            }
            if n == 0 {
                break (text, String::new());
            }
        };

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n{response_body}",
            response_body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        tx.send(Captured { head, body }).ok();
    });

    (format!("http://{addr}"), rx)
}

fn env(name: &str) -> EnvironmentName {
    EnvironmentName::new(name).unwrap()
}

mod prober {
    use super::*;

    #[tokio::test]
    async fn ok_status_is_healthy() {
        let (base, request) = serve_once("200 OK", "ok").await;

        HttpProber
            .probe(&format!("{base}/health"), Duration::from_secs(2))
            .await
            .unwrap();

        let request = request.await.unwrap();
        assert!(request.head.starts_with("GET /health HTTP/1.1"));
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let (base, _request) = serve_once("503 Service Unavailable", "").await;

        let err = HttpProber
            .probe(&format!("{base}/health"), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert_eq!(err, ProbeError::Status(503));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpProber
            .probe(&format!("http://{addr}/health"), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = HttpProber
            .probe(&format!("http://{addr}/health"), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Timeout(_)));
    }
}

mod splitter {
    use super::*;

    #[tokio::test]
    async fn set_weights_puts_json_pair() {
        let (base, request) = serve_once("204 No Content", "").await;
        let splitter = HttpTrafficSplitter::new(format!("{base}/"));

        splitter
            .set_weights(&env("production"), TrafficSplit::new(75, 25).unwrap())
            .await
            .unwrap();

        let request = request.await.unwrap();
        assert!(
            request
                .head
                .starts_with("PUT /environments/production/weights HTTP/1.1")
        );
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body, serde_json::json!({"blue": 75, "green": 25}));
    }

    #[tokio::test]
    async fn rejected_weights_carry_status_and_message() {
        let (base, _request) = serve_once("409 Conflict", "route locked").await;
        let splitter = HttpTrafficSplitter::new(base);

        let err = splitter
            .set_weights(&env("production"), TrafficSplit::new(50, 50).unwrap())
            .await
            .unwrap_err();

        match err {
            TrafficError::Rejected { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "route locked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn current_weights_reads_split_back() {
        let (base, request) = serve_once("200 OK", r#"{"blue":10,"green":90}"#).await;
        let splitter = HttpTrafficSplitter::new(base);

        let split = splitter.current_weights(&env("staging")).await.unwrap();

        assert_eq!(split, Some(TrafficSplit::new(10, 90).unwrap()));
        let request = request.await.unwrap();
        assert!(
            request
                .head
                .starts_with("GET /environments/staging/weights HTTP/1.1")
        );
    }

    #[tokio::test]
    async fn missing_read_back_endpoint_means_unsupported() {
        let (base, _request) = serve_once("404 Not Found", "").await;
        let splitter = HttpTrafficSplitter::new(base);

        assert_eq!(splitter.current_weights(&env("staging")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_read_back_is_rejected() {
        let (base, _request) = serve_once("200 OK", r#"{"blue":10,"green":10}"#).await;
        let splitter = HttpTrafficSplitter::new(base);

        let err = splitter.current_weights(&env("staging")).await.unwrap_err();

        assert!(matches!(err, TrafficError::InvalidResponse(_)));
    }
}
