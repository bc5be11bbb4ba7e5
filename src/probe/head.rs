use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("spdyprobe/", env!("CARGO_PKG_VERSION"));

/// The parts of a HEAD response the evaluator consumes: the final URL after
/// redirects, the status, and the response headers.
#[derive(Debug)]
pub struct HeadResponse {
    pub final_url: Url,
    pub status: u16,
    headers: HeaderMap,
}

impl HeadResponse {
    /// Case-insensitive header lookup; missing or non-ASCII values read as
    /// empty.
    pub fn header(&self, name: &str) -> String {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

/// Minimal HEAD-only requestor: forced HTTP/1.1, gzip/deflate accepted and
/// transparently decompressed, redirects followed, and every network-level
/// failure mapped to "no response". Certificate problems are deliberately
/// ignored here; the inspector already judged the certificate, and a broken
/// one should not hide the server headers.
pub struct HeadRequestor {
    client: reqwest::Client,
}

impl HeadRequestor {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .http1_only()
            .gzip(true)
            .deflate(true)
            .redirect(Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn head(&self, url: &str) -> Option<HeadResponse> {
        let response = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(url, error = %err, "head request failed");
                return None;
            }
        };

        Some(HeadResponse {
            final_url: response.url().clone(),
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_http_server(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                assert!(request.starts_with("HEAD / HTTP/1.1"));
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn captures_headers_case_insensitively() {
        let port = spawn_http_server(
            "HTTP/1.1 200 OK\r\nServer: nginx/1.2.3\r\nStrict-Transport-Security: max-age=600\r\nContent-Length: 0\r\n\r\n",
        )
        .await;

        let requestor = HeadRequestor::new(Duration::from_millis(1000)).unwrap();
        let response = requestor
            .head(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("server"), "nginx/1.2.3");
        assert_eq!(response.header("strict-transport-security"), "max-age=600");
        assert_eq!(response.header("x-absent"), "");
    }

    #[tokio::test]
    async fn network_failure_yields_no_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let requestor = HeadRequestor::new(Duration::from_millis(500)).unwrap();
        assert!(requestor
            .head(&format!("http://127.0.0.1:{port}/"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn error_statuses_still_return_a_response() {
        let port = spawn_http_server("HTTP/1.1 404 Not Found\r\nServer: test\r\nContent-Length: 0\r\n\r\n").await;

        let requestor = HeadRequestor::new(Duration::from_millis(1000)).unwrap();
        let response = requestor
            .head(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.header("server"), "test");
    }
}
