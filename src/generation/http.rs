//! HTTP client for a remote generation endpoint.
//!
//! POSTs `{"prompt": "..."}` and expects the four bundle fields back as
//! camelCase JSON. Each call is a single attempt; the caller decides what to
//! do with a failure.

use super::GenerationService;
use crate::error::ServiceError;
use crate::model::OutputBundle;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// Client for a prompt → bundle HTTP endpoint.
pub(crate) struct HttpGenerationClient {
    api_url: String,
    client: reqwest::Client,
}

/// Request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// Response body. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    script: Option<String>,
    caption: Option<String>,
    hashtags: Option<String>,
    thumbnail_text: Option<String>,
}

impl HttpGenerationClient {
    /// Create a new client for `api_url`.
    pub(crate) fn new(api_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for HttpGenerationClient")?;

        Ok(Self {
            api_url: api_url.to_string(),
            client,
        })
    }

    /// Turn a response body into a bundle.
    ///
    /// Absent fields become empty strings; a body with none of the fields is
    /// rejected.
    fn extract_bundle(response: GenerateResponse) -> Result<OutputBundle, ServiceError> {
        let GenerateResponse {
            script,
            caption,
            hashtags,
            thumbnail_text,
        } = response;

        if script.is_none() && caption.is_none() && hashtags.is_none() && thumbnail_text.is_none() {
            return Err(ServiceError::InvalidResponse(
                "No bundle fields in generation response".into(),
            ));
        }

        Ok(OutputBundle::new(
            script.unwrap_or_default(),
            caption.unwrap_or_default(),
            hashtags.unwrap_or_default(),
            thumbnail_text.unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<OutputBundle, ServiceError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&GenerateRequest { prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::ServerError { status, message });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            ServiceError::InvalidResponse(format!("Failed to parse generation response: {}", e))
        })?;

        let bundle = Self::extract_bundle(body)?;
        info!(
            script_len = bundle.script.len(),
            caption_len = bundle.caption.len(),
            "Generation request succeeded"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response on a local port and return its URL
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}/api/generate", addr)
    }

    /// Read headers and a Content-Length body so the socket closes cleanly
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client(url: &str) -> HttpGenerationClient {
        HttpGenerationClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&GenerateRequest {
            prompt: "study tips #focus",
        })
        .unwrap();
        assert_eq!(json, r#"{"prompt":"study tips #focus"}"#);
    }

    #[test]
    fn test_response_missing_fields_default_to_empty() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"script": "S", "thumbnailText": null, "extra": 1}"#)
                .unwrap();
        let bundle = HttpGenerationClient::extract_bundle(response).unwrap();
        assert_eq!(bundle, OutputBundle::new("S", "", "", ""));
    }

    #[test]
    fn test_response_without_bundle_fields_is_invalid() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"result": "Generated short"}"#).unwrap();
        assert!(matches!(
            HttpGenerationClient::extract_bundle(response),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let url = serve_once(
            "200 OK",
            r##"{"script":"Hook","caption":"Cap","hashtags":"#a #b","thumbnailText":"BIG"}"##,
        )
        .await;
        let bundle = client(&url).generate("anything").await.unwrap();
        assert_eq!(bundle, OutputBundle::new("Hook", "Cap", "#a #b", "BIG"));
    }

    #[tokio::test]
    async fn test_generate_server_error() {
        let url = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        match client(&url).generate("anything").await {
            Err(ServiceError::ServerError { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_unparseable_body() {
        let url = serve_once("200 OK", "<html>oops</html>").await;
        assert!(matches!(
            client(&url).generate("anything").await,
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_network_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(&format!("http://{}/api/generate", addr))
            .generate("anything")
            .await;
        assert!(matches!(result, Err(ServiceError::Network(_))));
    }
}
