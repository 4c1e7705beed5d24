//! HTTP client for a running `tilemark serve`.

use thiserror::Error;
use tilemark::{ErrorResponse, WatermarkRequest, WatermarkResponse};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {error}")]
    Rejected { status: u16, error: String },
}

/// Ask the server at `base_url` to watermark `image_path`.
///
/// `text` of `None` lets the server apply its configured default.
pub async fn request_watermark(
    client: &reqwest::Client,
    base_url: &str,
    image_path: &str,
    text: Option<&str>,
) -> Result<WatermarkResponse, ClientError> {
    let url = format!("{}/api/watermark", base_url.trim_end_matches('/'));
    let body = WatermarkRequest {
        image_path: Some(image_path.to_string()),
        text: text.map(str::to_string),
    };

    let response = client.post(&url).json(&body).send().await?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json::<WatermarkResponse>().await?);
    }

    // Non-JSON error bodies fall back to the status text
    let error = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    Err(ClientError::Rejected {
        status: status.as_u16(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use tilemark::{
        serve, AppState, ImageFormat, ImageProcessor, ProcessError, ProcessReport,
        SandboxPolicy,
    };

    /// Accepts everything except paths containing "broken".
    struct StubProcessor;

    impl ImageProcessor for StubProcessor {
        fn process(&self, path: &Path, _text: &str) -> Result<ProcessReport, ProcessError> {
            if path.to_string_lossy().contains("broken") {
                return Err(ProcessError::Decode("stub".to_string()));
            }
            Ok(ProcessReport {
                source: path.to_path_buf(),
                destination: path.to_path_buf(),
                format: ImageFormat::Jpeg,
                width: 10,
                height: 10,
                bytes_in: 0,
                bytes_out: 0,
            })
        }
    }

    async fn spawn_server() -> String {
        let state = AppState::new(
            Arc::new(StubProcessor),
            SandboxPolicy::new("public", "/uploads/"),
            "NQJACK",
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state, std::future::pending()));
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_request_success() {
        let url = spawn_server().await;
        let client = reqwest::Client::new();

        let response = request_watermark(&client, &url, "/uploads/photo.jpg", Some("SAMPLE"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Watermark \"SAMPLE\" added to /uploads/photo.jpg");

        let default = request_watermark(&client, &format!("{}/", url), "/uploads/photo.jpg", None)
            .await
            .unwrap();
        assert_eq!(default.message, "Watermark \"NQJACK\" added to /uploads/photo.jpg");
    }

    #[tokio::test]
    async fn test_request_rejections_surface_server_error() {
        let url = spawn_server().await;
        let client = reqwest::Client::new();

        match request_watermark(&client, &url, "/etc/passwd", None).await {
            Err(ClientError::Rejected { status, error }) => {
                assert_eq!(status, 403);
                assert_eq!(error, "Invalid image path");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        match request_watermark(&client, &url, "/uploads/broken.png", None).await {
            Err(ClientError::Rejected { status, error }) => {
                assert_eq!(status, 500);
                assert_eq!(error, "Failed to add watermark");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
