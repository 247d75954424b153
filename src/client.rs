//! # Optimization Client Module
//!
//! Questo modulo incapsula la chiamata al servizio esterno di ottimizzazione.
//!
//! ## Responsabilità:
//! - Costruisce l'endpoint aggiungendo l'URL dell'immagine come parametro `img`
//! - Una chiamata sincrona per asset, nessun retry
//! - Converte la risposta JSON in `OptimizationResponse`
//! - Scarica il binario ottimizzato quando il servizio restituisce un riferimento
//!
//! ## Esiti:
//! - Errore di trasporto (host irraggiungibile, non 2xx, timeout) → `OptimizeError::Transport`
//! - Corpo vuoto → risposta "nessun miglioramento" con dimensione 0
//! - Campo `error` nel JSON → risposta fallita con descrizione dell'errore
//!
//! ## Formato risposta (compatibile reSmush.it):
//! ```json
//! {"src": "https://...", "dest": "https://.../opt.jpg", "src_size": 102400, "dest_size": 61440, "percent": 40}
//! {"error": 401, "error_long": "Cannot copy from remote url"}
//! ```

use crate::config::Config;
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationRequest {
    pub image_url: String,
}

/// Result of one optimization attempt
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResponse {
    pub original_url: String,
    pub original_size: u64,
    /// Zero or negative means no improvement was made
    pub optimized_size: i64,
    pub optimized_image: Option<Vec<u8>>,
    pub percent_saved: f64,
    pub error: Option<String>,
}

impl OptimizationResponse {
    /// Service answered but had nothing better to offer
    pub fn unchanged(original_url: &str) -> Self {
        Self {
            original_url: original_url.to_string(),
            original_size: 0,
            optimized_size: 0,
            optimized_image: None,
            percent_saved: 0.0,
            error: None,
        }
    }

    pub fn failed(original_url: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::unchanged(original_url)
        }
    }

    /// Size to account for after the write: the optimized size when the
    /// service reported a positive one, the original size otherwise
    pub fn effective_size(&self) -> u64 {
        if self.optimized_size > 0 {
            self.optimized_size as u64
        } else {
            self.original_size
        }
    }
}

#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    async fn process(&self, request: &OptimizationRequest) -> Result<OptimizationResponse>;
}

#[derive(Debug, Deserialize)]
struct ServiceReply {
    src: Option<String>,
    dest: Option<String>,
    #[serde(default)]
    src_size: u64,
    #[serde(default)]
    dest_size: i64,
    percent: Option<f64>,
    error: Option<serde_json::Value>,
    error_long: Option<String>,
}

/// Client for a reSmush.it compatible endpoint
pub struct ResmushClient {
    client: Client,
    endpoint: String,
}

impl ResmushClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.optimization_endpoint().to_string(),
        })
    }

    /// Endpoint with the image URL appended as the `img` query parameter
    pub fn build_url(&self, image_url: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| OptimizeError::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        url.query_pairs_mut().append_pair("img", image_url);
        Ok(url)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OptimizeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OptimizeError::Transport(format!("{} returned {}", url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OptimizeError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }

    fn percent_saved(reply: &ServiceReply) -> f64 {
        match reply.percent {
            Some(percent) => percent,
            None if reply.src_size > 0 && reply.dest_size > 0 => {
                (reply.src_size as f64 - reply.dest_size as f64) / reply.src_size as f64 * 100.0
            }
            None => 0.0,
        }
    }
}

#[async_trait]
impl ImageOptimizer for ResmushClient {
    async fn process(&self, request: &OptimizationRequest) -> Result<OptimizationResponse> {
        let url = self.build_url(&request.image_url)?;
        debug!("Calling optimization service: {}", url);

        let body = self.get_bytes(url.as_str()).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptimizationResponse::unchanged(&request.image_url));
        }

        let reply: ServiceReply = serde_json::from_slice(&body)?;
        let original_url = reply.src.clone().unwrap_or_else(|| request.image_url.clone());

        if let Some(ref code) = reply.error {
            let message = reply
                .error_long
                .clone()
                .unwrap_or_else(|| format!("service error {}", code));
            return Ok(OptimizationResponse::failed(&original_url, message));
        }

        let optimized_image = match reply.dest {
            Some(ref dest) if reply.dest_size > 0 => Some(self.get_bytes(dest).await?),
            _ => None,
        };

        Ok(OptimizationResponse {
            original_url,
            original_size: reply.src_size,
            optimized_size: reply.dest_size,
            optimized_image,
            percent_saved: Self::percent_saved(&reply),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves canned `(path prefix, status, body)` replies, recording request lines
    async fn serve(routes: Vec<(&'static str, u16, Vec<u8>)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                log.lock().unwrap().push(path.clone());

                let (status, body) = routes
                    .iter()
                    .find(|(prefix, _, _)| path.starts_with(prefix))
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, Vec::new()));

                let head = format!(
                    "HTTP/1.1 {} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, seen)
    }

    fn client_for(endpoint: &str) -> ResmushClient {
        let config = Config {
            site_url: "https://www.example.com".to_string(),
            optimization_api: Some(endpoint.to_string()),
            request_timeout_secs: Some(5),
            ..Default::default()
        };
        ResmushClient::new(&config).unwrap()
    }

    fn request(url: &str) -> OptimizationRequest {
        OptimizationRequest { image_url: url.to_string() }
    }

    #[test]
    fn test_build_url_encodes_image_url() {
        let client = client_for("http://api.example.com/ws.php?qlty=80");
        let url = client
            .build_url("https://www.example.com/globalassets/my image.jpg?v=1&x=2")
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://api.example.com/ws.php?qlty=80&img=https%3A%2F%2Fwww.example.com%2Fglobalassets%2Fmy+image.jpg%3Fv%3D1%26x%3D2"
        );
    }

    #[test]
    fn test_effective_size_falls_back_to_original() {
        let mut response = OptimizationResponse::unchanged("u");
        response.original_size = 500;
        assert_eq!(response.effective_size(), 500);

        response.optimized_size = -1;
        assert_eq!(response.effective_size(), 500);

        response.optimized_size = 300;
        assert_eq!(response.effective_size(), 300);
    }

    #[tokio::test]
    async fn test_successful_reply_downloads_optimized_bytes() {
        let (cdn, cdn_seen) = serve(vec![("/opt.jpg", 200, b"tiny".to_vec())]).await;
        let body = format!(
            r#"{{"src":"https://www.example.com/a.jpg","dest":"{}/opt.jpg","src_size":1000,"dest_size":4,"percent":99.6}}"#,
            cdn
        );
        let (api, api_seen) = serve(vec![("/ws.php", 200, body.into_bytes())]).await;

        let client = client_for(&format!("{}/ws.php", api));
        let response = client.process(&request("https://www.example.com/a.jpg")).await.unwrap();

        assert!(response.error.is_none());
        assert_eq!(response.original_size, 1000);
        assert_eq!(response.optimized_size, 4);
        assert_eq!(response.optimized_image.as_deref(), Some(&b"tiny"[..]));
        assert_eq!(response.percent_saved, 99.6);
        assert_eq!(api_seen.lock().unwrap().len(), 1);
        assert_eq!(*cdn_seen.lock().unwrap(), vec!["/opt.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_download_is_transport_error() {
        let (cdn, _) = serve(vec![("/opt.jpg", 404, Vec::new())]).await;
        let body = format!(
            r#"{{"src":"https://www.example.com/a.jpg","dest":"{}/opt.jpg","src_size":1000,"dest_size":4}}"#,
            cdn
        );
        let (api, _) = serve(vec![("/ws.php", 200, body.into_bytes())]).await;

        let client = client_for(&format!("{}/ws.php", api));
        let result = client.process(&request("https://www.example.com/a.jpg")).await;
        assert!(matches!(result, Err(OptimizeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_body_is_unchanged() {
        let (base, _) = serve(vec![("/ws.php", 200, Vec::new())]).await;
        let client = client_for(&format!("{}/ws.php", base));

        let response = client.process(&request("https://www.example.com/a.jpg")).await.unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.original_url, "https://www.example.com/a.jpg");
        assert_eq!(response.optimized_size, 0);
        assert!(response.optimized_image.is_none());
    }

    #[tokio::test]
    async fn test_service_error_is_failed_response() {
        let (base, _) = serve(vec![(
            "/ws.php",
            200,
            br#"{"error":401,"error_long":"Cannot copy from remote url"}"#.to_vec(),
        )])
        .await;
        let client = client_for(&format!("{}/ws.php", base));

        let response = client.process(&request("https://www.example.com/a.jpg")).await.unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.as_deref(), Some("Cannot copy from remote url"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_transport_error() {
        let (base, _) = serve(vec![("/ws.php", 503, b"busy".to_vec())]).await;
        let client = client_for(&format!("{}/ws.php", base));

        let result = client.process(&request("https://www.example.com/a.jpg")).await;
        assert!(matches!(result, Err(OptimizeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}/ws.php", addr));
        let result = client.process(&request("https://www.example.com/a.jpg")).await;
        assert!(matches!(result, Err(OptimizeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_non_positive_dest_size_means_no_improvement() {
        let (base, _) = serve(vec![(
            "/ws.php",
            200,
            br#"{"src":"https://www.example.com/a.jpg","src_size":200,"dest_size":-1}"#.to_vec(),
        )])
        .await;
        let client = client_for(&format!("{}/ws.php", base));

        let response = client.process(&request("https://www.example.com/a.jpg")).await.unwrap();
        assert!(response.error.is_none());
        assert!(response.optimized_image.is_none());
        assert_eq!(response.optimized_size, -1);
        assert_eq!(response.effective_size(), 200);
        assert_eq!(response.percent_saved, 0.0);
    }

    #[tokio::test]
    async fn test_percent_derived_when_missing() {
        let (base, _) = serve(vec![(
            "/ws.php",
            200,
            br#"{"src":"https://www.example.com/a.jpg","src_size":200,"dest_size":150}"#.to_vec(),
        )])
        .await;
        let client = client_for(&format!("{}/ws.php", base));

        let response = client.process(&request("https://www.example.com/a.jpg")).await.unwrap();
        assert_eq!(response.percent_saved, 25.0);
    }
}
