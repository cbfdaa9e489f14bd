use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use super::types::{Request, Response, ResponseSource};

/// The network boundary. Every strategy and the freshness monitor fetch through this.
#[async_trait]
pub trait Network: Send + Sync {
  /// Perform the request. Any HTTP status is a success here; only transport
  /// failures (DNS, refused connection, timeout) are errors.
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed network client
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new(user_agent: &str) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .connect_timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
      source: ResponseSource::Network,
    })
  }
}
