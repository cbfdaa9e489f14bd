//! Scripted network used by unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client::Network;
use super::types::{Request, Response, ResponseSource};

#[derive(Debug, Clone)]
enum Reply {
  Respond(u16, Bytes),
  Fail,
  Delay(Duration, u16, Bytes),
}

/// Network fake keyed by absolute URL. Unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct FakeNetwork {
  replies: Mutex<HashMap<String, Reply>>,
  calls: Mutex<Vec<Request>>,
}

impl FakeNetwork {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) {
    self.set(url, Reply::Respond(status, Bytes::from(body.to_string())));
  }

  pub fn fail(&self, url: &str) {
    self.set(url, Reply::Fail);
  }

  pub fn delay(&self, url: &str, delay: Duration, status: u16, body: &str) {
    self.set(url, Reply::Delay(delay, status, Bytes::from(body.to_string())));
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }

  fn set(&self, url: &str, reply: Reply) {
    self.replies.lock().unwrap().insert(url.to_string(), reply);
  }
}

fn response(status: u16, body: Bytes) -> Response {
  Response {
    status,
    status_text: String::new(),
    headers: Vec::new(),
    body,
    source: ResponseSource::Network,
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.clone());
    let reply = self
      .replies
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned();

    match reply {
      Some(Reply::Respond(status, body)) => Ok(response(status, body)),
      Some(Reply::Delay(delay, status, body)) => {
        tokio::time::sleep(delay).await;
        Ok(response(status, body))
      }
      Some(Reply::Fail) | None => Err(eyre!("Connection refused: {}", request.url)),
    }
  }
}
