//! Request and response types passed between the worker, the cache and the network.

use bytes::Bytes;
use clap::ValueEnum;
use reqwest::Method;
use std::borrow::Cow;
use url::Url;

/// What the requesting page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Destination {
  Document,
  Style,
  Script,
  Image,
  Manifest,
  Other,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub destination: Option<Destination>,
}

impl Request {
  /// Create a GET request with no headers.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      destination: None,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = Some(destination);
    self
  }

  /// Case-insensitive header lookup, first match wins.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the client would take an HTML document in reply.
  pub fn accepts_html(&self) -> bool {
    self.destination == Some(Destination::Document)
      || self
        .header("accept")
        .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Served from a cache partition without touching the network
  Cache,
  /// Network unavailable, serving a previously cached copy
  Offline,
  /// Network unavailable, serving the shell's root document instead
  Fallback,
  /// Built locally because nothing else was available
  Synthetic,
}

/// A response as seen by the caller.
///
/// The body is reference-counted, so cloning a response to store it leaves the
/// caller's copy readable.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
  pub source: ResponseSource,
}

impl Response {
  /// Build a response that never touched the network.
  pub fn synthetic(status: u16, status_text: &str, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      status_text: status_text.to_string(),
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: body.into(),
      source: ResponseSource::Synthetic,
    }
  }

  /// True for any 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Body decoded as UTF-8, replacing invalid sequences.
  pub fn text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_accepts_html_from_header() {
    let req = Request::get(url("https://example.com/about"))
      .with_header("Accept", "text/html,application/xhtml+xml");
    assert!(req.accepts_html());
  }

  #[test]
  fn test_accepts_html_from_destination() {
    let req = Request::get(url("https://example.com/")).with_destination(Destination::Document);
    assert!(req.accepts_html());
  }

  #[test]
  fn test_json_request_does_not_accept_html() {
    let req = Request::get(url("https://example.com/api")).with_header("accept", "application/json");
    assert!(!req.accepts_html());
  }

  #[test]
  fn test_ok_range() {
    assert!(Response::synthetic(204, "No Content", "").ok());
    assert!(!Response::synthetic(304, "Not Modified", "").ok());
    assert!(!Response::synthetic(503, "Service Unavailable", "").ok());
  }
}
