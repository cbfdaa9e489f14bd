//! Core traits and types for the response cache.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::net::{Request, Response, ResponseSource};

/// Normalized request identity: method plus URL without fragment.
///
/// Only GET requests have a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  method: String,
  url: String,
}

impl CacheKey {
  /// Key for a GET of `url`.
  pub fn get(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: Method::GET.to_string(),
      url: url.into(),
    }
  }

  /// Key for a request, or None when the request is not cacheable.
  pub fn for_request(request: &Request) -> Option<Self> {
    (request.method == Method::GET).then(|| Self::get(&request.url))
  }

  /// Rebuild a key from its stored parts.
  pub fn from_parts(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 of the identity, used as a stable fixed-length storage key
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Frozen copy of a response as kept in a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl StoredResponse {
  /// Copy a response for storage. The body is shared, never consumed.
  pub fn freeze(response: &Response) -> Self {
    Self {
      status: response.status,
      status_text: response.status_text.clone(),
      headers: response.headers.clone(),
      body: response.body.clone(),
    }
  }

  /// Re-serve the stored response.
  pub fn to_response(&self, source: ResponseSource) -> Response {
    Response {
      status: self.status,
      status_text: self.status_text.clone(),
      headers: self.headers.clone(),
      body: self.body.clone(),
      source,
    }
  }
}

/// A single cached entry.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub key: CacheKey,
  pub response: StoredResponse,
  /// When the entry was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Backends only store and order entries. Eviction is decided by callers.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn create_partition(&self, partition: &str) -> Result<()>;

  /// Whether a partition with this name exists.
  fn has_partition(&self, partition: &str) -> Result<bool>;

  /// Names of all partitions, in creation order.
  fn partition_names(&self) -> Result<Vec<String>>;

  /// Remove a partition and every entry in it. Returns false if it did not exist.
  fn drop_partition(&self, partition: &str) -> Result<bool>;

  /// Exact key lookup.
  fn get_entry(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

  /// Insert or overwrite. An overwrite moves the entry to the end of the insertion order.
  fn store_entry(&self, partition: &str, key: &CacheKey, response: &StoredResponse) -> Result<()>;

  /// Remove an entry. Returns false if it was not present.
  fn remove_entry(&self, partition: &str, key: &CacheKey) -> Result<bool>;

  /// Keys in insertion order, oldest first.
  fn list_keys(&self, partition: &str) -> Result<Vec<CacheKey>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_strips_fragment() {
    let a = CacheKey::get(&Url::parse("https://example.com/app.js#v2").unwrap());
    let b = CacheKey::get(&Url::parse("https://example.com/app.js").unwrap());
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
  }

  #[test]
  fn test_key_keeps_query() {
    let a = CacheKey::get(&Url::parse("https://example.com/?date=2024-01-01").unwrap());
    let b = CacheKey::get(&Url::parse("https://example.com/").unwrap());
    assert_ne!(a, b);
  }

  #[test]
  fn test_post_has_no_key() {
    let mut req = Request::get(Url::parse("https://example.com/api").unwrap());
    req.method = Method::POST;
    assert!(CacheKey::for_request(&req).is_none());
  }

  #[test]
  fn test_display() {
    let key = CacheKey::get(&Url::parse("https://example.com/a.png").unwrap());
    assert_eq!(key.to_string(), "GET https://example.com/a.png");
  }
}
