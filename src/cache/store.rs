//! Named partitions over a storage backend.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::traits::{CacheKey, CacheStorage, CachedEntry, StoredResponse};
use crate::net::{Request, Response};

/// Entry point to the cache: opens, lists and deletes partitions.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Open a partition, creating it if absent. Idempotent.
  pub fn open(&self, name: &str) -> Result<Partition<S>> {
    self.storage.create_partition(name)?;
    Ok(Partition {
      name: name.to_string(),
      storage: Arc::clone(&self.storage),
    })
  }

  pub fn has(&self, name: &str) -> Result<bool> {
    self.storage.has_partition(name)
  }

  pub fn names(&self) -> Result<Vec<String>> {
    self.storage.partition_names()
  }

  /// Delete a whole partition. Returns false if there was nothing to delete.
  pub fn delete(&self, name: &str) -> Result<bool> {
    self.storage.drop_partition(name)
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// Handle to one named partition.
pub struct Partition<S: CacheStorage> {
  name: String,
  storage: Arc<S>,
}

impl<S: CacheStorage> Partition<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Exact lookup. Non-GET requests always miss.
  pub fn match_request(&self, request: &Request) -> Result<Option<CachedEntry>> {
    match CacheKey::for_request(request) {
      Some(key) => self.match_key(&key),
      None => Ok(None),
    }
  }

  /// Lookup of a GET for `url`.
  pub fn match_url(&self, url: &Url) -> Result<Option<CachedEntry>> {
    self.match_key(&CacheKey::get(url))
  }

  pub fn match_key(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let entry = self.storage.get_entry(&self.name, key)?;
    debug!(
      partition = %self.name,
      key = %key,
      hit = entry.is_some(),
      "cache lookup"
    );
    Ok(entry)
  }

  /// Store a frozen copy of `response` under the request's key.
  pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
    let key = CacheKey::for_request(request)
      .ok_or_else(|| eyre!("Cannot cache {} request for {}", request.method, request.url))?;
    self.put_key(&key, &StoredResponse::freeze(response))
  }

  pub fn put_key(&self, key: &CacheKey, response: &StoredResponse) -> Result<()> {
    self.storage.store_entry(&self.name, key, response)
  }

  #[allow(dead_code)]
  pub fn delete(&self, request: &Request) -> Result<bool> {
    match CacheKey::for_request(request) {
      Some(key) => self.delete_key(&key),
      None => Ok(false),
    }
  }

  pub fn delete_key(&self, key: &CacheKey) -> Result<bool> {
    self.storage.remove_entry(&self.name, key)
  }

  /// Keys in insertion order, oldest first.
  pub fn keys(&self) -> Result<Vec<CacheKey>> {
    self.storage.list_keys(&self.name)
  }

  /// Entries in insertion order, oldest first.
  pub fn entries(&self) -> Result<Vec<CachedEntry>> {
    let mut entries = Vec::new();
    for key in self.keys()? {
      if let Some(entry) = self.storage.get_entry(&self.name, &key)? {
        entries.push(entry);
      }
    }
    Ok(entries)
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.keys()?.len())
  }
}

impl<S: CacheStorage> Clone for Partition<S> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      storage: Arc::clone(&self.storage),
    }
  }
}
