//! In-memory storage, used for `--ephemeral` runs and tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;

use super::traits::{CacheKey, CacheStorage, CachedEntry, StoredResponse};

/// Partitions kept in creation order, entries kept in insertion order.
#[derive(Default)]
pub struct MemoryStorage {
  partitions: Mutex<Vec<(String, Vec<CachedEntry>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn create_partition(&self, partition: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if !partitions.iter().any(|(name, _)| name == partition) {
      partitions.push((partition.to_string(), Vec::new()));
    }
    Ok(())
  }

  fn has_partition(&self, partition: &str) -> Result<bool> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.iter().any(|(name, _)| name == partition))
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.iter().map(|(name, _)| name.clone()).collect())
  }

  fn drop_partition(&self, partition: &str) -> Result<bool> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = partitions.len();
    partitions.retain(|(name, _)| name != partition);
    Ok(partitions.len() != before)
  }

  fn get_entry(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      partitions
        .iter()
        .find(|(name, _)| name == partition)
        .and_then(|(_, entries)| entries.iter().find(|e| &e.key == key))
        .cloned(),
    )
  }

  fn store_entry(&self, partition: &str, key: &CacheKey, response: &StoredResponse) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let index = match partitions.iter().position(|(name, _)| name == partition) {
      Some(index) => index,
      None => {
        partitions.push((partition.to_string(), Vec::new()));
        partitions.len() - 1
      }
    };

    let entries = &mut partitions[index].1;
    entries.retain(|e| &e.key != key);
    entries.push(CachedEntry {
      key: key.clone(),
      response: response.clone(),
      cached_at: Utc::now(),
    });
    Ok(())
  }

  fn remove_entry(&self, partition: &str, key: &CacheKey) -> Result<bool> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let Some((_, entries)) = partitions.iter_mut().find(|(name, _)| name == partition) else {
      return Ok(false);
    };
    let before = entries.len();
    entries.retain(|e| &e.key != key);
    Ok(entries.len() != before)
  }

  fn list_keys(&self, partition: &str) -> Result<Vec<CacheKey>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      partitions
        .iter()
        .find(|(name, _)| name == partition)
        .map(|(_, entries)| entries.iter().map(|e| e.key.clone()).collect())
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;
  use url::Url;

  fn key(path: &str) -> CacheKey {
    CacheKey::get(&Url::parse("https://example.com").unwrap().join(path).unwrap())
  }

  fn stored(body: &'static str) -> StoredResponse {
    StoredResponse {
      status: 200,
      status_text: "OK".to_string(),
      headers: Vec::new(),
      body: Bytes::from_static(body.as_bytes()),
    }
  }

  #[test]
  fn test_overwrite_moves_entry_to_back() {
    let storage = MemoryStorage::new();
    storage.store_entry("p", &key("/a"), &stored("1")).unwrap();
    storage.store_entry("p", &key("/b"), &stored("2")).unwrap();
    storage.store_entry("p", &key("/a"), &stored("3")).unwrap();
    assert_eq!(storage.list_keys("p").unwrap(), vec![key("/b"), key("/a")]);
  }

  #[test]
  fn test_store_creates_partition() {
    let storage = MemoryStorage::new();
    storage.store_entry("p", &key("/a"), &stored("1")).unwrap();
    assert!(storage.has_partition("p").unwrap());
  }

  #[test]
  fn test_drop_partition() {
    let storage = MemoryStorage::new();
    storage.create_partition("a").unwrap();
    storage.create_partition("b").unwrap();
    assert!(storage.drop_partition("a").unwrap());
    assert!(!storage.drop_partition("a").unwrap());
    assert_eq!(storage.partition_names().unwrap(), vec!["b"]);
  }
}
