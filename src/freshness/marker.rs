use bytes::Bytes;
use chrono::NaiveDate;
use color_eyre::Result;
use tracing::warn;
use url::Url;

use crate::cache::{CacheKey, CacheStorage, Partition, StoredResponse};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The last date a new-comic notification went out, kept as a plain
/// `YYYY-MM-DD` entry in the shell partition. Rotating the shell generation
/// clears it.
pub struct MarkerStore<S: CacheStorage> {
  partition: Partition<S>,
  key: CacheKey,
}

impl<S: CacheStorage> MarkerStore<S> {
  pub fn new(partition: Partition<S>, marker_url: &Url) -> Self {
    Self {
      partition,
      key: CacheKey::get(marker_url),
    }
  }

  /// Read the marker. An unreadable value counts as never notified.
  pub fn read(&self) -> Result<Option<NaiveDate>> {
    let Some(entry) = self.partition.match_key(&self.key)? else {
      return Ok(None);
    };

    let text = String::from_utf8_lossy(&entry.response.body);
    match NaiveDate::parse_from_str(text.trim(), DATE_FORMAT) {
      Ok(date) => Ok(Some(date)),
      Err(e) => {
        warn!("Ignoring unreadable last-notified marker '{}': {}", text, e);
        Ok(None)
      }
    }
  }

  pub fn write(&self, date: NaiveDate) -> Result<()> {
    let response = StoredResponse {
      status: 200,
      status_text: "OK".to_string(),
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: Bytes::from(date.format(DATE_FORMAT).to_string()),
    };
    self.partition.put_key(&self.key, &response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStore, MemoryStorage};

  fn marker_url() -> Url {
    Url::parse("http://localhost:8080/__last-notified").unwrap()
  }

  #[test]
  fn test_empty_marker_reads_none() {
    let store = CacheStore::new(MemoryStorage::new());
    let marker = MarkerStore::new(store.open("shell").unwrap(), &marker_url());
    assert_eq!(marker.read().unwrap(), None);
  }

  #[test]
  fn test_write_then_read() {
    let store = CacheStore::new(MemoryStorage::new());
    let shell = store.open("shell").unwrap();
    let marker = MarkerStore::new(shell.clone(), &marker_url());
    let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

    marker.write(date).unwrap();
    assert_eq!(marker.read().unwrap(), Some(date));

    // Stored as a plain date string
    let entry = shell.match_url(&marker_url()).unwrap().unwrap();
    assert_eq!(entry.response.body.as_ref(), b"2024-03-09");
  }

  #[test]
  fn test_garbage_marker_reads_none() {
    let store = CacheStore::new(MemoryStorage::new());
    let shell = store.open("shell").unwrap();
    shell
      .put_key(
        &CacheKey::get(&marker_url()),
        &StoredResponse {
          status: 200,
          status_text: "OK".to_string(),
          headers: Vec::new(),
          body: Bytes::from_static(b"yesterday"),
        },
      )
      .unwrap();
    let marker = MarkerStore::new(shell, &marker_url());
    assert_eq!(marker.read().unwrap(), None);
  }

  #[test]
  fn test_rotation_clears_marker() {
    let store = CacheStore::new(MemoryStorage::new());
    let marker = MarkerStore::new(store.open("app-shell-v1").unwrap(), &marker_url());
    marker.write(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()).unwrap();

    store.delete("app-shell-v1").unwrap();
    let fresh = MarkerStore::new(store.open("app-shell-v2").unwrap(), &marker_url());
    assert_eq!(fresh.read().unwrap(), None);
  }
}
