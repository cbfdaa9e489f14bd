use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use super::eviction::make_room;
use super::FetchStrategy;
use crate::cache::{CacheStorage, Partition};
use crate::net::{Network, Request, Response, ResponseSource};

/// Cache-first with a FIFO entry bound, for comic images.
///
/// Never fails on a network error: the caller gets a synthetic 503 instead.
pub struct BoundedCacheFirst<S: CacheStorage> {
  partition: Partition<S>,
  network: Arc<dyn Network>,
  max_entries: usize,
}

impl<S: CacheStorage> BoundedCacheFirst<S> {
  pub fn new(partition: Partition<S>, network: Arc<dyn Network>, max_entries: usize) -> Self {
    Self {
      partition,
      network,
      max_entries,
    }
  }
}

#[async_trait]
impl<S: CacheStorage + 'static> FetchStrategy for BoundedCacheFirst<S> {
  fn name(&self) -> &'static str {
    "cache-first-bounded"
  }

  async fn handle(&self, request: &Request) -> Result<Response> {
    if let Some(hit) = self.partition.match_request(request)? {
      return Ok(hit.response.to_response(ResponseSource::Cache));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          make_room(&self.partition, self.max_entries)?;
          self.partition.put(request, &response)?;
        }
        Ok(response)
      }
      Err(err) => {
        debug!(url = %request.url, "image unavailable: {}", err);
        Ok(Response::synthetic(
          503,
          "Service Unavailable",
          "Image unavailable offline",
        ))
      }
    }
  }
}
