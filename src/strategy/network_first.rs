use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use super::eviction::make_room;
use super::FetchStrategy;
use crate::cache::{CacheStorage, Partition};
use crate::net::{Network, Request, Response, ResponseSource};

/// Network-first with a bounded cache as the offline fallback.
///
/// 1. Always try the network; refresh the cache on 200
/// 2. On network failure, return the cached copy (offline mode)
/// 3. Nothing cached - propagate the failure
pub struct NetworkFirst<S: CacheStorage> {
  partition: Partition<S>,
  network: Arc<dyn Network>,
  max_entries: usize,
}

impl<S: CacheStorage> NetworkFirst<S> {
  pub fn new(partition: Partition<S>, network: Arc<dyn Network>, max_entries: usize) -> Self {
    Self {
      partition,
      network,
      max_entries,
    }
  }
}

#[async_trait]
impl<S: CacheStorage + 'static> FetchStrategy for NetworkFirst<S> {
  fn name(&self) -> &'static str {
    "network-first"
  }

  async fn handle(&self, request: &Request) -> Result<Response> {
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          make_room(&self.partition, self.max_entries)?;
          self.partition.put(request, &response)?;
        }
        Ok(response)
      }
      Err(err) => match self.partition.match_request(request)? {
        Some(cached) => {
          debug!(url = %request.url, "network failed, serving cached copy");
          Ok(cached.response.to_response(ResponseSource::Offline))
        }
        None => {
          warn!(url = %request.url, "fetch failed with nothing cached: {}", err);
          Err(err)
        }
      },
    }
  }
}
