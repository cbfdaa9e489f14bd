//! Fetch strategies and the router that picks one per request.
//!
//! Three policies mediate every intercepted same-origin GET:
//! - Shell assets: cache-first
//! - Images: cache-first with a FIFO entry bound
//! - Everything else: network-first, bounded cache as offline fallback

mod bounded;
mod cache_first;
mod eviction;
mod network_first;

use async_trait::async_trait;
use color_eyre::Result;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub use bounded::BoundedCacheFirst;
pub use cache_first::CacheFirst;
pub use network_first::NetworkFirst;

use crate::cache::{CacheNames, CacheStorage, CacheStore};
use crate::config::Config;
use crate::net::{Destination, Network, Request, Response};

/// A caching policy for one class of resources.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
  /// Short name for logs
  fn name(&self) -> &'static str;

  /// Produce a response for the request, consulting cache and network as the policy dictates.
  async fn handle(&self, request: &Request) -> Result<Response>;
}

/// Resource classes, each with its own partition and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
  Shell,
  Image,
  Runtime,
}

const SHELL_EXTENSIONS: &[&str] = &["html", "htm", "css", "js", "mjs", "svg", "webmanifest"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "ico"];

impl ResourceClass {
  /// Classify by declared destination, then by whether the client wants HTML,
  /// falling back to the path's extension.
  pub fn of(request: &Request) -> Self {
    match request.destination {
      Some(Destination::Document | Destination::Style | Destination::Script | Destination::Manifest) => {
        return Self::Shell;
      }
      // Vector icons belong to the shell even when loaded as images
      Some(Destination::Image) if extension(&request.url).as_deref() != Some("svg") => {
        return Self::Image;
      }
      _ => {}
    }

    // Navigations to client-side routes are answered by the shell
    if request.accepts_html() {
      return Self::Shell;
    }

    let path = request.url.path();
    if path.ends_with('/') || path.ends_with("manifest.json") {
      return Self::Shell;
    }

    match extension(&request.url).as_deref() {
      Some(ext) if SHELL_EXTENSIONS.contains(&ext) => Self::Shell,
      Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Self::Image,
      _ => Self::Runtime,
    }
  }
}

fn extension(url: &Url) -> Option<String> {
  let last = url.path_segments()?.next_back()?;
  let (_, ext) = last.rsplit_once('.')?;
  Some(ext.to_ascii_lowercase())
}

/// Maps each request to the strategy for its resource class.
///
/// Requests that are not GET or not same-origin bypass every strategy and go
/// straight to the network.
pub struct FetchRouter {
  origin: Url,
  network: Arc<dyn Network>,
  routes: HashMap<ResourceClass, Box<dyn FetchStrategy>>,
}

impl FetchRouter {
  pub fn new(origin: Url, network: Arc<dyn Network>) -> Self {
    Self {
      origin,
      network,
      routes: HashMap::new(),
    }
  }

  /// Register (or replace) the strategy for a class.
  pub fn route(mut self, class: ResourceClass, strategy: impl FetchStrategy + 'static) -> Self {
    self.routes.insert(class, Box::new(strategy));
    self
  }

  /// Router with the standard policies over the current-generation partitions.
  pub fn standard<S: CacheStorage + 'static>(
    store: &CacheStore<S>,
    names: &CacheNames,
    config: &Config,
    network: Arc<dyn Network>,
  ) -> Result<Self> {
    let fallback = config.app.resolve(&config.app.fallback_document)?;

    Ok(
      Self::new(config.app.origin.clone(), Arc::clone(&network))
        .route(
          ResourceClass::Shell,
          CacheFirst::new(store.open(&names.shell)?, Arc::clone(&network), fallback),
        )
        .route(
          ResourceClass::Image,
          BoundedCacheFirst::new(
            store.open(&names.images)?,
            Arc::clone(&network),
            config.cache.image_max_entries,
          ),
        )
        .route(
          ResourceClass::Runtime,
          NetworkFirst::new(
            store.open(&names.runtime)?,
            network,
            config.cache.runtime_max_entries,
          ),
        ),
    )
  }

  fn intercepts(&self, request: &Request) -> bool {
    request.method == Method::GET && request.url.origin() == self.origin.origin()
  }

  pub async fn handle(&self, request: &Request) -> Result<Response> {
    if !self.intercepts(request) {
      debug!(method = %request.method, url = %request.url, "passthrough");
      return self.network.fetch(request).await;
    }

    let class = ResourceClass::of(request);
    match self.routes.get(&class) {
      Some(strategy) => {
        debug!(url = %request.url, ?class, strategy = strategy.name(), "routing");
        strategy.handle(request).await
      }
      None => self.network.fetch(request).await,
    }
  }
}
