use async_trait::async_trait;
use color_eyre::Result;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::FetchStrategy;
use crate::cache::{CacheStorage, Partition};
use crate::net::{Network, Request, Response, ResponseSource};

/// Cache-first for shell assets.
///
/// 1. Cache hit - return it, no revalidation
/// 2. Miss - fetch, store a copy on 200
/// 3. Network failure - HTML requests get the shell's root document, anything else fails
///
/// HTML documents are keyed without their query string, so `/?date=...` deep
/// links all share the entry for `/`.
pub struct CacheFirst<S: CacheStorage> {
  partition: Partition<S>,
  network: Arc<dyn Network>,
  fallback_document: Url,
}

impl<S: CacheStorage> CacheFirst<S> {
  pub fn new(partition: Partition<S>, network: Arc<dyn Network>, fallback_document: Url) -> Self {
    Self {
      partition,
      network,
      fallback_document,
    }
  }
}

#[async_trait]
impl<S: CacheStorage + 'static> FetchStrategy for CacheFirst<S> {
  fn name(&self) -> &'static str {
    "cache-first"
  }

  async fn handle(&self, request: &Request) -> Result<Response> {
    let keyed = document_key(request);
    if let Some(hit) = self.partition.match_request(&keyed)? {
      return Ok(hit.response.to_response(ResponseSource::Cache));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          self.partition.put(&keyed, &response)?;
        }
        Ok(response)
      }
      Err(err) => {
        if request.accepts_html() {
          if let Some(root) = self.partition.match_url(&self.fallback_document)? {
            debug!(url = %request.url, "offline, serving shell document");
            return Ok(root.response.to_response(ResponseSource::Fallback));
          }
        }
        warn!(url = %request.url, "shell fetch failed: {}", err);
        Err(err)
      }
    }
  }
}

fn document_key(request: &Request) -> Cow<'_, Request> {
  if request.accepts_html() && request.url.query().is_some() {
    let mut stripped = request.clone();
    stripped.url.set_query(None);
    Cow::Owned(stripped)
  } else {
    Cow::Borrowed(request)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStore, MemoryStorage};
  use crate::net::fake::FakeNetwork;

  const ORIGIN: &str = "https://comics.example.org";

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  fn setup() -> (Arc<FakeNetwork>, CacheStore<MemoryStorage>, CacheFirst<MemoryStorage>) {
    let network = FakeNetwork::new();
    let store = CacheStore::new(MemoryStorage::new());
    let strategy = CacheFirst::new(store.open("shell").unwrap(), network.clone(), url("/"));
    (network, store, strategy)
  }

  #[tokio::test]
  async fn test_hit_never_touches_network() {
    let (network, store, strategy) = setup();
    let shell = store.open("shell").unwrap();
    shell
      .put(&Request::get(url("/main.css")), &Response::synthetic(200, "OK", "cached"))
      .unwrap();
    network.respond(url("/main.css").as_str(), 200, "fresh");

    let response = strategy.handle(&Request::get(url("/main.css"))).await.unwrap();
    assert_eq!(response.text(), "cached");
    assert_eq!(response.source, ResponseSource::Cache);
    assert!(network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_miss_stores_200() {
    let (network, store, strategy) = setup();
    network.respond(url("/main.js").as_str(), 200, "code");

    let response = strategy.handle(&Request::get(url("/main.js"))).await.unwrap();
    assert_eq!(response.text(), "code");
    assert_eq!(response.source, ResponseSource::Network);
    assert!(store
      .open("shell")
      .unwrap()
      .match_url(&url("/main.js"))
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_non_200_not_stored() {
    let (network, store, strategy) = setup();
    network.respond(url("/missing.js").as_str(), 404, "nope");

    let response = strategy.handle(&Request::get(url("/missing.js"))).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(store.open("shell").unwrap().len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_html_falls_back_to_root() {
    let (_network, store, strategy) = setup();
    store
      .open("shell")
      .unwrap()
      .put(&Request::get(url("/")), &Response::synthetic(200, "OK", "<html>app</html>"))
      .unwrap();

    let request = Request::get(url("/about")).with_header("accept", "text/html");
    let response = strategy.handle(&request).await.unwrap();
    assert_eq!(response.text(), "<html>app</html>");
    assert_eq!(response.source, ResponseSource::Fallback);
  }

  #[tokio::test]
  async fn test_query_variants_share_document_entry() {
    let (network, store, strategy) = setup();
    network.respond(url("/?date=2024-01-01").as_str(), 200, "<html>app</html>");

    let first = Request::get(url("/?date=2024-01-01")).with_header("accept", "text/html");
    assert_eq!(strategy.handle(&first).await.unwrap().source, ResponseSource::Network);

    let second = Request::get(url("/?date=2024-01-02")).with_header("accept", "text/html");
    let response = strategy.handle(&second).await.unwrap();
    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(response.text(), "<html>app</html>");

    let shell = store.open("shell").unwrap();
    assert_eq!(shell.len().unwrap(), 1);
    assert!(shell.match_url(&url("/")).unwrap().is_some());
    assert_eq!(network.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_query_kept_for_non_html() {
    let (network, store, strategy) = setup();
    network.respond(url("/main.js?v=1").as_str(), 200, "one");
    network.respond(url("/main.js?v=2").as_str(), 200, "two");

    strategy.handle(&Request::get(url("/main.js?v=1"))).await.unwrap();
    let response = strategy.handle(&Request::get(url("/main.js?v=2"))).await.unwrap();
    assert_eq!(response.text(), "two");
    assert_eq!(store.open("shell").unwrap().len().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_offline_non_html_propagates() {
    let (_network, store, strategy) = setup();
    store
      .open("shell")
      .unwrap()
      .put(&Request::get(url("/")), &Response::synthetic(200, "OK", "<html>app</html>"))
      .unwrap();

    assert!(strategy.handle(&Request::get(url("/app.js"))).await.is_err());
  }

  #[tokio::test]
  async fn test_offline_html_without_shell_propagates() {
    let (_network, _store, strategy) = setup();
    let request = Request::get(url("/")).with_header("accept", "text/html");
    assert!(strategy.handle(&request).await.is_err());
  }
}
