//! Install, activation and client claiming.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheNames, CacheStorage, CacheStore};
use crate::net::{Network, Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Nothing attempted yet
  Parsed,
  Installing,
  /// Installed, waiting to be activated
  Installed,
  Activating,
  Activated,
  /// Install failed; the next install attempt starts over
  Redundant,
}

/// Pages connected to the worker and the version controlling each.
#[derive(Default)]
pub struct ClientRegistry {
  clients: Mutex<BTreeMap<String, Option<String>>>,
}

impl ClientRegistry {
  pub fn connect(&self, id: &str) -> Result<()> {
    let mut clients = self
      .clients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    clients.entry(id.to_string()).or_insert(None);
    Ok(())
  }

  /// Take control of every connected client. Returns how many changed hands.
  pub fn claim(&self, version: &str) -> Result<usize> {
    let mut clients = self
      .clients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut claimed = 0;
    for controller in clients.values_mut() {
      if controller.as_deref() != Some(version) {
        *controller = Some(version.to_string());
        claimed += 1;
      }
    }
    Ok(claimed)
  }

  #[allow(dead_code)]
  pub fn controller(&self, id: &str) -> Result<Option<String>> {
    let clients = self
      .clients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(clients.get(id).cloned().flatten())
  }
}

pub struct LifecycleManager<S: CacheStorage> {
  store: CacheStore<S>,
  names: CacheNames,
  version: String,
  network: Arc<dyn Network>,
  precache: Vec<Url>,
  clients: Arc<ClientRegistry>,
  state: Mutex<LifecycleState>,
}

impl<S: CacheStorage> LifecycleManager<S> {
  pub fn new(
    store: CacheStore<S>,
    names: CacheNames,
    version: &str,
    network: Arc<dyn Network>,
    precache: Vec<Url>,
    clients: Arc<ClientRegistry>,
  ) -> Self {
    Self {
      store,
      names,
      version: version.to_string(),
      network,
      precache,
      clients,
      state: Mutex::new(LifecycleState::Parsed),
    }
  }

  pub fn state(&self) -> LifecycleState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(LifecycleState::Redundant)
  }

  fn set_state(&self, state: LifecycleState) -> Result<()> {
    let mut current = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = state;
    Ok(())
  }

  /// Pick up an install left by an earlier process: if the current shell
  /// generation already holds every precache asset, the worker is installed.
  pub fn resume(&self) -> Result<LifecycleState> {
    if self.state() != LifecycleState::Parsed || !self.store.has(&self.names.shell)? {
      return Ok(self.state());
    }

    let shell = self.store.open(&self.names.shell)?;
    for url in &self.precache {
      if shell.match_url(url)?.is_none() {
        return Ok(self.state());
      }
    }

    self.set_state(LifecycleState::Installed)?;
    Ok(LifecycleState::Installed)
  }

  /// Precache the shell, all or nothing.
  ///
  /// Every asset is fetched before anything is written, so a single failure
  /// leaves the shell partition as it was.
  pub async fn install(&self) -> Result<()> {
    self.set_state(LifecycleState::Installing)?;

    match self.precache_shell().await {
      Ok(count) => {
        info!(version = %self.version, assets = count, "installed");
        self.set_state(LifecycleState::Installed)
      }
      Err(e) => {
        self.set_state(LifecycleState::Redundant)?;
        Err(e)
      }
    }
  }

  async fn precache_shell(&self) -> Result<usize> {
    let shell = self.store.open(&self.names.shell)?;

    let fetches = self.precache.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self.network.fetch(&request).await?;
      if response.status != 200 {
        return Err(eyre!("Precache of {} returned {}", url, response.status));
      }
      Ok::<(Request, Response), color_eyre::Report>((request, response))
    });
    let fetched = try_join_all(fetches).await?;

    for (request, response) in &fetched {
      shell.put(request, response)?;
    }
    Ok(fetched.len())
  }

  /// Delete stale generations of our partitions. Returns the deleted names.
  pub async fn activate(&self) -> Result<Vec<String>> {
    match self.state() {
      LifecycleState::Installed | LifecycleState::Activated => {}
      other => return Err(eyre!("Cannot activate from {:?}", other)),
    }
    self.set_state(LifecycleState::Activating)?;

    let mut deleted = Vec::new();
    for name in self.store.names()? {
      if self.names.is_stale(&name) {
        if self.store.delete(&name)? {
          info!(partition = %name, "deleted stale cache generation");
          deleted.push(name);
        } else {
          warn!(partition = %name, "stale cache generation vanished before delete");
        }
      }
    }

    self.set_state(LifecycleState::Activated)?;
    Ok(deleted)
  }

  /// Control every open client now instead of on their next load.
  pub fn claim(&self) -> Result<usize> {
    if self.state() != LifecycleState::Activated {
      return Err(eyre!("Cannot claim clients before activation"));
    }
    let claimed = self.clients.claim(&self.version)?;
    info!(version = %self.version, claimed, "claimed clients");
    Ok(claimed)
  }

  /// Activate and claim immediately, without waiting for old clients to close.
  pub async fn skip_waiting(&self) -> Result<()> {
    self.activate().await?;
    self.claim()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::net::fake::FakeNetwork;

  const ASSETS: &[&str] = &["/", "/main.css", "/main.js"];

  fn url(path: &str) -> Url {
    Url::parse("http://localhost:8080/").unwrap().join(path).unwrap()
  }

  fn manager(
    network: Arc<FakeNetwork>,
    store: CacheStore<MemoryStorage>,
    clients: Arc<ClientRegistry>,
  ) -> LifecycleManager<MemoryStorage> {
    LifecycleManager::new(
      store,
      CacheNames::new("app", "v2"),
      "v2",
      network,
      ASSETS.iter().map(|p| url(p)).collect(),
      clients,
    )
  }

  #[tokio::test]
  async fn test_install_precaches_shell() {
    let network = FakeNetwork::new();
    for asset in ASSETS {
      network.respond(url(asset).as_str(), 200, asset);
    }
    let store = CacheStore::new(MemoryStorage::new());
    let lifecycle = manager(network, store.clone(), Arc::default());

    lifecycle.install().await.unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Installed);
    assert_eq!(store.open("app-shell-v2").unwrap().len().unwrap(), 3);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let network = FakeNetwork::new();
    network.respond(url("/").as_str(), 200, "root");
    network.respond(url("/main.css").as_str(), 200, "css");
    network.fail(url("/main.js").as_str());
    let store = CacheStore::new(MemoryStorage::new());
    let lifecycle = manager(network.clone(), store.clone(), Arc::default());

    assert!(lifecycle.install().await.is_err());
    assert_eq!(lifecycle.state(), LifecycleState::Redundant);
    assert_eq!(store.open("app-shell-v2").unwrap().len().unwrap(), 0);

    // Next attempt succeeds once the asset is reachable
    network.respond(url("/main.js").as_str(), 200, "js");
    lifecycle.install().await.unwrap();
    assert_eq!(store.open("app-shell-v2").unwrap().len().unwrap(), 3);
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let network = FakeNetwork::new();
    network.respond(url("/").as_str(), 200, "root");
    network.respond(url("/main.css").as_str(), 404, "");
    network.respond(url("/main.js").as_str(), 200, "js");
    let store = CacheStore::new(MemoryStorage::new());
    let lifecycle = manager(network, store.clone(), Arc::default());

    assert!(lifecycle.install().await.is_err());
    assert_eq!(store.open("app-shell-v2").unwrap().len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_activate_deletes_only_stale_generations() {
    let network = FakeNetwork::new();
    for asset in ASSETS {
      network.respond(url(asset).as_str(), 200, asset);
    }
    let store = CacheStore::new(MemoryStorage::new());
    store.open("app-shell-v1").unwrap();
    store.open("unrelated-cache").unwrap();
    let lifecycle = manager(network, store.clone(), Arc::default());

    lifecycle.install().await.unwrap();
    let deleted = lifecycle.activate().await.unwrap();

    assert_eq!(deleted, vec!["app-shell-v1"]);
    assert_eq!(store.names().unwrap(), vec!["unrelated-cache", "app-shell-v2"]);
    assert_eq!(lifecycle.state(), LifecycleState::Activated);
  }

  #[tokio::test]
  async fn test_resume_after_previous_install() {
    let network = FakeNetwork::new();
    for asset in ASSETS {
      network.respond(url(asset).as_str(), 200, asset);
    }
    let store = CacheStore::new(MemoryStorage::new());
    manager(network.clone(), store.clone(), Arc::default())
      .install()
      .await
      .unwrap();

    let restarted = manager(network, store, Arc::default());
    assert_eq!(restarted.resume().unwrap(), LifecycleState::Installed);
    restarted.activate().await.unwrap();
  }

  #[test]
  fn test_resume_with_partial_shell_stays_parsed() {
    let store = CacheStore::new(MemoryStorage::new());
    store
      .open("app-shell-v2")
      .unwrap()
      .put(&Request::get(url("/")), &Response::synthetic(200, "OK", "root"))
      .unwrap();
    let lifecycle = manager(FakeNetwork::new(), store, Arc::default());
    assert_eq!(lifecycle.resume().unwrap(), LifecycleState::Parsed);
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let store = CacheStore::new(MemoryStorage::new());
    let lifecycle = manager(FakeNetwork::new(), store, Arc::default());
    assert!(lifecycle.activate().await.is_err());
    assert!(lifecycle.claim().is_err());
  }

  #[tokio::test]
  async fn test_skip_waiting_claims_clients() {
    let network = FakeNetwork::new();
    for asset in ASSETS {
      network.respond(url(asset).as_str(), 200, asset);
    }
    let clients = Arc::new(ClientRegistry::default());
    clients.connect("tab-1").unwrap();
    clients.connect("tab-2").unwrap();
    let lifecycle = manager(network, CacheStore::new(MemoryStorage::new()), clients.clone());

    lifecycle.install().await.unwrap();
    lifecycle.skip_waiting().await.unwrap();

    assert_eq!(clients.controller("tab-1").unwrap().as_deref(), Some("v2"));
    assert_eq!(clients.controller("tab-2").unwrap().as_deref(), Some("v2"));
    // Already controlled, nothing changes hands
    assert_eq!(lifecycle.claim().unwrap(), 0);
  }
}
