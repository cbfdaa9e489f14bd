//! The worker: routes host events to the cache, lifecycle and freshness components.
//!
//! Top-level handlers never return errors, with one exception: a failed fetch
//! is the request's own failure and goes back to the caller.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheNames, CacheStorage, CacheStore};
use crate::config::Config;
use crate::freshness::{CheckOutcome, Clock, FreshnessMonitor, MarkerStore, SystemClock, PERIODIC_TAG};
use crate::lifecycle::{ClientRegistry, LifecycleManager, LifecycleState};
use crate::net::{HttpClient, Network, Request, Response};
use crate::notify::{CommandNotifier, Notification, NotificationAction, Notifier, StdoutNotifier};
use crate::strategy::FetchRouter;

/// Path of the last-notified marker inside the shell partition
const MARKER_PATH: &str = "/__last-notified";

/// Messages a page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  SkipWaiting,
  CheckNewComic,
}

impl ClientMessage {
  pub fn parse(raw: &str) -> Result<Self> {
    serde_json::from_str(raw).map_err(|e| eyre!("Invalid message '{}': {}", raw.trim(), e))
  }
}

/// External collaborators, swapped for fakes in tests.
pub struct Services {
  pub network: Arc<dyn Network>,
  pub notifier: Arc<dyn Notifier>,
  pub clock: Arc<dyn Clock>,
}

impl Services {
  /// Real network, configured notifier and the system clock.
  pub fn from_config(config: &Config) -> Result<Self> {
    let network = HttpClient::new(concat!("strip-worker/", env!("CARGO_PKG_VERSION")))?;
    let notifier: Arc<dyn Notifier> = match &config.freshness.notify_command {
      Some(argv) => Arc::new(CommandNotifier::new(argv.clone())?),
      None => Arc::new(StdoutNotifier),
    };

    Ok(Self {
      network: Arc::new(network),
      notifier,
      clock: Arc::new(SystemClock),
    })
  }
}

pub struct Worker<S: CacheStorage> {
  store: CacheStore<S>,
  names: CacheNames,
  skip_waiting: bool,
  router: FetchRouter,
  monitor: FreshnessMonitor<S>,
  lifecycle: LifecycleManager<S>,
  clients: Arc<ClientRegistry>,
}

impl<S: CacheStorage + 'static> Worker<S> {
  pub fn new(config: &Config, storage: S, services: Services) -> Result<Self> {
    let store = CacheStore::new(storage);
    let names = config.app.cache_names();
    let clients = Arc::new(ClientRegistry::default());

    let router = FetchRouter::standard(&store, &names, config, Arc::clone(&services.network))?;

    let marker = MarkerStore::new(store.open(&names.shell)?, &config.app.resolve(MARKER_PATH)?);
    let monitor = FreshnessMonitor::new(
      config.freshness.clone(),
      config.app.resolve(&config.app.fallback_document)?,
      marker,
      Arc::clone(&services.network),
      services.notifier,
      services.clock,
    );

    let precache = config
      .app
      .precache
      .iter()
      .map(|path| config.app.resolve(path))
      .collect::<Result<Vec<_>>>()?;
    let lifecycle = LifecycleManager::new(
      store.clone(),
      names.clone(),
      &config.app.version,
      services.network,
      precache,
      Arc::clone(&clients),
    );
    lifecycle.resume()?;

    Ok(Self {
      store,
      names,
      skip_waiting: config.app.skip_waiting,
      router,
      monitor,
      lifecycle,
      clients,
    })
  }

  pub fn store(&self) -> &CacheStore<S> {
    &self.store
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn clients(&self) -> &ClientRegistry {
    &self.clients
  }

  pub fn state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  /// Install event. Returns whether the install committed.
  pub async fn on_install(&self) -> bool {
    if let Err(e) = self.lifecycle.install().await {
      warn!("Install failed, will retry on next attempt: {:#}", e);
      return false;
    }
    if self.skip_waiting {
      self.on_activate().await;
    } else {
      info!("installed, waiting for SKIP_WAITING");
    }
    true
  }

  /// Activate event: purge stale generations, then claim clients.
  pub async fn on_activate(&self) -> bool {
    match self.lifecycle.skip_waiting().await {
      Ok(()) => true,
      Err(e) => {
        warn!("Activation failed: {:#}", e);
        false
      }
    }
  }

  /// Fetch event for an intercepted request.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
    self.router.handle(request).await
  }

  pub async fn on_message(&self, message: ClientMessage) {
    debug!(?message, "message received");
    match message {
      ClientMessage::SkipWaiting => {
        self.on_activate().await;
      }
      ClientMessage::CheckNewComic => {
        self.monitor.check_for_new_comic().await;
      }
    }
  }

  /// Periodic background trigger. Unknown tags are ignored.
  pub async fn on_periodic_sync(&self, tag: &str) -> Option<CheckOutcome> {
    if tag != PERIODIC_TAG {
      debug!(tag, "ignoring periodic sync");
      return None;
    }
    Some(self.monitor.check_for_new_comic().await)
  }

  /// Run a freshness check outside any schedule.
  pub async fn check_now(&self) -> CheckOutcome {
    self.monitor.check_for_new_comic().await
  }

  /// The notification a successful check would show for `date`.
  pub fn notification_for(&self, date: NaiveDate) -> Notification {
    self.monitor.notification(date)
  }

  /// Notification click: the URL to open, if any.
  pub fn on_notification_click(
    &self,
    notification: &Notification,
    action: Option<NotificationAction>,
  ) -> Option<Url> {
    let target = notification.click_target(action).cloned();
    debug!(?action, target = ?target.as_ref().map(Url::as_str), "notification clicked");
    target
  }
}
