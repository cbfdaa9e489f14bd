//! New-comic detection.
//!
//! A check fetches the publisher's page for today (US Eastern), decides from
//! its text whether the strip is live, and notifies at most once per day. The
//! last notified date is persisted before the notification goes out, so a
//! crash in between skips a notification instead of repeating one.

mod clock;
mod detect;
mod marker;

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub use clock::{Clock, SystemClock};
pub use detect::ComicSignals;
pub use marker::MarkerStore;

use crate::cache::CacheStorage;
use crate::config::{FreshnessConfig, ProxyConfig};
use crate::net::{Network, Request};
use crate::notify::{Notification, Notifier};

/// Tag of the periodic background trigger
pub const PERIODIC_TAG: &str = "check-new-comic";

/// What a check concluded. There is no error variant the caller must handle;
/// failures are logged and reported as `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
  /// Marker already holds today's date
  AlreadyNotified(NaiveDate),
  /// Too close to midnight Eastern to trust the page
  RolloverWindow,
  /// Neither the direct nor the proxied fetch produced a page
  Unreachable(NaiveDate),
  /// Page fetched but the comic is not (unambiguously) there
  NotYetPublished(NaiveDate),
  /// Marker written and notification sent
  Notified(NaiveDate),
  /// Something went wrong; see logs
  Failed,
}

pub struct FreshnessMonitor<S: CacheStorage> {
  network: Arc<dyn Network>,
  marker: MarkerStore<S>,
  notifier: Arc<dyn Notifier>,
  clock: Arc<dyn Clock>,
  signals: ComicSignals,
  config: FreshnessConfig,
  app_root: Url,
}

impl<S: CacheStorage> FreshnessMonitor<S> {
  pub fn new(
    config: FreshnessConfig,
    app_root: Url,
    marker: MarkerStore<S>,
    network: Arc<dyn Network>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      network,
      marker,
      notifier,
      clock,
      signals: ComicSignals::from_config(&config),
      config,
      app_root,
    }
  }

  /// Run one check. Never fails; the outcome is for logging and tests.
  pub async fn check_for_new_comic(&self) -> CheckOutcome {
    match self.try_check().await {
      Ok(outcome) => {
        info!(?outcome, "new comic check finished");
        outcome
      }
      Err(e) => {
        warn!("New comic check failed: {:#}", e);
        CheckOutcome::Failed
      }
    }
  }

  async fn try_check(&self) -> Result<CheckOutcome> {
    let eastern = clock::publisher_time(self.clock.now());
    let today = eastern.date_naive();

    if self.marker.read()? == Some(today) {
      return Ok(CheckOutcome::AlreadyNotified(today));
    }

    if clock::in_rollover_window(&eastern) {
      return Ok(CheckOutcome::RolloverWindow);
    }

    let Some(page) = self.fetch_page(today).await? else {
      return Ok(CheckOutcome::Unreachable(today));
    };

    if !self.signals.is_available(&page) {
      return Ok(CheckOutcome::NotYetPublished(today));
    }

    self.marker.write(today)?;
    let notification = self.notification(today);
    self.notifier.notify(&notification).await?;

    Ok(CheckOutcome::Notified(today))
  }

  /// The notification announcing the comic for `date`.
  pub fn notification(&self, date: NaiveDate) -> Notification {
    Notification::new_comic(&self.config.notification_title, date, &self.app_root)
  }

  /// Publisher page URL for a date: `<publisher>/<comic>/<yyyy>/<mm>/<dd>`.
  pub fn page_url(&self, date: NaiveDate) -> Result<Url> {
    let path = format!("{}/{}", self.config.comic, date.format("%Y/%m/%d"));
    self
      .config
      .publisher_url
      .join(&path)
      .map_err(|e| eyre!("Invalid comic page URL for {}: {}", date, e))
  }

  /// Direct fetch bounded by the timeout, then one proxied attempt.
  async fn fetch_page(&self, date: NaiveDate) -> Result<Option<String>> {
    let target = self.page_url(date)?;

    match self.fetch_direct(&target, self.config.timeout()).await {
      Ok(page) => return Ok(Some(page)),
      Err(e) => debug!(url = %target, "direct fetch failed: {:#}", e),
    }

    let Some(proxy) = &self.config.proxy else {
      return Ok(None);
    };

    match self.fetch_proxied(&target, proxy).await {
      Ok(page) => Ok(Some(page)),
      Err(e) => {
        debug!(url = %target, "proxied fetch failed: {:#}", e);
        Ok(None)
      }
    }
  }

  async fn fetch_direct(&self, target: &Url, timeout: Duration) -> Result<String> {
    let request = Request::get(target.clone());
    let response = tokio::time::timeout(timeout, self.network.fetch(&request))
      .await
      .map_err(|_| eyre!("Timed out after {:?}", timeout))??;

    if !response.ok() {
      return Err(eyre!("Publisher returned {}", response.status));
    }
    Ok(response.text().into_owned())
  }

  async fn fetch_proxied(&self, target: &Url, proxy: &ProxyConfig) -> Result<String> {
    let mut request = Request::get(proxy.proxied_url(target)?)
      .with_header("Origin", self.app_root.origin().ascii_serialization());
    for (name, value) in &proxy.headers {
      request = request.with_header(name.clone(), value.clone());
    }

    let response = self.network.fetch(&request).await?;
    if !response.ok() {
      return Err(eyre!("Proxy returned {}", response.status));
    }
    Ok(response.text().into_owned())
  }
}
