use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheNames;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub app: AppConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub freshness: FreshnessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Origin the application is served from; only same-origin GETs are cached
  pub origin: Url,
  /// Prefix shared by every cache partition this application owns
  pub cache_prefix: String,
  /// Generation tag; bump it to rotate every partition on the next activation
  pub version: String,
  /// Shell assets fetched at install time, relative to `origin`
  pub precache: Vec<String>,
  /// Shell document served to HTML requests when the network is down
  pub fallback_document: String,
  /// Activate right after install instead of waiting for SKIP_WAITING
  pub skip_waiting: bool,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: Url::parse("http://localhost:8080/").expect("static URL"),
      cache_prefix: "garfield".to_string(),
      version: "v1".to_string(),
      precache: [
        "/",
        "/index.html",
        "/main.css",
        "/main.js",
        "/manifest.webmanifest",
        "/favicon.svg",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      fallback_document: "/".to_string(),
      skip_waiting: true,
    }
  }
}

impl AppConfig {
  pub fn cache_names(&self) -> CacheNames {
    CacheNames::new(&self.cache_prefix, &self.version)
  }

  /// Resolve a path (or absolute URL) against the application origin.
  pub fn resolve(&self, target: &str) -> Result<Url> {
    self
      .origin
      .join(target)
      .map_err(|e| eyre!("Invalid URL '{}': {}", target, e))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Entry bound for the images partition
  pub image_max_entries: usize,
  /// Entry bound for the runtime partition
  pub runtime_max_entries: usize,
  /// Database location (default: $XDG_DATA_HOME/strip-worker/cache.db)
  pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      image_max_entries: 50,
      runtime_max_entries: 30,
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
  pub publisher_url: Url,
  /// Comic slug in the publisher's URL scheme
  pub comic: String,
  /// Timeout of the direct page fetch, in seconds
  pub timeout_secs: u64,
  /// Minutes between background checks in `run`
  pub interval_minutes: u64,
  /// Fallback used when the direct fetch fails
  pub proxy: Option<ProxyConfig>,
  /// Any of these (case-insensitive) means a comic image is on the page
  pub positive_markers: Vec<String>,
  /// Any of these means the page is a placeholder
  pub negative_markers: Vec<String>,
  pub notification_title: String,
  /// Optional command run for every notification; `{title}`, `{body}` and
  /// `{url}` are substituted in each argument
  pub notify_command: Option<Vec<String>>,
}

impl Default for FreshnessConfig {
  fn default() -> Self {
    Self {
      publisher_url: Url::parse("https://www.gocomics.com/").expect("static URL"),
      comic: "garfield".to_string(),
      timeout_secs: 10,
      interval_minutes: 12 * 60,
      proxy: Some(ProxyConfig::default()),
      positive_markers: [
        "featureassets.gocomics.com",
        "assets.amuniversal.com",
        "data-comic-image",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      negative_markers: [
        "comic is not available",
        "check back later",
        "no comic for this date",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      notification_title: "New Garfield Comic!".to_string(),
      notify_command: None,
    }
  }
}

impl FreshnessConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_minutes.max(1) * 60)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
  /// Proxy URL with `{url}` standing for the percent-encoded target
  pub url_template: String,
  /// Extra headers sent only on the proxied attempt
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      url_template: "https://api.allorigins.win/raw?url={url}".to_string(),
      headers: BTreeMap::from([("X-Requested-With".to_string(), "XMLHttpRequest".to_string())]),
    }
  }
}

impl ProxyConfig {
  pub fn proxied_url(&self, target: &Url) -> Result<Url> {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    let raw = self.url_template.replace("{url}", &encoded);
    Url::parse(&raw).map_err(|e| eyre!("Invalid proxy URL '{}': {}", raw, e))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./strip-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/strip-worker/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("strip-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("strip-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.cache.image_max_entries == 0 || config.cache.runtime_max_entries == 0 {
      return Err(eyre!("Cache entry bounds must be at least 1"));
    }
    if config.freshness.timeout_secs == 0 {
      return Err(eyre!("freshness.timeout_secs must be at least 1"));
    }
    Ok(config)
  }
}
