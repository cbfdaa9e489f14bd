mod cache;
mod config;
mod event;
mod freshness;
mod lifecycle;
mod logging;
mod net;
mod notify;
mod strategy;
mod worker;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::cache::{CacheStorage, CachedEntry, MemoryStorage, SqliteStorage};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::lifecycle::LifecycleState;
use crate::net::{Destination, Request};
use crate::notify::NotificationAction;
use crate::worker::{Services, Worker};

#[derive(Parser, Debug)]
#[command(name = "strip-worker")]
#[command(about = "Offline cache and new-comic watcher for a daily comic strip viewer")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/strip-worker/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep the cache in memory instead of on disk
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install, then serve periodic checks and stdin messages until interrupted
  ///
  /// Checks keep running after stdin closes.
  Run,
  /// Precache the shell (and activate, when skip_waiting is set)
  Install,
  /// Purge stale cache generations and claim clients
  Activate,
  /// Route one request through the cache strategies
  Fetch {
    /// Path relative to the app origin, or an absolute URL
    target: String,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
    #[arg(long, value_enum)]
    destination: Option<Destination>,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Check for a new comic now
  Check,
  /// Handle a click on the new-comic notification for DATE and print the URL to open
  Click {
    /// Comic date, YYYY-MM-DD
    date: NaiveDate,
    /// Button pressed; omit for a click on the notification body
    #[arg(long, value_enum)]
    action: Option<NotificationAction>,
  },
  /// List cache partitions
  Partitions,
  /// List a partition's keys with the time each was cached, oldest first
  Keys { partition: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  if args.ephemeral {
    execute(args.command, &config, MemoryStorage::new()).await
  } else {
    let path = match &config.cache.database {
      Some(path) => path.clone(),
      None => SqliteStorage::default_path()?,
    };
    execute(args.command, &config, SqliteStorage::open(&path)?).await
  }
}

async fn execute<S: CacheStorage + 'static>(command: Command, config: &Config, storage: S) -> Result<()> {
  let services = Services::from_config(config)?;
  let worker = Worker::new(config, storage, services)?;

  match command {
    Command::Run => serve(&worker, config.freshness.interval()).await,
    Command::Install => {
      if !worker.on_install().await {
        return Err(eyre!("Install failed, see the log for details"));
      }
      println!("{:?}", worker.state());
      Ok(())
    }
    Command::Activate => {
      if !matches!(worker.state(), LifecycleState::Installed | LifecycleState::Activated) {
        return Err(eyre!("Not installed yet, run `strip-worker install` first"));
      }
      if !worker.on_activate().await {
        return Err(eyre!("Activation failed, see the log for details"));
      }
      println!("{:?}", worker.state());
      Ok(())
    }
    Command::Fetch {
      target,
      accept,
      destination,
      output,
    } => {
      let mut request = Request::get(config.app.resolve(&target)?);
      if let Some(accept) = accept {
        request = request.with_header("accept", accept);
      }
      if let Some(destination) = destination {
        request = request.with_destination(destination);
      }

      let response = worker.handle_fetch(&request).await?;
      eprintln!(
        "{} {} ({:?}, {} bytes)",
        response.status,
        response.status_text,
        response.source,
        response.body.len()
      );

      match output {
        Some(path) => std::fs::write(&path, &response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout()
          .write_all(&response.body)
          .map_err(|e| eyre!("Failed to write response body: {}", e))?,
      }
      Ok(())
    }
    Command::Check => {
      println!("{:?}", worker.check_now().await);
      Ok(())
    }
    Command::Click { date, action } => {
      let notification = worker.notification_for(date);
      if let Some(url) = worker.on_notification_click(&notification, action) {
        println!("{}", url);
      }
      Ok(())
    }
    Command::Partitions => {
      let store = worker.store();
      for name in store.names()? {
        let marker = if worker.names().is_current(&name) {
          "*"
        } else {
          " "
        };
        let entries = store.open(&name)?.len()?;
        println!("{} {} ({} entries)", marker, name, entries);
      }
      Ok(())
    }
    Command::Keys { partition } => {
      let store = worker.store();
      if !store.has(&partition)? {
        return Err(eyre!("No such partition: {}", partition));
      }
      let entries: Vec<CachedEntry> = store.open(&partition)?.entries()?;
      for entry in entries {
        println!("{}  {}", entry.cached_at.format("%Y-%m-%d %H:%M:%S"), entry.key);
      }
      Ok(())
    }
  }
}

/// Long-running loop: install, then handle messages and periodic checks.
async fn serve<S: CacheStorage + 'static>(worker: &Worker<S>, period: Duration) -> Result<()> {
  // The page on the other end of stdin is our one client
  worker.clients().connect("stdin")?;
  worker.on_install().await;

  let mut events = EventHandler::new(period, tokio::io::stdin());
  loop {
    tokio::select! {
      event = events.next() => match event {
        Some(Event::Message(message)) => worker.on_message(message).await,
        Some(Event::Periodic(tag)) => {
          // A failed install is retried on the next trigger
          if matches!(worker.state(), LifecycleState::Parsed | LifecycleState::Redundant) {
            worker.on_install().await;
          }
          worker.on_periodic_sync(tag).await;
        }
        None => break,
      },
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted, shutting down");
        break;
      }
    }
  }

  Ok(())
}
