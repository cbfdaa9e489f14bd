//! User notifications for newly published comics.

use async_trait::async_trait;
use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Buttons shown on a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
  View,
  Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
  pub action: NotificationAction,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  /// Notifications with the same tag replace each other
  pub tag: String,
  pub date: NaiveDate,
  /// Deep link opening the application on `date`
  pub url: Url,
  pub actions: Vec<ActionButton>,
}

impl Notification {
  /// Notification for a newly published comic, deep-linking to its date.
  pub fn new_comic(title: &str, date: NaiveDate, app_root: &Url) -> Self {
    let mut url = app_root.clone();
    url
      .query_pairs_mut()
      .append_pair("date", &date.format("%Y-%m-%d").to_string());

    Self {
      title: title.to_string(),
      body: format!(
        "The comic for {} is now available!",
        date.format("%B %-d, %Y")
      ),
      tag: "new-comic".to_string(),
      date,
      url,
      actions: vec![
        ActionButton {
          action: NotificationAction::View,
          title: "View Comic".to_string(),
        },
        ActionButton {
          action: NotificationAction::Close,
          title: "Close".to_string(),
        },
      ],
    }
  }

  /// Where a click should take the user. `None` is a click on the body.
  pub fn click_target(&self, action: Option<NotificationAction>) -> Option<&Url> {
    match action {
      Some(NotificationAction::Close) => None,
      Some(NotificationAction::View) | None => Some(&self.url),
    }
  }
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes each notification as a JSON line on stdout for the hosting page.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
  async fn notify(&self, notification: &Notification) -> Result<()> {
    let line = serde_json::json!({ "event": "notification", "notification": notification });
    info!(date = %notification.date, url = %notification.url, "{}", notification.title);
    println!("{}", line);
    Ok(())
  }
}

/// Runs an external command (e.g. `notify-send`) per notification.
pub struct CommandNotifier {
  argv: Vec<String>,
}

impl CommandNotifier {
  pub fn new(argv: Vec<String>) -> Result<Self> {
    if argv.is_empty() {
      return Err(eyre!("notify_command must name a program"));
    }
    Ok(Self { argv })
  }

  fn render(&self, notification: &Notification) -> Vec<String> {
    self
      .argv
      .iter()
      .map(|arg| {
        arg
          .replace("{title}", &notification.title)
          .replace("{body}", &notification.body)
          .replace("{url}", notification.url.as_str())
      })
      .collect()
  }
}

#[async_trait]
impl Notifier for CommandNotifier {
  async fn notify(&self, notification: &Notification) -> Result<()> {
    let argv = self.render(notification);
    let status = tokio::process::Command::new(&argv[0])
      .args(&argv[1..])
      .status()
      .await
      .map_err(|e| eyre!("Failed to run {}: {}", argv[0], e))?;

    if !status.success() {
      return Err(eyre!("{} exited with {}", argv[0], status));
    }
    info!(date = %notification.date, "notification sent via {}", argv[0]);
    Ok(())
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::Mutex;

  /// Records every notification it is asked to show.
  #[derive(Default)]
  pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
  }

  impl RecordingNotifier {
    pub fn count(&self) -> usize {
      self.sent.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
      self.sent.lock().unwrap().push(notification.clone());
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notification() -> Notification {
    Notification::new_comic(
      "New Garfield Comic!",
      NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
      &Url::parse("https://comics.example.org/").unwrap(),
    )
  }

  #[test]
  fn test_new_comic_payload() {
    let n = notification();
    assert_eq!(n.title, "New Garfield Comic!");
    assert_eq!(n.body, "The comic for January 5, 2024 is now available!");
    assert_eq!(n.url.as_str(), "https://comics.example.org/?date=2024-01-05");
    let actions: Vec<_> = n.actions.iter().map(|a| a.action).collect();
    assert_eq!(actions, vec![NotificationAction::View, NotificationAction::Close]);
  }

  #[test]
  fn test_click_targets() {
    let n = notification();
    assert_eq!(n.click_target(Some(NotificationAction::View)), Some(&n.url));
    assert_eq!(n.click_target(None), Some(&n.url));
    assert_eq!(n.click_target(Some(NotificationAction::Close)), None);
  }

  #[test]
  fn test_command_arguments_substituted() {
    let notifier = CommandNotifier::new(vec![
      "notify-send".to_string(),
      "{title}".to_string(),
      "{body} {url}".to_string(),
    ])
    .unwrap();
    let argv = notifier.render(&notification());
    assert_eq!(argv[1], "New Garfield Comic!");
    assert_eq!(
      argv[2],
      "The comic for January 5, 2024 is now available! https://comics.example.org/?date=2024-01-05"
    );
  }

  #[test]
  fn test_empty_command_rejected() {
    assert!(CommandNotifier::new(Vec::new()).is_err());
  }
}
