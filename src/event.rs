use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::freshness::PERIODIC_TAG;
use crate::worker::ClientMessage;

/// Host events delivered to the worker loop
#[derive(Debug)]
pub enum Event {
  /// Message posted by a page (one JSON object per stdin line)
  Message(ClientMessage),
  /// Periodic background trigger
  Periodic(&'static str),
}

/// Event source that produces events from stdin and a periodic timer
///
/// Closing the input only ends message intake; periodic events keep coming
/// until the handler is dropped.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler reading messages from `input` and firing the
  /// periodic trigger every `period`
  pub fn new<R>(period: Duration, input: R) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn message reader
    let message_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(input).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) if line.trim().is_empty() => {}
          Ok(Some(line)) => match ClientMessage::parse(&line) {
            Ok(message) => {
              if message_tx.send(Event::Message(message)).is_err() {
                break;
              }
            }
            Err(e) => warn!("{:#}", e),
          },
          Ok(None) => {
            debug!("input closed, no more messages");
            break;
          }
          Err(e) => {
            warn!("Failed to read message: {}", e);
            break;
          }
        }
      }
    });

    // Periodic trigger; the first tick fires immediately
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        if tx.send(Event::Periodic(PERIODIC_TAG)).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_ticks_continue_after_input_closes() {
    let input: &'static [u8] = b"{\"type\":\"CHECK_NEW_COMIC\"}\n\nnot json\n";
    let mut events = EventHandler::new(Duration::from_secs(60), input);

    let mut messages = 0;
    let mut ticks = 0;
    for _ in 0..3 {
      match events.next().await {
        Some(Event::Message(message)) => {
          assert_eq!(message, ClientMessage::CheckNewComic);
          messages += 1;
        }
        Some(Event::Periodic(tag)) => {
          assert_eq!(tag, PERIODIC_TAG);
          ticks += 1;
        }
        None => panic!("event stream ended"),
      }
    }

    assert_eq!(messages, 1);
    assert_eq!(ticks, 2);
  }
}
