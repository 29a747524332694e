//! Icinga notifications relayed into chat.
//!
//! An [`IcingaNotification`] is rendered once into markdown plus HTML
//! ([`RenderedMessage`]) and handed to every configured [`NotifyChannel`].
//!
//! # Usage
//!
//! ```no_run
//! use matrix_client::MatrixClient;
//! use notify::{IcingaNotification, MatrixChannel, Notifier, NotifyChannel, State};
//! use std::sync::Arc;
//!
//! # async fn run(client: MatrixClient) {
//! let notification = IcingaNotification {
//!     host_name: "matrix".into(),
//!     host_display_name: "Matrix".into(),
//!     service: None,
//!     state: State::Down,
//!     date: "2024-03-01 12:00:00 +0000".into(),
//!     output: "PING CRITICAL - Packet loss = 100%".into(),
//!     address: None,
//!     author: None,
//!     comment: None,
//!     web_url: None,
//! };
//! let channel: Arc<dyn NotifyChannel> =
//!     Arc::new(MatrixChannel::new(client, "#alerts:example.org"));
//! let notifier = Notifier::with_channels(vec![channel]);
//! for (channel, result) in notifier.deliver(&notification.into()).await {
//!     if let Err(e) = result {
//!         eprintln!("{channel}: {e}");
//!     }
//! }
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`MatrixChannel`] posts into a Matrix room
//! - [`Notifier`] dispatches a message to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;
pub mod markdown;

pub use channels::matrix::MatrixChannel;
pub use channels::NotifyChannel;
pub use error::{ChannelError, StateError};
pub use events::{newline_to_formatted_html, IcingaNotification, ServiceRef, State};

use std::sync::Arc;
use tracing::{debug, error};

/// A message in both the plain (markdown) and the HTML form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub markdown: String,
    pub html: String,
}

impl RenderedMessage {
    #[must_use]
    pub fn from_markdown(markdown: String) -> Self {
        let html = markdown::to_html(&markdown);
        Self { markdown, html }
    }
}

impl From<IcingaNotification> for RenderedMessage {
    fn from(notification: IcingaNotification) -> Self {
        Self::from_markdown(notification.build_message())
    }
}

impl From<&IcingaNotification> for RenderedMessage {
    fn from(notification: &IcingaNotification) -> Self {
        Self::from_markdown(notification.build_message())
    }
}

/// Central notification dispatcher.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
}

impl Notifier {
    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        self.channels.iter().any(|c| c.enabled())
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled()).count()
    }

    /// Send to every enabled channel in order and wait for each.
    ///
    /// One failing channel does not stop the others; every result is
    /// returned alongside the channel name.
    pub async fn deliver(
        &self,
        message: &RenderedMessage,
    ) -> Vec<(&'static str, Result<(), ChannelError>)> {
        let mut results = vec![];

        for channel in &self.channels {
            let channel_name = channel.name();
            if !channel.enabled() {
                debug!(channel = channel_name, "Channel disabled, skipping");
                continue;
            }
            let result = channel.send(message).await;
            match &result {
                Ok(()) => debug!(channel = channel_name, "Notification sent"),
                Err(e) => error!(
                    channel = channel_name,
                    error = %e,
                    "Failed to send notification"
                ),
            }
            results.push((channel_name, result));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        enabled: bool,
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(name: &'static str, enabled: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled,
                fail,
                sent: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl NotifyChannel for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.html.clone());
            if self.fail {
                Err(ChannelError::Other("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_rendered_message_has_html() {
        let message = RenderedMessage::from_markdown("**down**".to_string());
        assert_eq!(message.markdown, "**down**");
        assert_eq!(message.html, "<p><strong>down</strong></p>");
    }

    #[tokio::test]
    async fn test_deliver_skips_disabled_and_continues_after_failure() {
        let failing = Recording::new("first", true, true);
        let disabled = Recording::new("second", false, false);
        let working = Recording::new("third", true, false);
        let channels: Vec<Arc<dyn NotifyChannel>> =
            vec![failing.clone(), disabled.clone(), working.clone()];
        let notifier = Notifier::with_channels(channels);
        assert_eq!(notifier.channel_count(), 2);

        let message = RenderedMessage::from_markdown("hi".to_string());
        let results = notifier.deliver(&message).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "first");
        assert!(results[0].1.is_err());
        assert_eq!(results[1].0, "third");
        assert!(results[1].1.is_ok());
        assert!(disabled.sent.lock().unwrap().is_empty());
        assert_eq!(working.sent.lock().unwrap().as_slice(), ["<p>hi</p>"]);
    }
}
