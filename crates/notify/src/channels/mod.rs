//! Notification channel implementations.

pub mod matrix;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::RenderedMessage;

/// Trait for notification channels.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver a rendered message.
    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError>;
}
