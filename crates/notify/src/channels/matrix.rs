//! Matrix room notification channel.

use async_trait::async_trait;
use matrix_client::MatrixClient;
use tracing::debug;

use crate::error::ChannelError;
use crate::{NotifyChannel, RenderedMessage};

/// Posts notifications into one Matrix room as the logged-in bot.
pub struct MatrixChannel {
    client: MatrixClient,
    room: String,
}

impl MatrixChannel {
    /// `room` may be a room ID or an alias.
    #[must_use]
    pub fn new(client: MatrixClient, room: impl Into<String>) -> Self {
        Self {
            client,
            room: room.into(),
        }
    }
}

#[async_trait]
impl NotifyChannel for MatrixChannel {
    fn name(&self) -> &'static str {
        "matrix"
    }

    fn enabled(&self) -> bool {
        !self.room.is_empty()
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        if self.room.is_empty() {
            return Err(ChannelError::NotConfigured("no room given".to_string()));
        }

        // Joining is idempotent and resolves aliases to a room ID
        let room_id = self.client.join_room(&self.room).await?;
        let event_id = self
            .client
            .send_html(&room_id, &message.markdown, &message.html)
            .await?;
        debug!(room_id = %room_id, event_id = %event_id, "notification posted");
        Ok(())
    }
}
