//! [`ChannelParty`] over a Matrix session.

use async_trait::async_trait;
use probe::{CallOutcome, ChannelParty};

use crate::client::MatrixClient;
use crate::error::{call_outcome, MatrixError};

#[async_trait]
impl ChannelParty for MatrixClient {
    fn user_id(&self) -> &str {
        MatrixClient::user_id(self)
    }

    fn server_name(&self) -> &str {
        MatrixClient::server_name(self)
    }

    async fn create_room(&self, name: &str, invitee: &str) -> CallOutcome<String> {
        call_outcome(MatrixClient::create_room(self, name, &[invitee]).await)
    }

    async fn join_room(&self, room_id: &str) -> CallOutcome<()> {
        call_outcome(MatrixClient::join_room(self, room_id).await.map(|_| ()))
    }

    async fn send_payload(&self, room_id: &str, body: &str) -> CallOutcome<String> {
        call_outcome(self.send_text(room_id, body).await)
    }

    async fn fetch_payload(&self, room_id: &str, event_id: &str) -> CallOutcome<String> {
        let event = self.get_event(room_id, event_id).await.and_then(|event| {
            event.body().map(str::to_string).ok_or_else(|| {
                MatrixError::UnexpectedResponse(format!("event {event_id} has no body"))
            })
        });
        call_outcome(event)
    }

    async fn leave_room(&self, room_id: &str) -> CallOutcome<()> {
        call_outcome(MatrixClient::leave_room(self, room_id).await)
    }

    async fn forget_room(&self, room_id: &str) -> CallOutcome<()> {
        call_outcome(MatrixClient::forget_room(self, room_id).await)
    }
}
