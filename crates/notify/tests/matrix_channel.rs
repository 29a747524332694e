//! `MatrixChannel` against a mock homeserver.

use matrix_client::{MatrixClient, StoredCredentials};
use notify::{ChannelError, IcingaNotification, MatrixChannel, NotifyChannel, RenderedMessage, State};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> MatrixClient {
    MatrixClient::from_credentials(&StoredCredentials {
        homeserver: server.uri(),
        user_id: "@notify:localhost".into(),
        device_id: None,
        access_token: "token".into(),
    })
    .unwrap()
}

fn notification() -> IcingaNotification {
    IcingaNotification {
        host_name: "synapse".into(),
        host_display_name: "Synapse".into(),
        service: None,
        state: State::Up,
        date: "2024-03-01 12:00:00 +0000".into(),
        output: "PING OK".into(),
        address: None,
        author: None,
        comment: None,
        web_url: None,
    }
}

#[tokio::test]
async fn test_joins_alias_then_posts_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/join/%23alerts%3Alocalhost"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"room_id": "!alerts:localhost"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/_matrix/client/v3/rooms/%21alerts%3Alocalhost/send/m\.room\.message/.+$",
        ))
        .and(body_partial_json(json!({
            "msgtype": "m.text",
            "format": "org.matrix.custom.html",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "$n1"})))
        .expect(1)
        .mount(&server)
        .await;

    let channel = MatrixChannel::new(client(&server), "#alerts:localhost");
    let message = RenderedMessage::from(&notification());
    assert!(message.html.contains("<strong>Synapse</strong>"));
    channel.send(&message).await.unwrap();
}

#[tokio::test]
async fn test_join_failure_surfaces_matrix_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/_matrix/client/v3/join/.+$"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errcode": "M_FORBIDDEN",
            "error": "You are not invited to this room."
        })))
        .mount(&server)
        .await;

    let channel = MatrixChannel::new(client(&server), "!private:localhost");
    let err = channel
        .send(&RenderedMessage::from(&notification()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Matrix(_)));
    assert!(err.to_string().contains("M_FORBIDDEN"));
}

#[tokio::test]
async fn test_empty_room_is_not_configured() {
    let server = MockServer::start().await;
    let channel = MatrixChannel::new(client(&server), "");
    assert!(!channel.enabled());
    let err = channel
        .send(&RenderedMessage::from(&notification()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::NotConfigured(_)));
}
