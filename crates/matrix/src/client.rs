//! Matrix client-server API client.
//!
//! Only the calls the health checks need: rooms, messages, media and the
//! Synapse admin media purge. Every method returns [`MatrixError`] so the
//! caller can decide between retrying and giving up.

use std::path::Path;
use std::time::Duration;

use probe::{CleanupLedger, CleanupOutcome};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::credentials::StoredCredentials;
use crate::error::MatrixError;
use crate::types::{
    CreateRoomRequest, ErrorBody, EventIdResponse, JoinedRoomsResponse, LoginRequest,
    LoginResponse, RedactRequest, RoomEvent, RoomIdResponse, SyncResponse, UploadResponse,
    UserIdentifier,
};

/// Per-request timeout for homeserver calls unless the caller sets one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CLIENT_PREFIX: &str = "_matrix/client/v3";
const MEDIA_PREFIX: &str = "_matrix/media/v3";

/// Authenticated session on one homeserver.
#[derive(Debug, Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    server_name: String,
    user_id: String,
    device_id: Option<String>,
    access_token: String,
    request_timeout: Duration,
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, MatrixError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// `host[:port]` of a homeserver URL.
fn server_name_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Percent-encode path segments and join them.
fn encode_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn base_of(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

/// Turn a non-success response into [`MatrixError::Api`].
async fn api_error(response: Response) -> MatrixError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => MatrixError::Api {
            status,
            errcode: err.errcode,
            message: err.error,
        },
        Err(_) => MatrixError::Api {
            status,
            errcode: "M_UNKNOWN".to_string(),
            message: body,
        },
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, MatrixError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl MatrixClient {
    /// Password login. Creates a new device on the homeserver.
    pub async fn login(homeserver: &str, user: &str, password: &str) -> Result<Self, MatrixError> {
        let homeserver = Url::parse(homeserver)?;
        let http = http_client(DEFAULT_REQUEST_TIMEOUT)?;
        let url = format!("{}/{CLIENT_PREFIX}/login", base_of(&homeserver));

        debug!(user, homeserver = %homeserver, "logging in");
        let request = LoginRequest {
            login_type: "m.login.password",
            identifier: UserIdentifier {
                id_type: "m.id.user",
                user,
            },
            password,
            initial_device_display_name: Some("synapse-checks"),
        };
        let response = http.post(&url).json(&request).send().await?;
        let login: LoginResponse = parse(response).await?;
        info!(user_id = %login.user_id, "logged in");

        Ok(Self {
            server_name: server_name_of(&homeserver),
            http,
            homeserver,
            user_id: login.user_id,
            device_id: login.device_id,
            access_token: login.access_token,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Reuse the credential cache at `cache` when it belongs to this
    /// homeserver, otherwise log in and write the cache.
    pub async fn login_cached(
        homeserver: &str,
        user: &str,
        password: &str,
        cache: &Path,
    ) -> Result<Self, MatrixError> {
        if let Some(creds) = StoredCredentials::load(cache)? {
            if creds.homeserver.trim_end_matches('/') == homeserver.trim_end_matches('/') {
                return Self::from_credentials(&creds);
            }
            warn!(
                cached = %creds.homeserver,
                requested = homeserver,
                "cached credentials are for another homeserver, logging in again"
            );
        }
        let client = Self::login(homeserver, user, password).await?;
        client.credentials().save(cache)?;
        Ok(client)
    }

    /// Session from previously stored credentials. No network call.
    pub fn from_credentials(creds: &StoredCredentials) -> Result<Self, MatrixError> {
        let homeserver = Url::parse(&creds.homeserver)?;
        Ok(Self {
            server_name: server_name_of(&homeserver),
            http: http_client(DEFAULT_REQUEST_TIMEOUT)?,
            homeserver,
            user_id: creds.user_id.clone(),
            device_id: creds.device_id.clone(),
            access_token: creds.access_token.clone(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound every later call of this session by `timeout`, typically the
    /// check's `--timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, MatrixError> {
        self.http = http_client(timeout)?;
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn credentials(&self) -> StoredCredentials {
        StoredCredentials {
            homeserver: base_of(&self.homeserver).to_string(),
            user_id: self.user_id.clone(),
            device_id: self.device_id.clone(),
            access_token: self.access_token.clone(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `host[:port]` of the homeserver URL, e.g. `matrix.example.org`.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    fn client_url(&self, segments: &[&str]) -> String {
        format!(
            "{}/{CLIENT_PREFIX}/{}",
            base_of(&self.homeserver),
            encode_path(segments)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Create a private room, inviting `invite`. Returns the room ID.
    pub async fn create_room(&self, name: &str, invite: &[&str]) -> Result<String, MatrixError> {
        let body = CreateRoomRequest {
            name,
            invite: invite.to_vec(),
            preset: "private_chat",
        };
        let response = self
            .request(Method::POST, &self.client_url(&["createRoom"]))
            .json(&body)
            .send()
            .await?;
        let created: RoomIdResponse = parse(response).await?;
        debug!(room_id = %created.room_id, name, "room created");
        Ok(created.room_id)
    }

    /// Join a room by ID or alias. Returns the room ID.
    pub async fn join_room(&self, room: &str) -> Result<String, MatrixError> {
        let response = self
            .request(Method::POST, &self.client_url(&["join", room]))
            .json(&json!({}))
            .send()
            .await?;
        let joined: RoomIdResponse = parse(response).await?;
        debug!(room_id = %joined.room_id, "joined room");
        Ok(joined.room_id)
    }

    /// Send an `m.room.message` event with arbitrary content. Returns the
    /// event ID.
    pub async fn send_message(&self, room_id: &str, content: &Value) -> Result<String, MatrixError> {
        let txn = Uuid::new_v4().to_string();
        let url = self.client_url(&["rooms", room_id, "send", "m.room.message", &txn]);
        let response = self.request(Method::PUT, &url).json(content).send().await?;
        let sent: EventIdResponse = parse(response).await?;
        debug!(room_id, event_id = %sent.event_id, "message sent");
        Ok(sent.event_id)
    }

    pub async fn send_text(&self, room_id: &str, body: &str) -> Result<String, MatrixError> {
        self.send_message(room_id, &json!({"msgtype": "m.text", "body": body}))
            .await
    }

    /// Send a text message with an HTML rendering.
    pub async fn send_html(
        &self,
        room_id: &str,
        body: &str,
        html: &str,
    ) -> Result<String, MatrixError> {
        self.send_message(
            room_id,
            &json!({
                "msgtype": "m.text",
                "body": body,
                "format": "org.matrix.custom.html",
                "formatted_body": html,
            }),
        )
        .await
    }

    /// Send an `m.image` event pointing at already uploaded media.
    pub async fn send_image(
        &self,
        room_id: &str,
        content_uri: &str,
        filename: &str,
        mimetype: &str,
        size: usize,
        (width, height): (u32, u32),
    ) -> Result<String, MatrixError> {
        self.send_message(
            room_id,
            &json!({
                "msgtype": "m.image",
                "body": filename,
                "url": content_uri,
                "info": {"mimetype": mimetype, "size": size, "w": width, "h": height},
            }),
        )
        .await
    }

    pub async fn get_event(&self, room_id: &str, event_id: &str) -> Result<RoomEvent, MatrixError> {
        let url = self.client_url(&["rooms", room_id, "event", event_id]);
        let response = self.request(Method::GET, &url).send().await?;
        parse(response).await
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), MatrixError> {
        let url = self.client_url(&["rooms", room_id, "leave"]);
        let response = self.request(Method::POST, &url).json(&json!({})).send().await?;
        let _: Value = parse(response).await?;
        debug!(room_id, "left room");
        Ok(())
    }

    pub async fn forget_room(&self, room_id: &str) -> Result<(), MatrixError> {
        let url = self.client_url(&["rooms", room_id, "forget"]);
        let response = self.request(Method::POST, &url).json(&json!({})).send().await?;
        let _: Value = parse(response).await?;
        debug!(room_id, "forgot room");
        Ok(())
    }

    pub async fn joined_rooms(&self) -> Result<Vec<String>, MatrixError> {
        let response = self
            .request(Method::GET, &self.client_url(&["joined_rooms"]))
            .send()
            .await?;
        let rooms: JoinedRoomsResponse = parse(response).await?;
        Ok(rooms.joined_rooms)
    }

    /// Rooms with a pending invite, from a non-blocking sync.
    pub async fn invited_rooms(&self) -> Result<Vec<String>, MatrixError> {
        let response = self
            .request(Method::GET, &self.client_url(&["sync"]))
            .query(&[("timeout", "0")])
            .send()
            .await?;
        let sync: SyncResponse = parse(response).await?;
        let mut rooms: Vec<String> = sync.rooms.invite.into_keys().collect();
        rooms.sort();
        Ok(rooms)
    }

    /// Leave and forget every joined and invited room, recording each step
    /// in `ledger`. Listing failures are recorded too; nothing here fails
    /// the caller.
    pub async fn leave_all_rooms(&self, ledger: &mut CleanupLedger) {
        let mut rooms = Vec::new();
        match self.joined_rooms().await {
            Ok(joined) => rooms.extend(joined),
            Err(e) => ledger.record(CleanupOutcome::failure(
                format!("{} list joined rooms", self.user_id),
                e.to_string(),
            )),
        }
        match self.invited_rooms().await {
            Ok(invited) => rooms.extend(invited),
            Err(e) => ledger.record(CleanupOutcome::failure(
                format!("{} list invited rooms", self.user_id),
                e.to_string(),
            )),
        }
        rooms.sort();
        rooms.dedup();

        info!(user_id = %self.user_id, count = rooms.len(), "sweeping rooms");
        for room_id in &rooms {
            ledger
                .attempt(
                    format!("{} leave {room_id}", self.user_id),
                    self.leave_room(room_id),
                )
                .await;
            ledger
                .attempt(
                    format!("{} forget {room_id}", self.user_id),
                    self.forget_room(room_id),
                )
                .await;
        }
    }

    /// Upload media. Returns the `mxc://` content URI.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> Result<String, MatrixError> {
        let url = format!("{}/{MEDIA_PREFIX}/upload", base_of(&self.homeserver));
        let size = data.len();
        let response = self
            .request(Method::POST, &url)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;
        let uploaded: UploadResponse = parse(response).await?;
        debug!(content_uri = %uploaded.content_uri, size, "media uploaded");
        Ok(uploaded.content_uri)
    }

    /// Redact an event. Returns the redaction event ID.
    pub async fn redact(
        &self,
        room_id: &str,
        event_id: &str,
        reason: Option<&str>,
    ) -> Result<String, MatrixError> {
        let txn = Uuid::new_v4().to_string();
        let url = self.client_url(&["rooms", room_id, "redact", event_id, &txn]);
        let response = self
            .request(Method::PUT, &url)
            .json(&RedactRequest { reason })
            .send()
            .await?;
        let redacted: EventIdResponse = parse(response).await?;
        debug!(room_id, event_id, "event redacted");
        Ok(redacted.event_id)
    }

    /// Resolve `mxc://server/media` to this homeserver's download URL.
    pub fn mxc_to_http(&self, mxc: &str) -> Result<String, MatrixError> {
        mxc_to_http(&self.homeserver, mxc)
    }

    /// Delete all media uploaded by this user through the Synapse admin API
    /// at `admin_endpoint`. Returns the number of deleted items.
    ///
    /// The admin endpoint commonly sits behind a self-signed certificate, so
    /// certificate verification is off for this call only.
    pub async fn purge_user_media(&self, admin_endpoint: &str) -> Result<u64, MatrixError> {
        #[derive(Deserialize)]
        struct PurgeResponse {
            #[serde(default)]
            total: u64,
        }

        let admin = Url::parse(admin_endpoint)?;
        let url = format!(
            "{}/_synapse/admin/v1/users/{}/media",
            base_of(&admin),
            urlencoding::encode(&self.user_id)
        );
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        let response = http
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let purged: PurgeResponse = parse(response).await?;
        info!(user_id = %self.user_id, total = purged.total, "purged user media");
        Ok(purged.total)
    }
}

/// Resolve `mxc://server/media` against `homeserver`'s media download
/// endpoint.
pub fn mxc_to_http(homeserver: &Url, mxc: &str) -> Result<String, MatrixError> {
    let rest = mxc
        .strip_prefix("mxc://")
        .ok_or_else(|| MatrixError::InvalidContentUri(mxc.to_string()))?;
    let (server, media_id) = rest
        .split_once('/')
        .filter(|(server, media)| !server.is_empty() && !media.is_empty() && !media.contains('/'))
        .ok_or_else(|| MatrixError::InvalidContentUri(mxc.to_string()))?;
    Ok(format!(
        "{}/{MEDIA_PREFIX}/download/{}",
        base_of(homeserver),
        encode_path(&[server, media_id])
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_keeps_port() {
        let url = Url::parse("https://matrix.example.org:8448/").unwrap();
        assert_eq!(server_name_of(&url), "matrix.example.org:8448");
        let url = Url::parse("https://matrix.example.org").unwrap();
        assert_eq!(server_name_of(&url), "matrix.example.org");
    }

    #[test]
    fn test_encode_path_escapes_sigils() {
        assert_eq!(
            encode_path(&["rooms", "!abc:example.org", "event", "$ev/1"]),
            "rooms/%21abc%3Aexample.org/event/%24ev%2F1"
        );
    }

    #[test]
    fn test_mxc_to_http() {
        let hs = Url::parse("https://matrix.example.org/").unwrap();
        assert_eq!(
            mxc_to_http(&hs, "mxc://example.org/AbCdEf").unwrap(),
            "https://matrix.example.org/_matrix/media/v3/download/example.org/AbCdEf"
        );
    }

    #[test]
    fn test_mxc_to_http_rejects_malformed() {
        let hs = Url::parse("https://matrix.example.org").unwrap();
        for bad in ["https://example.org/x", "mxc://example.org", "mxc:///x", "mxc://a/b/c"] {
            assert!(
                matches!(mxc_to_http(&hs, bad), Err(MatrixError::InvalidContentUri(_))),
                "{bad}"
            );
        }
    }
}
