//! Two-party round-trip delivery probe.
//!
//! Party A creates a room and invites B, B joins, A sends a uniquely tagged
//! payload and B polls for it. The time between send and observation is the
//! measured latency. The probe runs in both directions, each with its own
//! room, so a one-way partition shows up as a failure in one direction only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::cleanup::CleanupLedger;
use crate::output::{CheckOutput, PerfData};
use crate::poller::{CallOutcome, Deadline, PollOutcome, Poller, DEFAULT_POLL_INTERVAL};
use crate::result::ProbeResult;
use crate::severity::Severity;
use crate::threshold::{round_to, Thresholds};

/// One side of the round trip. Every call reports a [`CallOutcome`] so the
/// probe can tell "not yet" from "no".
#[async_trait]
pub trait ChannelParty: Send + Sync {
    /// Identity the other party invites, e.g. `@bot1:example.org`.
    fn user_id(&self) -> &str;

    /// Name used in report lines and perf-data labels, e.g. `example.org`.
    fn server_name(&self) -> &str;

    /// Create a room named `name` with `invitee` invited. Yields the room ID.
    async fn create_room(&self, name: &str, invitee: &str) -> CallOutcome<String>;

    async fn join_room(&self, room_id: &str) -> CallOutcome<()>;

    /// Send `body` as a text message. Yields the event ID.
    async fn send_payload(&self, room_id: &str, body: &str) -> CallOutcome<String>;

    /// Fetch the body of a message event; retryable while it has not arrived.
    async fn fetch_payload(&self, room_id: &str, event_id: &str) -> CallOutcome<String>;

    async fn leave_room(&self, room_id: &str) -> CallOutcome<()>;

    async fn forget_room(&self, room_id: &str) -> CallOutcome<()>;
}

/// Tunables for one round-trip run.
#[derive(Debug, Clone, Copy)]
pub struct RoundTripConfig {
    /// Deadline for each of the join and observe waits
    pub timeout: Duration,
    /// Fixed cadence of join/observe polling
    pub poll_interval: Duration,
    /// Pause after creating the room and after joining it
    pub settle: Duration,
    pub thresholds: Thresholds,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle: Duration::from_secs(2),
            thresholds: Thresholds::new(2.0, 2.5),
        }
    }
}

/// The tagged message sent through the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: String,
    /// Send time, microseconds since the Unix epoch
    pub ts: i64,
}

impl Payload {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp_micros(),
        }
    }

    /// Serialized form placed in the message body.
    pub fn to_body(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"id\":\"{}\"}}", self.id))
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one direction plus the teardown it performed.
#[derive(Debug, Clone)]
pub struct DirectionReport {
    pub result: ProbeResult,
    pub cleanup: CleanupLedger,
}

/// Both directions of a round trip.
#[derive(Debug, Clone)]
pub struct RoundTripReport {
    /// Server name of party A, used to label perf-data
    pub origin: String,
    /// A -> B
    pub outbound: ProbeResult,
    /// B -> A
    pub inbound: ProbeResult,
    pub cleanup: CleanupLedger,
}

impl RoundTripReport {
    /// Findings in order: outbound, inbound, then cleanup warnings.
    pub fn aggregator(&self) -> Aggregator {
        let mut agg = Aggregator::new();
        agg.push_result(&self.outbound);
        agg.push_result(&self.inbound);
        agg.push_cleanup(&self.cleanup);
        agg
    }

    pub fn severity(&self) -> Severity {
        self.aggregator().severity()
    }

    pub fn to_output(&self) -> CheckOutput {
        CheckOutput::from_aggregator(self.aggregator())
            .perf(PerfData::seconds(
                format!("{}_outbound", self.origin),
                self.outbound.metric,
            ))
            .perf(PerfData::seconds(
                format!("{}_inbound", self.origin),
                self.inbound.metric,
            ))
    }
}

/// Leave and forget `room_id` as each of `parties`, recording every step.
async fn teardown(ledger: &mut CleanupLedger, room_id: &str, parties: &[&dyn ChannelParty]) {
    for party in parties {
        let user = party.user_id();
        ledger
            .attempt(format!("{user} leave {room_id}"), async {
                party.leave_room(room_id).await.into_result()
            })
            .await;
        ledger
            .attempt(format!("{user} forget {room_id}"), async {
                party.forget_room(room_id).await.into_result()
            })
            .await;
    }
}

/// Measure delivery from `sender` to `receiver`.
///
/// `route` labels the result line, e.g. `a.org -> b.org`. Every exit path
/// after the room exists tears the room down again.
pub async fn probe_direction(
    sender: &dyn ChannelParty,
    receiver: &dyn ChannelParty,
    route: &str,
    config: &RoundTripConfig,
) -> DirectionReport {
    let mut cleanup = CleanupLedger::new();
    let poller = Poller::new(config.poll_interval);

    let room_name = Uuid::new_v4().to_string();
    let room_id = match sender.create_room(&room_name, receiver.user_id()).await {
        CallOutcome::Success(room_id) => room_id,
        CallOutcome::Retryable(detail) | CallOutcome::Terminal(detail) => {
            warn!(route, detail = %detail, "failed to create probe room");
            return DirectionReport {
                result: ProbeResult::failed(
                    Severity::Unknown,
                    format!("failed to create room \"{detail}\""),
                ),
                cleanup,
            };
        }
    };
    info!(route, room_id = %room_id, "created probe room");
    tokio::time::sleep(config.settle).await;

    let joined = poller
        .poll(Deadline::after(config.timeout), || receiver.join_room(&room_id))
        .await;
    let join_failure = match joined {
        PollOutcome::Success(()) => None,
        PollOutcome::Terminal(detail) => Some(format!("failed to join room \"{detail}\"")),
        PollOutcome::TimedOut(_) => Some("failed to join room, timeout.".to_string()),
    };
    if let Some(message) = join_failure {
        warn!(route, room_id = %room_id, %message, "receiver could not join");
        teardown(&mut cleanup, &room_id, &[sender]).await;
        return DirectionReport {
            result: ProbeResult::failed(Severity::Unknown, message).with_artifact(room_id),
            cleanup,
        };
    }
    debug!(route, room_id = %room_id, "receiver joined");
    tokio::time::sleep(config.settle).await;

    let body = Payload::new().to_body();
    let sent_at = Instant::now();
    let event_id = match sender.send_payload(&room_id, &body).await {
        CallOutcome::Success(event_id) => event_id,
        CallOutcome::Retryable(detail) | CallOutcome::Terminal(detail) => {
            warn!(route, room_id = %room_id, detail = %detail, "failed to send payload");
            teardown(&mut cleanup, &room_id, &[sender, receiver]).await;
            return DirectionReport {
                result: ProbeResult::failed(
                    Severity::Unknown,
                    format!("failed to send message \"{detail}\""),
                )
                .with_artifact(room_id),
                cleanup,
            };
        }
    };

    let observed = poller
        .poll(Deadline::after(config.timeout), || {
            receiver.fetch_payload(&room_id, &event_id)
        })
        .await;
    let received_at = Instant::now();

    let result = match observed {
        PollOutcome::Success(received) if received == body => {
            let elapsed = round_to((received_at - sent_at).as_secs_f64(), 2);
            let severity = config.thresholds.classify(elapsed);
            info!(route, elapsed, %severity, "payload delivered");
            ProbeResult::new(severity, format!("{severity}: {route} is {elapsed} seconds."))
                .with_metric(elapsed)
        }
        PollOutcome::Success(received) => {
            warn!(route, sent = %body, received = %received, "payload mismatch");
            ProbeResult::failed(
                Severity::Critical,
                "sender's message did not match the receiver's.",
            )
        }
        PollOutcome::TimedOut(_) => ProbeResult::failed(
            Severity::Critical,
            "timeout - receiver did not receive the sender's message.",
        ),
        PollOutcome::Terminal(detail) => ProbeResult::failed(
            Severity::Unknown,
            format!("failed to fetch message \"{detail}\""),
        ),
    }
    .with_artifact(room_id.clone())
    .with_artifact(event_id);

    teardown(&mut cleanup, &room_id, &[sender, receiver]).await;
    DirectionReport { result, cleanup }
}

/// Run A -> B, then B -> A, and collect both results with all teardown.
pub async fn run_round_trip(
    a: &dyn ChannelParty,
    b: &dyn ChannelParty,
    config: &RoundTripConfig,
) -> RoundTripReport {
    let outbound_route = format!("{} -> {}", a.server_name(), b.server_name());
    let inbound_route = format!("{} <- {}", a.server_name(), b.server_name());

    let outbound = probe_direction(a, b, &outbound_route, config).await;
    let inbound = probe_direction(b, a, &inbound_route, config).await;

    let mut cleanup = outbound.cleanup;
    cleanup.absorb(inbound.cleanup);

    RoundTripReport {
        origin: a.server_name().to_string(),
        outbound: outbound.result,
        inbound: inbound.result,
        cleanup,
    }
}
