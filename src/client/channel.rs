//! Command channel and router between surfaces and a scheduling backend.

use crate::client::contract::{
    CommandEnvelope, CommandName, EVENT_VERSION, EventEnvelope, ResponseEnvelope, events,
};
use crate::client::scheduling::{ScheduleRequest, ScheduleTransport};
use crate::error::{Result, TimerError};
use crate::preferences::Preferences;
use crate::snapshot::{MonitorSnapshot, TaskSnapshot};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Server-side seam: whatever owns the tasks and the authoritative
/// snapshot.
pub trait SchedulerBackend: Send + Sync + 'static {
    /// Accept a validated request, replacing any task under the same key.
    fn schedule(&self, request: ScheduleRequest) -> Result<TaskSnapshot>;
    /// Remove a task. `Ok(false)` when nothing was scheduled under the key.
    fn cancel(&self, task_id: &str) -> Result<bool>;
    /// Merge a partial preference update; returns the merged result.
    fn set_preferences(&self, entity: &str, patch: &Preferences) -> Result<Preferences>;
    /// Preferences for one entity, or all of them.
    fn preferences(&self, entity: Option<&str>) -> Result<serde_json::Value>;
    fn snapshot(&self) -> Result<MonitorSnapshot>;
    /// Remove every task whose end has passed; returns the removed tasks.
    fn expire_due(&self) -> Result<Vec<TaskSnapshot>>;
}

struct BackendCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

/// Cloneable sender half, used by surfaces.
#[derive(Clone)]
pub struct BackendCommandClient {
    request_tx: mpsc::Sender<BackendCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl BackendCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            TimerError::Validation(format!(
                "invalid command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(BackendCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| TimerError::Channel(format!("failed to send command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| TimerError::Channel(format!("command response dropped: {e}")))?
    }

    /// Send a command and unwrap its payload, turning a rejection into a
    /// [`TimerError::Submission`].
    pub async fn call(&self, command: CommandName, payload: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .send(CommandEnvelope::with_fresh_id(command, payload))
            .await?;
        if response.ok {
            Ok(response.payload)
        } else {
            Err(TimerError::Submission(format!(
                "{} rejected: {}",
                command.as_str(),
                response.error.as_deref().unwrap_or("unknown error")
            )))
        }
    }

    pub async fn snapshot(&self) -> Result<MonitorSnapshot> {
        let payload = self.call(CommandName::SnapshotGet, serde_json::json!({})).await?;
        serde_json::from_value(payload)
            .map_err(|e| TimerError::Channel(format!("malformed snapshot payload: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

#[async_trait]
impl ScheduleTransport for BackendCommandClient {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<()> {
        let payload = serde_json::to_value(request)
            .map_err(|e| TimerError::Validation(format!("unserializable request: {e}")))?;
        self.call(CommandName::TimerSchedule, payload).await?;
        Ok(())
    }

    async fn cancel(&self, task_id: &str) -> Result<()> {
        self.call(CommandName::TimerCancel, serde_json::json!({"task_id": task_id}))
            .await?;
        Ok(())
    }

    async fn set_preferences(&self, entity: &str, patch: &Preferences) -> Result<()> {
        self.call(
            CommandName::PreferencesSet,
            serde_json::json!({"entity": entity, "preferences": patch}),
        )
        .await?;
        Ok(())
    }
}

/// Receiver half; routes each command to the backend.
pub struct BackendCommandServer<B: SchedulerBackend> {
    request_rx: mpsc::Receiver<BackendCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    backend: B,
}

#[must_use]
pub fn command_channel<B: SchedulerBackend>(
    request_capacity: usize,
    event_capacity: usize,
    backend: B,
) -> (BackendCommandClient, BackendCommandServer<B>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        BackendCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        BackendCommandServer {
            request_rx,
            event_tx,
            backend,
        },
    )
}

impl<B: SchedulerBackend> BackendCommandServer<B> {
    /// Serve until every client is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.dispatch(&request.envelope);
            let _ = request.response_tx.send(Ok(response));
        }
    }

    /// Serve like [`run`](Self::run), expiring due tasks every `period`.
    pub async fn run_with_expiry(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };
                    let response = self.dispatch(&request.envelope);
                    let _ = request.response_tx.send(Ok(response));
                }
                _ = interval.tick() => {
                    self.expire_due();
                }
            }
        }
    }

    /// Expire due tasks and announce each one. Returns how many ended.
    pub fn expire_due(&self) -> usize {
        let expired = match self.backend.expire_due() {
            Ok(expired) => expired,
            Err(e) => {
                tracing::warn!(error = %e, "failed to expire due tasks");
                return 0;
            }
        };
        for task in &expired {
            self.emit_event(
                events::TASK_COMPLETED,
                serde_json::json!({
                    "task_id": task.id,
                    "end_timestamp": task.end_timestamp,
                }),
            );
        }
        expired.len()
    }

    /// Route and fold a routing failure into an error response carrying
    /// the request id.
    pub fn dispatch(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        match self.route(envelope) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    error = %e,
                    "command rejected"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        match envelope.command {
            CommandName::TimerPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::TimerVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": EVENT_VERSION,
                    "channel": "timer_command_v1"
                }),
            )),
            CommandName::TimerSchedule => self.handle_schedule(envelope),
            CommandName::TimerCancel => self.handle_cancel(envelope),
            CommandName::PreferencesGet => self.handle_preferences_get(envelope),
            CommandName::PreferencesSet => self.handle_preferences_set(envelope),
            CommandName::SnapshotGet => self.handle_snapshot_get(envelope),
            CommandName::BridgeStop => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"stopping": true}),
            )),
        }
    }

    fn handle_schedule(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let request: ScheduleRequest = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| TimerError::Validation(format!("timer.schedule payload: {e}")))?;
        request.validate()?;
        let task = self.backend.schedule(request)?;

        self.emit_event(
            events::TASK_STARTED,
            serde_json::json!({
                "request_id": envelope.request_id,
                "task_id": task.id,
                "end_timestamp": task.end_timestamp,
            }),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "accepted": true,
                "task_id": task.id,
                "end_timestamp": task.end_timestamp,
            }),
        ))
    }

    fn handle_cancel(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let task_id = parse_non_empty_field(&envelope.payload, "task_id", "timer.cancel")?;
        let cancelled = self.backend.cancel(&task_id)?;
        if cancelled {
            self.emit_event(
                events::TASK_CANCELLED,
                serde_json::json!({"request_id": envelope.request_id, "task_id": task_id}),
            );
        }
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "task_id": task_id, "cancelled": cancelled}),
        ))
    }

    fn handle_preferences_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let entity = envelope
            .payload
            .get("entity")
            .and_then(serde_json::Value::as_str);
        let prefs = self.backend.preferences(entity)?;
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), prefs))
    }

    fn handle_preferences_set(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let entity = parse_non_empty_field(&envelope.payload, "entity", "preferences.set")?;
        let patch: Preferences = match envelope.payload.get("preferences") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| TimerError::Validation(format!("preferences.set payload: {e}")))?,
            None => {
                return Err(TimerError::Validation(
                    "preferences.set requires payload.preferences".to_owned(),
                ));
            }
        };
        let merged = self.backend.set_preferences(&entity, &patch)?;
        self.emit_event(
            events::PREFERENCES_UPDATED,
            serde_json::json!({"request_id": envelope.request_id, "entity": entity}),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "entity": entity, "preferences": merged}),
        ))
    }

    fn handle_snapshot_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let snapshot = self.backend.snapshot()?;
        let payload = serde_json::to_value(snapshot)
            .map_err(|e| TimerError::Channel(format!("failed to serialize snapshot: {e}")))?;
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.event_tx.send(envelope);
    }
}

fn parse_non_empty_field(payload: &serde_json::Value, field: &str, command: &str) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(TimerError::Validation(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(TimerError::Validation(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::backend::MemoryBackend;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn make_server() -> (BackendCommandClient, BackendCommandServer<MemoryBackend>) {
        command_channel(8, 8, MemoryBackend::new())
    }

    fn make_envelope(command: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("test-req-1", command, payload)
    }

    fn schedule_payload() -> serde_json::Value {
        serde_json::json!({
            "task_id": "qt_aaaaaaaaaaaa",
            "time_mode": "relative",
            "delay": 5,
            "unit": "minutes",
            "finish_actions": [{"command": "off", "entity": "switch.pump"}]
        })
    }

    #[test]
    fn ping_pongs() {
        let (_client, server) = make_server();
        let resp = server
            .route(&make_envelope(CommandName::TimerPing, serde_json::json!({})))
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["pong"], true);
    }

    #[test]
    fn schedule_accepted_and_event_emitted() {
        let (client, server) = make_server();
        let mut event_rx = client.subscribe_events();
        let resp = server
            .route(&make_envelope(CommandName::TimerSchedule, schedule_payload()))
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["task_id"], "qt_aaaaaaaaaaaa");

        let event = event_rx.try_recv().unwrap();
        assert_eq!(event.event, events::TASK_STARTED);
        assert_eq!(event.payload["request_id"], "test-req-1");
    }

    #[test]
    fn schedule_without_finish_actions_rejected() {
        let (_client, server) = make_server();
        let mut payload = schedule_payload();
        payload["finish_actions"] = serde_json::json!([]);
        let resp = server.dispatch(&make_envelope(CommandName::TimerSchedule, payload));
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "test-req-1");
        assert!(resp.error.unwrap().contains("finish actions"));
    }

    #[test]
    fn cancel_missing_field_returns_error() {
        let (_client, server) = make_server();
        let result = server.route(&make_envelope(CommandName::TimerCancel, serde_json::json!({})));
        assert!(result.is_err());
    }

    #[test]
    fn cancel_unknown_task_is_accepted_without_event() {
        let (client, server) = make_server();
        let mut event_rx = client.subscribe_events();
        let resp = server
            .route(&make_envelope(
                CommandName::TimerCancel,
                serde_json::json!({"task_id": "qt_missing"}),
            ))
            .unwrap();
        assert_eq!(resp.payload["cancelled"], false);
        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn preferences_set_merges_partially() {
        let (_client, server) = make_server();
        server
            .route(&make_envelope(
                CommandName::PreferencesSet,
                serde_json::json!({"entity": "fan.x", "preferences": {"last_delay": 20}}),
            ))
            .unwrap();
        let resp = server
            .route(&make_envelope(
                CommandName::PreferencesSet,
                serde_json::json!({"entity": "fan.x", "preferences": {"last_unit": "hours"}}),
            ))
            .unwrap();
        assert_eq!(resp.payload["preferences"]["last_delay"], 20);
        assert_eq!(resp.payload["preferences"]["last_unit"], "hours");
    }

    #[test]
    fn expiry_announces_completed_tasks() {
        let start = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 5, 1, 10, 0, 0)
            .unwrap();
        let offset = Arc::new(AtomicI64::new(0));
        let shared = Arc::clone(&offset);
        let backend = MemoryBackend::with_clock(Arc::new(move || {
            start + chrono::Duration::seconds(shared.load(Ordering::SeqCst))
        }));
        let (client, server) = command_channel(8, 8, backend);
        let mut event_rx = client.subscribe_events();

        server
            .route(&make_envelope(CommandName::TimerSchedule, schedule_payload()))
            .unwrap();
        assert_eq!(event_rx.try_recv().unwrap().event, events::TASK_STARTED);
        assert_eq!(server.expire_due(), 0);
        assert!(event_rx.try_recv().is_err());

        offset.store(301, Ordering::SeqCst);
        assert_eq!(server.expire_due(), 1);
        let completed = event_rx.try_recv().unwrap();
        assert_eq!(completed.event, events::TASK_COMPLETED);
        assert_eq!(completed.payload["task_id"], "qt_aaaaaaaaaaaa");
        assert_eq!(server.expire_due(), 0);
    }

    #[tokio::test]
    async fn client_round_trip_through_running_server() {
        let (client, server) = make_server();
        let server_task = tokio::spawn(server.run());

        let request: ScheduleRequest = serde_json::from_value(schedule_payload()).unwrap();
        ScheduleTransport::schedule(&client, &request).await.unwrap();
        let snapshot = client.snapshot().await.unwrap();
        assert!(snapshot.tasks.contains_key("qt_aaaaaaaaaaaa"));

        ScheduleTransport::cancel(&client, "qt_aaaaaaaaaaaa").await.unwrap();
        assert!(client.snapshot().await.unwrap().tasks.is_empty());

        drop(client);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn rejection_surfaces_as_submission_error() {
        let (client, server) = make_server();
        let server_task = tokio::spawn(server.run());
        let err = client
            .call(CommandName::TimerCancel, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TimerError::Submission(_)));
        drop(client);
        server_task.await.unwrap();
    }
}
