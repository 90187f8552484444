use crate::helpers::{at, connect, fixed_backend};
use quick_timer::TimerError;
use quick_timer::client::ScheduleRequest;
use quick_timer::client::contract::{CommandName, EVENT_VERSION, events};
use quick_timer::composer::{Target, compose};
use quick_timer::timing::{TimeSpec, TimeUnit};

#[tokio::test]
async fn version_and_ping_answer() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (_, raw, server) = connect(backend);

    let pong = raw
        .call(CommandName::TimerPing, serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(pong["pong"], true);

    let version = raw
        .call(CommandName::TimerVersion, serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(version["contract_version"], EVENT_VERSION);

    server.abort();
}

#[tokio::test]
async fn lifecycle_events_follow_commands() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (client, raw, server) = connect(backend);
    let mut events_rx = raw.subscribe_events();

    let request = ScheduleRequest::new(
        "qt_0123456789ab",
        compose(&[
            Target::start("light.desk", "on"),
            Target::finish("light.desk", "off"),
        ]),
        TimeSpec::relative(20, TimeUnit::Minutes).unwrap(),
    );
    client.schedule(&request).await.unwrap();
    client.cancel("qt_0123456789ab").await.unwrap();

    let started = events_rx.recv().await.unwrap();
    assert_eq!(started.event, events::TASK_STARTED);
    assert_eq!(started.payload["task_id"], "qt_0123456789ab");
    assert_eq!(started.v, EVENT_VERSION);

    let cancelled = events_rx.recv().await.unwrap();
    assert_eq!(cancelled.event, events::TASK_CANCELLED);
    assert_eq!(cancelled.payload["task_id"], "qt_0123456789ab");

    assert!(raw.snapshot().await.unwrap().tasks.is_empty());

    server.abort();
}

#[tokio::test]
async fn snapshot_and_preferences_reflect_accepted_schedule() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (client, raw, server) = connect(backend);

    let request = ScheduleRequest::new(
        "switch.kettle",
        compose(&[Target::finish("switch.kettle", "off")]),
        TimeSpec::absolute("10:30").unwrap(),
    );
    client.schedule(&request).await.unwrap();

    let snapshot = raw.snapshot().await.unwrap();
    let task = snapshot.task("switch.kettle").unwrap();
    assert_eq!(task.remaining_seconds, Some(1800.0));
    assert_eq!(task.at_time.map(|t| t.to_string()).as_deref(), Some("10:30"));
    assert!(!snapshot.presets.is_empty());

    let prefs = raw
        .call(
            CommandName::PreferencesGet,
            serde_json::json!({"entity": "switch.kettle"}),
        )
        .await
        .unwrap();
    assert_eq!(prefs["last_time_mode"], "absolute");
    assert_eq!(prefs["last_at_time"], "10:30");
    assert_eq!(prefs["history"].as_array().unwrap().len(), 1);

    server.abort();
}

#[tokio::test]
async fn malformed_schedule_is_rejected_without_event() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (_, raw, server) = connect(backend);
    let mut events_rx = raw.subscribe_events();

    let err = raw
        .call(
            CommandName::TimerSchedule,
            serde_json::json!({"task_id": "qt_x", "time_mode": "relative", "delay": 5}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TimerError::Submission(_)));
    assert!(err.is_submission_failure());
    assert!(events_rx.try_recv().is_err());
    assert_eq!(raw.snapshot().await.unwrap().task_count(), 0);

    server.abort();
}
