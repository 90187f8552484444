use crate::helpers::{at, connect, epoch, fixed_backend};
use quick_timer::client::{ScheduleRequest, SchedulerBackend};
use quick_timer::composer::{Target, compose};
use quick_timer::config::{CardConfig, EngineConfig};
use quick_timer::countdown::SurfaceState;
use quick_timer::preferences::PreferenceCache;
use quick_timer::surface::CardSurface;
use quick_timer::timing::{TimeSpec, TimeUnit};
use std::sync::atomic::Ordering;

fn heater_card(client: quick_timer::client::SchedulingClient) -> CardSurface {
    CardSurface::new(
        CardConfig {
            task_id: Some("qt_abc".to_owned()),
            targets: vec![Target::finish("switch.heater", "off")],
            ..CardConfig::default()
        },
        client,
        PreferenceCache::new(),
        &EngineConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn card_counts_down_from_published_window() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let start = epoch(&at(10, 0));

    let mut card = heater_card(client);
    card.set_unit(TimeUnit::Minutes).unwrap();
    card.set_delay(2).unwrap();
    card.submit(start).await.unwrap();

    // Nothing shows until a snapshot is folded in.
    assert_eq!(card.view().state, SurfaceState::Idle);

    let snapshot = feed.latest();
    let view = card.on_snapshot(&snapshot, start + 60.0).clone();
    assert_eq!(view.state, SurfaceState::Scheduled);
    assert_eq!(view.task_key.as_deref(), Some("qt_abc"));
    assert_eq!(view.remaining_secs, 60.0);
    assert_eq!(view.progress, 50.0);
    assert!(!view.controls_visible());

    // Interpolation between snapshots keeps the captured start.
    let view = card.tick(&snapshot, start + 90.0).clone();
    assert_eq!(view.remaining_secs, 30.0);
    assert_eq!(view.progress, 75.0);

    server.abort();
}

#[tokio::test]
async fn own_key_wins_over_target_entity() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let now = epoch(&at(10, 0));

    // Another surface scheduled the heater by its entity.
    client
        .schedule(&ScheduleRequest::new(
            "switch.heater",
            compose(&[Target::finish("switch.heater", "off")]),
            TimeSpec::relative(10, TimeUnit::Minutes).unwrap(),
        ))
        .await
        .unwrap();

    let mut card = heater_card(client);
    let view = card.on_snapshot(&feed.latest(), now).clone();
    assert_eq!(view.task_key.as_deref(), Some("switch.heater"));
    assert_eq!(view.remaining_secs, 600.0);

    card.set_delay(2).unwrap();
    card.submit(now).await.unwrap();
    let view = card.on_snapshot(&feed.latest(), now).clone();
    assert_eq!(view.task_key.as_deref(), Some("qt_abc"));
    assert_eq!(view.remaining_secs, 120.0);

    server.abort();
}

#[tokio::test]
async fn removed_task_returns_card_to_idle() {
    let (backend, offset) = fixed_backend(at(10, 0));
    let expiry = backend.clone();
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let start = epoch(&at(10, 0));

    let mut card = heater_card(client);
    card.set_unit(TimeUnit::Minutes).unwrap();
    card.set_delay(2).unwrap();
    card.submit(start).await.unwrap();
    card.on_snapshot(&feed.latest(), start + 1.0);
    assert!(card.view().is_scheduled());

    // Past the end but still published: expiring, controls back.
    let view = card.tick(&feed.latest(), start + 121.0).clone();
    assert_eq!(view.state, SurfaceState::Expiring);
    assert_eq!(view.remaining_secs, 0.0);
    assert!(view.controls_visible());

    offset.store(121, Ordering::SeqCst);
    assert_eq!(expiry.expire_due().unwrap().len(), 1);
    let view = card.on_snapshot(&feed.latest(), start + 122.0).clone();
    assert_eq!(view.state, SurfaceState::Idle);
    assert_eq!(view.task_key, None);

    server.abort();
}

#[tokio::test]
async fn cancel_clears_countdown_after_next_snapshot() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let start = epoch(&at(10, 0));

    let mut card = heater_card(client);
    card.submit(start).await.unwrap();
    card.on_snapshot(&feed.latest(), start + 5.0);
    assert!(card.view().is_scheduled());

    card.cancel(start + 6.0).await.unwrap();
    // Still showing the countdown until the backend confirms.
    assert!(card.view().is_scheduled());
    card.on_snapshot(&feed.latest(), start + 6.0);
    assert_eq!(card.view().state, SurfaceState::Idle);

    server.abort();
}
