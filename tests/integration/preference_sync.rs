use crate::helpers::{at, connect, fixed_backend};
use quick_timer::client::ScheduleRequest;
use quick_timer::composer::{Target, compose};
use quick_timer::preferences::{PreferenceCache, Preferences};
use quick_timer::timing::{TimeSpec, TimeUnit};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn partial_write_persists_without_touching_history() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);

    client
        .schedule(&ScheduleRequest::new(
            "switch.pump",
            compose(&[Target::finish("switch.pump", "off")]),
            TimeSpec::relative(5, TimeUnit::Minutes).unwrap(),
        ))
        .await
        .unwrap();

    let cache = PreferenceCache::with_sink(Arc::new(client));
    cache.merge_from_snapshot(&feed.latest().preferences);
    assert_eq!(cache.read("switch.pump").history().len(), 1);

    cache
        .write(
            "switch.pump",
            Preferences {
                last_delay: Some(45),
                ..Preferences::default()
            },
        )
        .unwrap()
        .await
        .unwrap();

    let snapshot = feed.latest();
    let stored = &snapshot.preferences["switch.pump"];
    assert_eq!(stored.last_delay, Some(45));
    assert_eq!(stored.last_unit, Some(TimeUnit::Minutes));
    assert_eq!(stored.history().len(), 1);

    server.abort();
}

#[tokio::test]
async fn in_flight_write_survives_stale_snapshot() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (client, _, server) = connect(backend);
    let cache = PreferenceCache::with_sink(Arc::new(client));

    let handle = cache.write(
        "fan.attic",
        Preferences {
            last_delay: Some(30),
            ..Preferences::default()
        },
    );

    let mut stale = BTreeMap::new();
    stale.insert(
        "fan.attic".to_owned(),
        Preferences {
            last_delay: Some(5),
            last_unit: Some(TimeUnit::Hours),
            ..Preferences::default()
        },
    );
    cache.merge_from_snapshot(&stale);
    let prefs = cache.read("fan.attic");
    assert_eq!(prefs.last_delay, Some(30));
    assert_eq!(prefs.last_unit, Some(TimeUnit::Hours));

    handle.unwrap().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn two_sessions_converge_through_the_snapshot() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let client = Arc::new(client);

    let first = PreferenceCache::with_sink(client.clone());
    let second = PreferenceCache::with_sink(client);

    first
        .write(
            "light.hall",
            Preferences {
                last_unit: Some(TimeUnit::Hours),
                ..Preferences::default()
            },
        )
        .unwrap()
        .await
        .unwrap();
    let snapshot = feed.latest();
    first.merge_from_snapshot(&snapshot.preferences);
    second.merge_from_snapshot(&snapshot.preferences);
    assert_eq!(second.read("light.hall").last_unit, Some(TimeUnit::Hours));

    // The first session's write has landed, so a later change made
    // elsewhere is accepted.
    second
        .write(
            "light.hall",
            Preferences {
                last_unit: Some(TimeUnit::Seconds),
                ..Preferences::default()
            },
        )
        .unwrap()
        .await
        .unwrap();
    let snapshot = feed.latest();
    first.merge_from_snapshot(&snapshot.preferences);
    second.merge_from_snapshot(&snapshot.preferences);
    assert_eq!(first.read("light.hall").last_unit, Some(TimeUnit::Seconds));
    assert_eq!(first.read("light.hall"), second.read("light.hall"));

    server.abort();
}

#[tokio::test]
async fn foreign_write_before_own_echo_still_converges() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let client = Arc::new(client);

    let first = PreferenceCache::with_sink(client.clone());
    let second = PreferenceCache::with_sink(client);

    first
        .write(
            "light.hall",
            Preferences {
                last_unit: Some(TimeUnit::Hours),
                ..Preferences::default()
            },
        )
        .unwrap()
        .await
        .unwrap();
    // The first session never sees a snapshot carrying its own value.
    second
        .write(
            "light.hall",
            Preferences {
                last_unit: Some(TimeUnit::Seconds),
                ..Preferences::default()
            },
        )
        .unwrap()
        .await
        .unwrap();

    let snapshot = feed.latest();
    assert_eq!(
        snapshot.preferences["light.hall"].last_unit,
        Some(TimeUnit::Seconds)
    );
    first.merge_from_snapshot(&snapshot.preferences);
    assert_eq!(first.read("light.hall").last_unit, Some(TimeUnit::Seconds));
    assert_eq!(first.read("light.hall"), second.read("light.hall"));

    server.abort();
}
