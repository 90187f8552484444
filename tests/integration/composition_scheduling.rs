use crate::helpers::{at, connect, fixed_backend};
use quick_timer::composer::{Action, Target, compose};
use quick_timer::config::{CardConfig, EngineConfig};
use quick_timer::preferences::PreferenceCache;
use quick_timer::surface::CardSurface;
use quick_timer::timing::{TimeMode, TimeUnit};
use quick_timer::TimerError;

#[tokio::test]
async fn single_finish_target_schedules_relative_task() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);

    let mut config = CardConfig {
        targets: vec![Target::finish("E1", "off")],
        ..CardConfig::default()
    };
    config.ensure_task_id();
    let task_id = config.task_id.clone().unwrap();

    let mut card = CardSurface::new(
        config,
        client,
        PreferenceCache::new(),
        &EngineConfig::default(),
    )
    .unwrap();
    card.set_delay(30).unwrap();

    let request = card.build_request().unwrap();
    let wire = serde_json::to_value(&request).unwrap();
    assert_eq!(wire["time_mode"], "relative");
    assert_eq!(wire["delay"], 30);
    assert_eq!(wire["unit"], "minutes");
    assert_eq!(wire["start_actions"], serde_json::json!([]));
    assert_eq!(wire["finish_actions"][0]["command"], "off");
    assert_eq!(wire["finish_actions"][0]["entity"], "E1");

    card.submit(0.0).await.unwrap();

    let snapshot = feed.latest();
    let task = snapshot.task(&task_id).unwrap();
    assert_eq!(task.finish_actions, vec![Action::new("E1", "off")]);
    assert!(task.start_actions.is_empty());
    assert_eq!(task.time_mode, TimeMode::Relative);
    assert_eq!(
        task.end_timestamp.unwrap() - task.start_timestamp.unwrap(),
        1800.0
    );

    server.abort();
}

#[test]
fn compose_drops_inert_targets_and_keeps_phase_order() {
    let inert = Target {
        entity: None,
        command: None,
        ..Target::finish("", "")
    };
    let actions = compose(&[
        Target::finish("switch.b", "off"),
        inert.clone(),
        Target::start("light.a", "on"),
        Target::finish("switch.c", "off"),
        Target::start("light.d", "on"),
        inert,
    ]);
    let start: Vec<_> = actions
        .start_actions
        .iter()
        .map(|a| a.entity.as_deref().unwrap())
        .collect();
    let finish: Vec<_> = actions
        .finish_actions
        .iter()
        .map(|a| a.entity.as_deref().unwrap())
        .collect();
    assert_eq!(start, vec!["light.a", "light.d"]);
    assert_eq!(finish, vec!["switch.b", "switch.c"]);
}

#[tokio::test]
async fn empty_targets_never_reach_the_backend() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);

    let mut card = CardSurface::new(
        CardConfig {
            task_id: Some("qt_000000000001".to_owned()),
            targets: vec![Target {
                entity: None,
                command: None,
                ..Target::finish("", "")
            }],
            ..CardConfig::default()
        },
        client,
        PreferenceCache::new(),
        &EngineConfig::default(),
    )
    .unwrap();

    let err = card.submit(0.0).await.unwrap_err();
    assert!(matches!(err, TimerError::Configuration(_)));
    assert!(!err.is_submission_failure());
    assert_eq!(feed.latest().task_count(), 0);

    server.abort();
}

#[tokio::test]
async fn run_now_fires_command_and_schedules_reverse() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);

    let mut card = CardSurface::new(
        CardConfig {
            entity: Some("light.porch".to_owned()),
            command: Some("on".to_owned()),
            run_now: true,
            ..CardConfig::default()
        },
        client,
        PreferenceCache::new(),
        &EngineConfig::default(),
    )
    .unwrap();
    card.set_parameter("brightness_pct", "40");
    card.set_unit(TimeUnit::Hours).unwrap();
    card.set_delay(2).unwrap();
    card.submit(0.0).await.unwrap();

    let snapshot = feed.latest();
    let task = snapshot.task("light.porch").unwrap();
    assert_eq!(task.start_actions[0].command, "on");
    assert_eq!(task.start_actions[0].parameters["brightness_pct"], 40);
    assert_eq!(task.finish_actions, vec![Action::new("light.porch", "off")]);

    let history = snapshot.preferences["light.porch"].history();
    assert_eq!(history[0].command.as_deref(), Some("on"));
    assert_eq!(history[0].delay, Some(2));
    assert_eq!(history[0].unit, Some(TimeUnit::Hours));

    server.abort();
}
