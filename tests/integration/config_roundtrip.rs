use quick_timer::composer::Target;
use quick_timer::config::{CardConfig, SurfaceLayout, TimerConfig};
use quick_timer::timing::{AtTime, TimeMode, TimeUnit};

fn sample() -> TimerConfig {
    let mut config = TimerConfig::default();
    config.engine.tick_interval_ms = 500;
    config.binding.max_retry_attempts = 7;
    config.cards = vec![
        CardConfig {
            label: Some("Garden".to_owned()),
            targets: vec![
                Target::start("switch.sprinkler", "on"),
                Target::finish("switch.sprinkler", "off"),
            ],
            default_delay: 20,
            ..CardConfig::default()
        },
        CardConfig {
            entity: Some("climate.office".to_owned()),
            command: Some("turn_off".to_owned()),
            layout: SurfaceLayout::Tile,
            default_time_mode: TimeMode::Absolute,
            default_at_time: Some(AtTime::new(18, 30).unwrap()),
            default_unit: TimeUnit::Hours,
            ..CardConfig::default()
        },
    ];
    config
}

#[test]
fn card_ids_are_assigned_once_and_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quick-timer").join("config.toml");

    let mut config = sample();
    assert!(config.ensure_card_ids());
    assert!(!config.ensure_card_ids());
    config.save_to_file(&path).unwrap();

    let mut loaded = TimerConfig::from_file(&path).unwrap();
    assert!(!loaded.ensure_card_ids());
    assert_eq!(loaded, config);

    let ids: Vec<_> = loaded
        .cards
        .iter()
        .map(|card| card.task_id.clone().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    for id in &ids {
        assert!(id.starts_with("qt_"));
        assert_eq!(id.len(), 15);
    }
}

#[test]
fn hand_written_file_uses_legacy_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[cards]]
entity_id = "fan.attic"
layout = "tile"
run_now = true
command = "on"

[[cards]]
task_id = "qt_feedfacecafe"
label = "Porch"

[[cards.targets]]
entity = "light.porch"
command = "off"
phase = "finish"
"#,
    )
    .unwrap();

    let mut config = TimerConfig::from_file(&path).unwrap();
    assert_eq!(config.cards[0].entity.as_deref(), Some("fan.attic"));
    assert_eq!(config.cards[0].layout, SurfaceLayout::Tile);
    assert!(config.cards[0].run_now);
    assert_eq!(config.engine, TimerConfig::default().engine);

    assert!(config.ensure_card_ids());
    assert_eq!(config.cards[1].task_id.as_deref(), Some("qt_feedfacecafe"));
    assert_eq!(
        config.cards[1].identity().target_entities,
        vec!["light.porch".to_owned()]
    );
}
