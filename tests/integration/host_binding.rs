use crate::helpers::{at, connect, epoch, fixed_backend};
use quick_timer::binding::{
    BindOutcome, BindingEngine, BindingState, HostEvent, HostTree, MemoryTree, NodeId, PANEL_TAG,
    PanelAction,
};
use quick_timer::client::SchedulingClient;
use quick_timer::config::TimerConfig;
use quick_timer::countdown::{ManualIntervalSpawner, SurfaceState};
use quick_timer::preferences::PreferenceCache;
use quick_timer::timing::{TimeSpec, TimeUnit};

type Engine = BindingEngine<MemoryTree, ManualIntervalSpawner>;

fn engine(client: SchedulingClient) -> (Engine, ManualIntervalSpawner) {
    let spawner = ManualIntervalSpawner::new();
    let engine = BindingEngine::new(
        MemoryTree::new("body"),
        spawner.clone(),
        client,
        PreferenceCache::new(),
        &TimerConfig::default(),
    );
    (engine, spawner)
}

/// The host's detail view as it looks once fully rendered.
fn open_detail(tree: &mut MemoryTree, entity: &str) -> NodeId {
    let root = tree.root().unwrap();
    let shell = tree.add(root, "home-assistant", &[]).unwrap();
    let dialog = tree
        .add(shell, "ha-more-info-dialog", &[("entity-id", entity)])
        .unwrap();
    tree.add(dialog, "ha-more-info-info", &[]).unwrap();
    dialog
}

#[tokio::test]
async fn panel_schedules_and_renders_backend_countdown() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let now = epoch(&at(10, 0));

    let (mut engine, _) = engine(client);
    open_detail(engine.tree_mut(), "light.porch");
    assert_eq!(
        engine.bind_host_surface(now),
        BindOutcome::Bound {
            subject: "light.porch".to_owned()
        }
    );

    engine
        .perform(
            PanelAction::SetTiming(TimeSpec::relative(10, TimeUnit::Minutes).unwrap()),
            now,
        )
        .await
        .unwrap();
    engine.perform(PanelAction::Schedule, now).await.unwrap();

    let snapshot = feed.latest();
    let task = snapshot.task("light.porch").unwrap();
    assert_eq!(task.finish_actions[0].entity.as_deref(), Some("light.porch"));
    assert_eq!(task.finish_actions[0].command, "off");

    let view = engine.on_snapshot(snapshot, now + 60.0).unwrap();
    assert_eq!(view.state, SurfaceState::Scheduled);
    assert_eq!(view.remaining_secs, 540.0);
    assert_eq!(view.progress, 10.0);

    let panel = engine.panel().unwrap().node();
    let tree = engine.tree();
    assert_eq!(tree.attribute(panel, "data-state").as_deref(), Some("scheduled"));
    assert_eq!(tree.attribute(panel, "data-remaining").as_deref(), Some("9:00"));
    assert_eq!(tree.attribute(panel, "data-controls").as_deref(), Some("hidden"));

    engine.perform(PanelAction::Cancel, now + 61.0).await.unwrap();
    let view = engine.on_snapshot(feed.latest(), now + 62.0).unwrap();
    assert_eq!(view.state, SurfaceState::Idle);

    server.abort();
}

#[tokio::test]
async fn switching_entities_keeps_one_panel_and_leaves_tasks_alone() {
    let (backend, _) = fixed_backend(at(10, 0));
    let mut feed = backend.subscribe();
    let (client, _, server) = connect(backend);
    let now = epoch(&at(10, 0));

    let (mut engine, spawner) = engine(client);
    let dialog = open_detail(engine.tree_mut(), "light.porch");
    engine.bind_host_surface(now);
    engine.perform(PanelAction::Schedule, now).await.unwrap();

    engine
        .tree_mut()
        .set_attribute(dialog, "entity-id", "fan.attic");
    assert_eq!(
        engine.handle(HostEvent::TreeMutated, now + 1.0),
        BindOutcome::Rebound {
            previous: "light.porch".to_owned(),
            subject: "fan.attic".to_owned()
        }
    );
    assert_eq!(engine.tree().find_all(PANEL_TAG).len(), 1);
    assert_eq!(spawner.live_count(), 1);

    let snapshot = feed.latest();
    assert!(snapshot.task("light.porch").is_some());
    let view = engine.on_snapshot(snapshot, now + 2.0).unwrap();
    assert_eq!(view.state, SurfaceState::Idle);

    server.abort();
}

#[tokio::test]
async fn closing_the_detail_view_tears_the_panel_down() {
    let (backend, _) = fixed_backend(at(10, 0));
    let (client, _, server) = connect(backend);
    let now = epoch(&at(10, 0));

    let (mut engine, spawner) = engine(client);
    let dialog = open_detail(engine.tree_mut(), "switch.pump");
    engine.bind_host_surface(now);
    assert_eq!(spawner.live_count(), 1);

    engine.tree_mut().remove(dialog);
    let threshold = TimerConfig::default().binding.miss_teardown_threshold;
    let outcomes: Vec<_> = (0..threshold)
        .map(|_| engine.handle(HostEvent::TreeMutated, now + 1.0))
        .collect();
    assert_eq!(
        outcomes.last(),
        Some(&BindOutcome::TornDown {
            subject: "switch.pump".to_owned()
        })
    );
    assert_eq!(engine.state(), &BindingState::TornDown);
    assert_eq!(spawner.live_count(), 0);
    assert!(engine.tree().find_all(PANEL_TAG).is_empty());

    server.abort();
}
